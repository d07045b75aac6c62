//! The per-tick orchestration loop
//!
//! One `run_tick` call is one unit of simulated time: clock advance,
//! environmental pre-pass, parallel intent solicitation for active
//! characters, adjudication with retries and fallback, DM resolution,
//! rule application, interrupt polls, and exactly one event append per
//! character in character-id order.
//!
//! Provider failures inside a tick become rejected verdicts and flow
//! into the retry path; rule and interrupt failures are fatal to the
//! tick and leave an `aborted` marker in the log.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use seed::{attempt_label, purpose_label, SeedManager};
use vellum_events::{EventLogError, EventRecord, EventSink, FinalRecord, TokenTotals};
use vellum_llm::{
    CompletionRequest, CompletionResponse, IntentPayload, ProviderError, ProviderRouter,
    ResponseSchema,
};
use vellum_rules::{
    contains_halt, EffectSet, FnRule, InterruptError, InterruptManager, Rule, RuleContext,
    RuleEngine, RuleError, RuleOutcome,
};
use vellum_world::hashing::HashingError;
use vellum_world::{
    ActionCatalog, Character, CharacterId, CharacterView, ClockError, GlobalClock, Intent,
    Outcome, ReasonCode, StateMode, Verdict, VerdictRecord, WhitelistError, WorldState,
};

use crate::dm::{DmPackage, DmResolver};
use crate::fallback::FallbackPolicy;

const NARRATOR_SYSTEM_PROMPT: &str = "You are a character in a deterministic narrative \
simulation. You receive your authorized view of the world as JSON. Declare exactly one \
action for this tick.";

/// Coarseness of a tick's narrative scope
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// A year passes per tick
    Year,
    /// A month passes per tick
    Month,
    /// A day passes per tick
    Day,
    /// Moment-to-moment scenes
    Immediate,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Day => "day",
            Granularity::Immediate => "immediate",
        };
        f.write_str(name)
    }
}

/// Fatal narrator errors
///
/// Provider and whitelist failures never appear here; they convert to
/// rejected verdicts inside the tick.
#[derive(Debug, Error)]
pub enum NarratorError {
    /// Clock misuse, fatal at startup
    #[error(transparent)]
    Clock(#[from] ClockError),
    /// Rule engine failure, fatal to the tick
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// Interrupt rule failure, fatal to the tick
    #[error(transparent)]
    Interrupt(#[from] InterruptError),
    /// Event log failure, fatal to the run
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    /// Digest computation failure
    #[error(transparent)]
    Hashing(#[from] HashingError),
}

/// Tunable narrator behavior, bound from configuration
#[derive(Debug, Clone)]
pub struct NarratorOptions {
    /// Retry budget per character per tick
    pub max_retries: u32,
    /// Granularity advanced each tick
    pub granularity: Granularity,
    /// Tick-step table per granularity
    pub granularity_steps: BTreeMap<Granularity, u64>,
    /// Step used when the table has no entry
    pub default_step: u64,
    /// Budget for all provider calls within one tick
    pub tick_deadline: Duration,
    /// Sampling temperature for intent solicitation
    pub intent_temperature: f64,
    /// Completion cap for intent solicitation
    pub intent_max_tokens: u32,
}

impl Default for NarratorOptions {
    fn default() -> Self {
        let mut granularity_steps = BTreeMap::new();
        let _ = granularity_steps.insert(Granularity::Year, 365);
        let _ = granularity_steps.insert(Granularity::Month, 30);
        let _ = granularity_steps.insert(Granularity::Day, 1);
        let _ = granularity_steps.insert(Granularity::Immediate, 1);

        Self {
            max_retries: 3,
            granularity: Granularity::Day,
            granularity_steps,
            default_step: 1,
            tick_deadline: Duration::from_secs(30),
            intent_temperature: 0.9,
            intent_max_tokens: 512,
        }
    }
}

/// Summary of one closed tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that closed
    pub tick: u64,
    /// Granularity used this tick
    pub granularity: Granularity,
    /// Why this granularity was chosen
    pub granularity_rationale: String,
    /// Events committed before any truncation
    pub events_committed: usize,
    /// Whether a `HALT_TICK` interrupt truncated the tick
    pub halted: bool,
}

/// One character's in-flight adjudication state
struct Adjudication {
    character: Character,
    view_json: String,
    attempts: Vec<VerdictRecord>,
    seed_labels: Vec<String>,
    tokens: TokenTotals,
    approved: Option<Intent>,
    last_reason: ReasonCode,
}

/// The narrator: owner of the tick's mutable accumulator
pub struct Narrator {
    options: NarratorOptions,
    clock: GlobalClock,
    seeds: SeedManager,
    engine: RuleEngine,
    interrupts: InterruptManager,
    router: Arc<ProviderRouter>,
    catalog: ActionCatalog,
    fallback: FallbackPolicy,
    dm: DmResolver,
    world: WorldState,
    sink: Box<dyn EventSink>,
}

impl Narrator {
    /// Assemble a narrator over its collaborators
    ///
    /// Registers the built-in apply-phase rule that folds DM outcome
    /// effects into the world; world rules register through
    /// [`Narrator::engine_mut`] before the first tick.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: NarratorOptions,
        clock: GlobalClock,
        seeds: SeedManager,
        router: Arc<ProviderRouter>,
        catalog: ActionCatalog,
        fallback: FallbackPolicy,
        dm: DmResolver,
        world: WorldState,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let mut engine = RuleEngine::new();
        engine.register_with(apply_outcome_rule(), 100, ["apply"]);

        Self {
            options,
            clock,
            seeds,
            engine,
            interrupts: InterruptManager::new(),
            router,
            catalog,
            fallback,
            dm,
            world,
            sink,
        }
    }

    /// Mutable access to the rule engine for registration
    pub fn engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.engine
    }

    /// Mutable access to the interrupt manager for registration
    pub fn interrupts_mut(&mut self) -> &mut InterruptManager {
        &mut self.interrupts
    }

    /// Current world snapshot
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Current tick
    pub fn current_tick(&self) -> u64 {
        self.clock.current()
    }

    /// Seed audit trail accumulated so far
    pub fn seed_audit(&self) -> &seed::SeedAuditLog {
        self.seeds.audit_log()
    }

    /// Run ticks until the budget is spent or shutdown is requested
    ///
    /// Shutdown is honored between ticks only: the current tick always
    /// closes (or aborts) before the loop exits.
    pub async fn run(
        &mut self,
        max_ticks: Option<u64>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<u64, NarratorError> {
        let mut completed = 0u64;

        loop {
            if let Some(budget) = max_ticks {
                if completed >= budget {
                    break;
                }
            }
            if shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, stopping at tick boundary");
                break;
            }

            let report = self.run_tick().await?;
            completed += 1;
            info!(
                tick = report.tick,
                granularity = %report.granularity,
                events = report.events_committed,
                halted = report.halted,
                "tick closed"
            );
        }

        self.sink.flush()?;
        Ok(completed)
    }

    /// Execute one full tick
    pub async fn run_tick(&mut self) -> Result<TickReport, NarratorError> {
        // 1. Advance: granularity comes from configuration this version;
        //    the choice and rationale are recorded on the report.
        let granularity = self.options.granularity;
        let step = self
            .options
            .granularity_steps
            .get(&granularity)
            .copied()
            .unwrap_or(self.options.default_step);
        let tick = self.clock.advance(step)?;
        let deadline = Instant::now() + self.options.tick_deadline;
        let granularity_rationale =
            format!("configured granularity {granularity} mapped to step {step}");
        info!(tick, granularity = %granularity, step, "tick opened");

        // 2. Environmental pre-pass against the prior snapshot
        let mut world = self.world.at_tick(tick);
        let env_seed = self.seeds.sub_seed(&format!("tick:{tick}:env"));
        let env_ctx = RuleContext::environmental(&world, tick, env_seed);
        let env_result = self.engine.evaluate_tagged(&env_ctx, "environmental")?;
        world = env_result.apply_to(&world)?;

        // 3. Partition by state mode: dormant characters advance in time
        //    only, passive characters get rule-only updates.
        let passive_ctx = RuleContext::environmental(&world, tick, env_seed);
        let passive_result = self.engine.evaluate_tagged(&passive_ctx, "passive")?;
        world = passive_result.apply_to(&world)?;

        let active_ids: Vec<CharacterId> = world
            .characters_in_mode(StateMode::Active)
            .iter()
            .map(|c| c.id.clone())
            .collect();

        // 4-5. Deterministic visibility contexts, then parallel
        //      solicitation of attempt 0 across active characters.
        let mut adjudications = self.solicit_initial(tick, &world, &active_ids, deadline).await;

        // Post-intent interrupt poll
        let post_intent_ctx = RuleContext::environmental(&world, tick, env_seed);
        let mut halted = contains_halt(&self.interrupts.poll(&post_intent_ctx)?);

        // 6-12. Adjudicate, retry, fall back, resolve, apply and append
        //       in stable character-id order.
        let mut events_committed = 0usize;
        for cid in &active_ids {
            let Some(mut adjudication) = adjudications.remove(cid) else {
                continue;
            };

            if halted && events_committed > 0 {
                // Truncated: remaining characters get no event this tick
                break;
            }

            self.retry_loop(tick, &mut adjudication, deadline).await;

            let committed =
                self.resolve_and_commit(tick, &mut world, adjudication, deadline).await?;
            events_committed += 1;

            // Post-apply interrupt poll; truncation still appends the
            // current character's event first.
            let post_apply_ctx = RuleContext::environmental(&world, tick, env_seed);
            if contains_halt(&self.interrupts.poll(&post_apply_ctx)?) {
                halted = true;
            }

            debug!(tick, character = %committed, "character committed");
            if halted {
                break;
            }
        }

        // End-of-tick interrupt poll
        let end_ctx = RuleContext::environmental(&world, tick, env_seed);
        if contains_halt(&self.interrupts.poll(&end_ctx)?) {
            halted = true;
        }

        self.world = world;
        Ok(TickReport {
            tick,
            granularity,
            granularity_rationale,
            events_committed,
            halted,
        })
    }

    /// Fan out attempt 0 for every active character
    ///
    /// Each task works on an immutable view; results are keyed by id so
    /// the caller walks them in stable order regardless of completion
    /// order.
    async fn solicit_initial(
        &mut self,
        tick: u64,
        world: &WorldState,
        active_ids: &[CharacterId],
        deadline: Instant,
    ) -> BTreeMap<CharacterId, Adjudication> {
        let mut handles = Vec::new();

        for cid in active_ids {
            let Some(character) = world.characters.get(cid).cloned() else {
                continue;
            };
            let view = CharacterView::scoped(world, &character);
            let view_json = serde_json::to_string(&view).unwrap_or_default();

            let label = attempt_label(tick, cid.as_str(), 0);
            let _ = self.seeds.rng(&label);

            let request = self.intent_request(tick, cid, &view_json, 0, None);
            let router = Arc::clone(&self.router);
            let budget = remaining(deadline);
            let handle =
                tokio::spawn(async move { solicit(&router, &request, budget).await });

            handles.push((cid.clone(), character, view_json, label, handle));
        }

        let mut adjudications = BTreeMap::new();
        for (cid, character, view_json, label, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ProviderError::Other {
                    provider_id: "<task>".to_string(),
                    reason: format!("solicitation task failed: {e}"),
                }),
            };

            let mut adjudication = Adjudication {
                character,
                view_json,
                attempts: Vec::new(),
                seed_labels: vec![label],
                tokens: TokenTotals::default(),
                approved: None,
                last_reason: ReasonCode::ProviderError,
            };
            self.adjudicate_attempt(&cid, 0, result, &mut adjudication);
            let _ = adjudications.insert(cid, adjudication);
        }

        adjudications
    }

    /// Sequential retry sub-loop for one character
    ///
    /// Re-solicits from the same provider with the reject reason fed
    /// back as context, up to the configured budget.
    async fn retry_loop(&mut self, tick: u64, adjudication: &mut Adjudication, deadline: Instant) {
        let cid = adjudication.character.id.clone();
        let mut attempt = 1u32;

        while adjudication.approved.is_none() && attempt <= self.options.max_retries {
            let label = attempt_label(tick, cid.as_str(), attempt);
            let _ = self.seeds.rng(&label);
            adjudication.seed_labels.push(label);

            let request = self.intent_request(
                tick,
                &cid,
                &adjudication.view_json,
                attempt,
                Some(adjudication.last_reason),
            );
            let result = solicit(&self.router, &request, remaining(deadline)).await;
            self.adjudicate_attempt(&cid, attempt, result, adjudication);
            attempt += 1;
        }
    }

    /// Classify one solicitation result into a verdict-chain entry
    fn adjudicate_attempt(
        &self,
        cid: &CharacterId,
        attempt: u32,
        result: Result<CompletionResponse, ProviderError>,
        adjudication: &mut Adjudication,
    ) {
        match result {
            Ok(response) => {
                adjudication
                    .tokens
                    .add(response.usage.prompt_tokens, response.usage.completion_tokens);

                match self.intent_from_response(cid, attempt, &response) {
                    Ok(intent) => {
                        adjudication.attempts.push(VerdictRecord {
                            intent: intent.clone(),
                            verdict: Verdict::Approved,
                            note: None,
                        });
                        adjudication.approved = Some(intent);
                    }
                    Err((intent, reason, note)) => {
                        warn!(character = %cid, attempt, reason = %reason, "intent rejected");
                        adjudication.attempts.push(VerdictRecord {
                            intent,
                            verdict: Verdict::Rejected { reason },
                            note: Some(note),
                        });
                        adjudication.last_reason = reason;
                    }
                }
            }
            Err(error) => {
                let reason = if error.is_unavailable() {
                    ReasonCode::Timeout
                } else {
                    ReasonCode::ProviderError
                };
                warn!(character = %cid, attempt, error = %error, "solicitation failed");
                adjudication.attempts.push(VerdictRecord {
                    intent: Intent::new("none", cid.clone(), attempt),
                    verdict: Verdict::Rejected { reason },
                    note: Some(error.to_string()),
                });
                adjudication.last_reason = reason;
            }
        }
    }

    /// Parse a structured response into a whitelist-validated intent
    #[allow(clippy::type_complexity)]
    fn intent_from_response(
        &self,
        cid: &CharacterId,
        attempt: u32,
        response: &CompletionResponse,
    ) -> Result<Intent, (Intent, ReasonCode, String)> {
        let placeholder = || Intent::new("none", cid.clone(), attempt);

        let structured = response.structured.clone().unwrap_or_default();
        let payload: IntentPayload = match serde_json::from_value(structured) {
            Ok(payload) => payload,
            Err(e) => {
                return Err((
                    placeholder(),
                    ReasonCode::ProviderError,
                    format!("unparseable intent payload: {e}"),
                ))
            }
        };

        let intent = Intent {
            action: payload.action,
            parameters: payload.parameters,
            flavor_text: payload.flavor_text,
            author: cid.clone(),
            attempt,
        };

        match self.catalog.validate(&intent) {
            Ok(_) => Ok(intent),
            Err(e) => {
                let reason = whitelist_reason(&e);
                Err((intent, reason, e.to_string()))
            }
        }
    }

    /// Steps 8-12 for one character: fallback, DM, apply, append
    ///
    /// Returns the committed character id. Rule failures append an
    /// aborted record before propagating.
    async fn resolve_and_commit(
        &mut self,
        tick: u64,
        world: &mut WorldState,
        mut adjudication: Adjudication,
        deadline: Instant,
    ) -> Result<CharacterId, NarratorError> {
        let cid = adjudication.character.id.clone();

        // 8. Fallback when the retry budget is exhausted
        let (final_intent, fallback, fallback_reason) = match adjudication.approved.take() {
            Some(intent) => (intent, false, None),
            None => {
                let attempt = adjudication.attempts.len() as u32;
                let intent = self.fallback.intent_for(&adjudication.character, attempt);
                info!(
                    character = %cid,
                    reason = %adjudication.last_reason,
                    "retries exhausted, committing fallback"
                );
                (intent, true, Some(adjudication.last_reason))
            }
        };

        // 9. Deterministic DM package
        let resolve_label = purpose_label(tick, cid.as_str(), "resolve");
        let sub_seed = self.seeds.sub_seed(&resolve_label);
        let _ = self.seeds.rng(&resolve_label);
        adjudication.seed_labels.push(resolve_label);

        let character = world
            .characters
            .get(&cid)
            .cloned()
            .unwrap_or(adjudication.character.clone());
        let package = DmPackage {
            tick,
            character,
            world: world.clone(),
            intent: final_intent.clone(),
            rule_snapshot_id: self.engine.snapshot_id()?,
            sub_seed,
        };
        debug!(
            tick,
            character = %cid,
            package_digest = %package.digest()?,
            "dm package assembled"
        );

        // 10. DM resolution under the tick deadline
        let dm_call = self.dm.resolve(&self.router, &package);
        let dm_result = match tokio::time::timeout(remaining(deadline), dm_call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Unavailable {
                provider_id: "<dm>".to_string(),
                reason: "tick deadline exceeded".to_string(),
            }),
        };

        let mut outcome = match dm_result {
            Ok(resolution) => {
                adjudication.tokens.add(
                    resolution.usage.prompt_tokens,
                    resolution.usage.completion_tokens,
                );
                resolution.outcome
            }
            Err(error) => {
                let reason = if error.is_unavailable() {
                    ReasonCode::Timeout
                } else {
                    ReasonCode::ProviderError
                };
                warn!(character = %cid, error = %error, "dm resolution failed");
                Outcome {
                    verdict: Verdict::Rejected { reason },
                    result: serde_json::Value::Null,
                    rule_trace: Vec::new(),
                    fallback: false,
                    fallback_reason: None,
                }
            }
        };
        outcome.fallback = fallback;
        outcome.fallback_reason = fallback_reason;

        // 11. Apply the outcome through the rule engine
        if outcome.verdict.is_approved() {
            let apply_ctx = RuleContext::applying(world, tick, sub_seed, &outcome);
            let applied = self
                .engine
                .evaluate_tagged(&apply_ctx, "apply")
                .and_then(|result| result.apply_to(world).map(|next| (result, next)));

            match applied {
                Ok((result, next)) => {
                    outcome.rule_trace = result.hit_trace();
                    *world = next;
                }
                Err(rule_error) => {
                    // Fatal to the tick; record the partial event first
                    self.append_aborted(tick, &cid, adjudication, final_intent, outcome)?;
                    return Err(rule_error.into());
                }
            }
        }

        // 12. Exactly one event per character per tick
        let record = EventRecord {
            tick,
            character_id: cid.clone(),
            attempts: adjudication.attempts,
            final_record: FinalRecord {
                intent: final_intent,
                outcome,
                fallback,
                fallback_reason,
            },
            seed_labels: adjudication.seed_labels,
            token_usage: adjudication.tokens,
            aborted: false,
        };
        self.sink.append(&record)?;

        Ok(cid)
    }

    /// Append the partial record for a tick aborted mid-character
    fn append_aborted(
        &mut self,
        tick: u64,
        cid: &CharacterId,
        adjudication: Adjudication,
        final_intent: Intent,
        outcome: Outcome,
    ) -> Result<(), NarratorError> {
        let fallback = outcome.fallback;
        let fallback_reason = outcome.fallback_reason;
        let record = EventRecord {
            tick,
            character_id: cid.clone(),
            attempts: adjudication.attempts,
            final_record: FinalRecord {
                intent: final_intent,
                outcome,
                fallback,
                fallback_reason,
            },
            seed_labels: adjudication.seed_labels,
            token_usage: adjudication.tokens,
            aborted: true,
        };
        self.sink.append(&record)?;
        Ok(())
    }

    /// Build the solicitation request for one attempt
    fn intent_request(
        &self,
        tick: u64,
        cid: &CharacterId,
        view_json: &str,
        attempt: u32,
        feedback: Option<ReasonCode>,
    ) -> CompletionRequest {
        let mut user_prompt = format!(
            "Your view of the world:\n{view_json}\n\nAvailable actions:\n{}",
            self.catalog_summary()
        );
        if let Some(reason) = feedback {
            user_prompt.push_str(&format!(
                "\n\nYour previous attempt was rejected ({reason}). \
                 Choose a whitelisted action with exactly the parameters it allows."
            ));
        }

        CompletionRequest {
            model: String::new(),
            system_prompt: NARRATOR_SYSTEM_PROMPT.to_string(),
            user_prompt,
            temperature: self.options.intent_temperature,
            max_tokens: self.options.intent_max_tokens,
            correlation_id: format!("tick:{tick}:char:{cid}:attempt:{attempt}"),
        }
    }

    /// Render the whitelist for prompts, in stable order
    fn catalog_summary(&self) -> String {
        let mut lines = Vec::new();
        for action in self.catalog.action_names() {
            if let Some(rule) = self.catalog.rule(action) {
                let required: Vec<&str> = rule.required.iter().map(String::as_str).collect();
                let optional: Vec<&str> = rule.optional.iter().map(String::as_str).collect();
                lines.push(format!(
                    "- {action} (required: [{}], optional: [{}])",
                    required.join(", "),
                    optional.join(", ")
                ));
            }
        }
        lines.join("\n")
    }
}

/// One provider call under the remaining tick budget
async fn solicit(
    router: &ProviderRouter,
    request: &CompletionRequest,
    budget: Duration,
) -> Result<CompletionResponse, ProviderError> {
    let call = router.complete_structured(None, request, ResponseSchema::IntentResponse);
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Unavailable {
            provider_id: "<deadline>".to_string(),
            reason: "tick deadline exceeded".to_string(),
        }),
    }
}

/// Time left until the tick deadline
fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Built-in apply-phase rule folding DM outcome effects into the world
///
/// The DM's structured outcome may carry an `effects` object of dotted
/// field paths; this rule surfaces them as ordinary rule effects so
/// world rules at lower priority can observe and adjust them.
fn apply_outcome_rule() -> Box<dyn Rule> {
    Box::new(FnRule::new("narrator.apply-outcome", |ctx, _merged| {
        let Some(outcome) = ctx.outcome else {
            return Ok(RuleOutcome::Miss("no outcome in flight".to_string()));
        };

        match outcome.result.get("effects").and_then(|v| v.as_object()) {
            Some(map) if !map.is_empty() => {
                let mut effects = EffectSet::new();
                for (field, value) in map {
                    effects.set(field.clone(), value.clone());
                }
                Ok(RuleOutcome::Hit(effects))
            }
            _ => Ok(RuleOutcome::Miss("outcome carried no effects".to_string())),
        }
    }))
}

/// Map a whitelist failure onto its reason code
fn whitelist_reason(error: &WhitelistError) -> ReasonCode {
    match error {
        WhitelistError::UnknownAction { .. } => ReasonCode::UnknownAction,
        WhitelistError::MissingParameter { .. } => ReasonCode::MissingParameter,
        WhitelistError::UnknownParameter { .. } => ReasonCode::UnknownParameter,
        WhitelistError::InvalidCatalog { .. } => ReasonCode::UnknownAction,
    }
}
