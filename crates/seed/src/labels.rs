//! Label conventions used by the narrator
//!
//! Labels are free-form, but the narrator derives every per-character
//! stream from these two shapes so replays can be audited by eye.

/// Label for a per-attempt solicitation stream
///
/// Shape: `tick:<n>:char:<id>:attempt:<k>`
pub fn attempt_label(tick: u64, character_id: &str, attempt: u32) -> String {
    format!("tick:{tick}:char:{character_id}:attempt:{attempt}")
}

/// Label for a named per-character purpose (e.g. `resolve`, `visibility`)
///
/// Shape: `tick:<n>:char:<id>:<purpose>`
pub fn purpose_label(tick: u64, character_id: &str, purpose: &str) -> String {
    format!("tick:{tick}:char:{character_id}:{purpose}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_shapes() {
        assert_eq!(attempt_label(7, "gwen", 2), "tick:7:char:gwen:attempt:2");
        assert_eq!(
            purpose_label(7, "gwen", "resolve"),
            "tick:7:char:gwen:resolve"
        );
    }
}
