use thiserror::Error;

/// Closed error taxonomy at the provider boundary
///
/// Everything a provider can fail with maps onto exactly one of these
/// three kinds; the narrator's retry policy branches on the kind and
/// never on vendor-specific detail.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport, auth, rate-limit or deadline failure
    #[error("provider {provider_id} unavailable: {reason}")]
    Unavailable {
        /// Provider that failed
        provider_id: String,
        /// Transport-level reason
        reason: String,
    },

    /// Response did not conform to the requested schema
    #[error("provider {provider_id} response failed validation: {reason}")]
    Validation {
        /// Provider whose response failed validation
        provider_id: String,
        /// First violated constraint
        reason: String,
    },

    /// Anything else recoverable at the provider boundary
    #[error("provider {provider_id} error: {reason}")]
    Other {
        /// Provider that failed
        provider_id: String,
        /// Failure detail
        reason: String,
    },
}

impl ProviderError {
    /// Whether this failure was a deadline or transport problem
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::Unavailable { .. })
    }

    /// The provider the error originated from
    pub fn provider_id(&self) -> &str {
        match self {
            ProviderError::Unavailable { provider_id, .. }
            | ProviderError::Validation { provider_id, .. }
            | ProviderError::Other { provider_id, .. } => provider_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        let err = ProviderError::Unavailable {
            provider_id: "local".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_unavailable());
        assert_eq!(err.provider_id(), "local");

        let err = ProviderError::Validation {
            provider_id: "local".to_string(),
            reason: "missing field".to_string(),
        };
        assert!(!err.is_unavailable());
    }
}
