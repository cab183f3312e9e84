//! Packer Error Taxonomy
//!
//! Every failure the packer reacts to falls in one of these classes.
//! Adapters attach a `PackerError` to their `anyhow::Error` so the
//! usecases layer can classify failures with `downcast_ref` without
//! parsing strings twice.

use thiserror::Error;

/// Substrings a node or relayer returns when a nonce was consumed by a
/// concurrent submitter sharing the same signing key.
const NONCE_RACE_PATTERNS: [&str; 3] = [
    "nonce too low",
    "already known",
    "replacement underpriced",
];

/// Substrings a destination contract returns for a delivery it has
/// already applied.
const ALREADY_PROCESSED_PATTERNS: [&str; 2] = ["already processed", "deposit processed"];

/// Classified packer failure.
#[derive(Debug, Error)]
pub enum PackerError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad signature, stale nonce or relayer-set mismatch.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// RPC timeout, relayer 5xx or nonce race. Retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// Contract or relayer refused the action (insufficient collateral,
    /// crossing guard). Logged and skipped, never retried.
    #[error("action rejected: {0}")]
    Rejected(String),

    /// The destination already applied this delivery.
    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    /// The destination reports a processed deposit that differs from the
    /// payload being delivered.
    #[error("deposit {deposit_id} already processed with different contents")]
    DepositMismatch {
        /// Deposit identifier (hex).
        deposit_id: String,
    },
}

impl PackerError {
    /// Whether the failure may succeed on a later attempt.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a raw error message coming back from a node or relayer.
    ///
    /// Nonce races become `Transient`, idempotent deliveries become
    /// `AlreadyProcessed`, everything else is `Rejected`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_nonce_race_message(&message) {
            Self::Transient(message)
        } else if is_already_processed_message(&message) {
            Self::AlreadyProcessed(message)
        } else {
            Self::Rejected(message)
        }
    }
}

/// True if the message reports a nonce consumed by a concurrent submitter.
pub fn is_nonce_race_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    NONCE_RACE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True if the message reports an already-applied delivery.
pub fn is_already_processed_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ALREADY_PROCESSED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// True if anywhere in the error chain there is a nonce race, either as a
/// classified `PackerError::Transient` or as a raw message.
pub fn is_nonce_race(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<PackerError>() {
        Some(PackerError::Transient(msg)) => is_nonce_race_message(msg),
        Some(_) => false,
        None => is_nonce_race_message(&cause.to_string()),
    })
}

/// True if anywhere in the error chain the destination reports the
/// delivery as already applied.
pub fn is_already_processed(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<PackerError>() {
        Some(PackerError::AlreadyProcessed(_)) => true,
        Some(_) => false,
        None => is_already_processed_message(&cause.to_string()),
    })
}

/// True if the error chain carries an authorization failure.
pub fn is_authorization(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<PackerError>(), Some(PackerError::Authorization(_))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_race_patterns_are_case_insensitive() {
        assert!(is_nonce_race_message("Nonce too low: next nonce 7, tx nonce 6"));
        assert!(is_nonce_race_message("ALREADY KNOWN"));
        assert!(is_nonce_race_message("replacement underpriced"));
        assert!(!is_nonce_race_message("insufficient collateral"));
    }

    #[test]
    fn test_from_message_classification() {
        assert!(PackerError::from_message("nonce too low").is_transient());
        assert!(matches!(
            PackerError::from_message("execution reverted: deposit processed"),
            PackerError::AlreadyProcessed(_)
        ));
        assert!(matches!(
            PackerError::from_message("execution reverted: would cross"),
            PackerError::Rejected(_)
        ));
    }

    #[test]
    fn test_chain_inspection_through_context() {
        let err = anyhow::Error::new(PackerError::Transient("nonce too low".into()))
            .context("submitting delivery");
        assert!(is_nonce_race(&err));
        assert!(!is_already_processed(&err));

        let raw = anyhow::anyhow!("server returned: Already Processed");
        assert!(is_already_processed(&raw));

        let auth = anyhow::Error::new(PackerError::Authorization("bad signature".into()));
        assert!(is_authorization(&auth));
        assert!(!is_nonce_race(&auth));
    }
}
