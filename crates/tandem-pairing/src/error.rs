//! Error types for the pairing layer.

/// Errors surfaced by the pairing coordinator.
///
/// Unknown callers, double joins and late heartbeats are not errors; they
/// are absorbed as no-ops or idempotent replies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    /// The coordinator actor has shut down, so its command channel is
    /// closed or it dropped the reply.
    #[error("pairing coordinator is unavailable")]
    Unavailable,

    /// A structural invariant does not hold. Only produced by
    /// [`PairingState::check_invariants`](crate::PairingState::check_invariants).
    #[error("pairing invariant violated: {0}")]
    InvariantViolated(String),
}
