use thiserror::Error;

/// Simulation errors.
#[derive(Error, Debug)]
pub enum SimError {
    /// The cluster description cannot be simulated.
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    /// Error from the fault protocol itself (quorum sizing, wire codec).
    #[error(transparent)]
    Protocol(#[from] bifp::Error),

    /// A safety property did not hold.
    #[error("invariant violated on {validator}: {detail}")]
    InvariantViolation { validator: String, detail: String },

    /// Messages were still in flight after the step budget ran out.
    #[error("network did not quiesce within {0} steps")]
    StepLimit(usize),
}

pub type Result<T> = std::result::Result<T, SimError>;
