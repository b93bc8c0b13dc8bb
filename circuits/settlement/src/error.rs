use thiserror::Error;

/// Failures on the proving path.
///
/// The two trader-facing classes matter downstream: a witness-generation
/// failure means the committed order parameters do not reproduce the
/// public inputs ("commitment mismatch"), while a proof that fails the
/// local pairing check means the whitelist path did not bind
/// ("merkle verification failed").
#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("proving key rejected: {0}")]
    Zkey(String),
    #[error("witness generator unavailable: {0}")]
    WitnessGenerator(String),
    #[error("commitment mismatch: witness rejected by circuit: {0}")]
    Witness(String),
    #[error("proof generation failed: {0}")]
    Proving(String),
    #[error("merkle verification failed: proof rejected by verifying key")]
    Verification,
    #[error("circuit emitted no public signals")]
    MissingNullifier,
}
