use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("poseidon error: {0}")]
    Poseidon(#[from] light_poseidon::PoseidonError),
    #[error("poseidon arity {0} is unsupported")]
    UnsupportedArity(usize),
    #[error("not a decimal field element: {0}")]
    InvalidDecimal(String),
}
