use darkpool_crypto::CryptoError;
use settlement_circuit::CircuitError;
use thiserror::Error;
use whitelist_tree::WhitelistError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown match: {0}")]
    UnknownMatch(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("whitelist error: {0}")]
    Whitelist(#[from] WhitelistError),
    #[error("circuit error: {0}")]
    Circuit(#[from] CircuitError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("service unavailable: {0}")]
    Unavailable(&'static str),
}

pub type NodeResult<T> = Result<T, NodeError>;
