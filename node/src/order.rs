//! Order and match types shared across the pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

use ark_bn254::Fr;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Trader-facing decimals map onto integers scaled by 1e7.
pub const PRICE_SCALE: u64 = 10_000_000;
/// Symbols are short tickers, uppercased server-side.
pub const MAX_SYMBOL_LEN: usize = 12;
/// Compliance-whitelisted addresses: 56 characters beginning with `C`.
pub const ADDRESS_LEN: usize = 56;
pub const ADDRESS_PREFIX: char = 'C';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Field encoding used inside commitments: Buy = 0, Sell = 1.
    pub fn as_field(self) -> u64 {
        match self {
            Side::Buy => darkpool_crypto::SIDE_BUY,
            Side::Sell => darkpool_crypto::SIDE_SELL,
        }
    }
}

impl TryFrom<u8> for Side {
    type Error = NodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            other => Err(NodeError::InvalidInput(format!(
                "side must be 0 (buy) or 1 (sell), got {other}"
            ))),
        }
    }
}

impl From<Side> for u8 {
    fn from(side: Side) -> Self {
        side.as_field() as u8
    }
}

/// A committed order resting on (or passing through) the book.
///
/// `timestamp` is the monotonic receipt sequence assigned by the ingest
/// actor; `expiry` is a wall-clock deadline in unix milliseconds.
#[derive(Clone, Debug)]
pub struct PrivateOrder {
    pub commitment: Fr,
    pub trader: String,
    pub asset_address: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub price: u64,
    pub secret: Fr,
    pub nonce: Fr,
    pub timestamp: u64,
    pub expiry: u64,
    pub whitelist_index: usize,
}

#[derive(Clone, Debug)]
pub struct Match {
    pub match_id: String,
    pub buy_order: PrivateOrder,
    pub sell_order: PrivateOrder,
    pub execution_price: u64,
    pub execution_quantity: u64,
    pub timestamp: u64,
}

impl Match {
    /// Pair a crossed buy/sell. Quantities must already be equal; the
    /// execution price is the integer midpoint.
    pub fn pair(buy_order: PrivateOrder, sell_order: PrivateOrder) -> Self {
        debug_assert_eq!(buy_order.quantity, sell_order.quantity);
        let execution_price = (buy_order.price + sell_order.price) / 2;
        let execution_quantity = buy_order.quantity;
        Self {
            match_id: new_match_id(),
            buy_order,
            sell_order,
            execution_price,
            execution_quantity,
            timestamp: now_ms(),
        }
    }

    pub fn asset(&self) -> &str {
        &self.buy_order.asset_address
    }

    pub fn buyer(&self) -> &str {
        &self.buy_order.trader
    }

    pub fn seller(&self) -> &str {
        &self.sell_order.trader
    }
}

/// 32 random bytes, hex-encoded.
pub fn new_match_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
