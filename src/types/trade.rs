use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One order leg of a bridge transition. Advances STARTING -> ORDERED ->
/// COMPLETE monotonically; never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Starting,
    Ordered,
    Complete,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeState::Starting => write!(f, "STARTING"),
            TradeState::Ordered => write!(f, "ORDERED"),
            TradeState::Complete => write!(f, "COMPLETE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub alt_coin: String,
    pub crypto_coin: String,
    pub selling: bool,
    pub alt_amount: Decimal,
    pub crypto_amount: Decimal,
    pub state: TradeState,
    pub datetime: DateTime<Utc>,
}
