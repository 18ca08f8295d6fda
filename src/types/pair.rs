use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An ordered directed edge from_coin -> to_coin. `ratio` is null until the
/// ratio book initializes it; once set it is always strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub from_coin: String,
    pub to_coin: String,
    pub ratio: Option<Decimal>,
}

/// Singleton pointer naming the alt currently held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentCoin {
    pub symbol: String,
    pub since: chrono::DateTime<chrono::Utc>,
}
