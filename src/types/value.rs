use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Periodic snapshot of a held balance's valuation, pruned on schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinValue {
    pub coin: String,
    pub balance: Decimal,
    pub usd_price: Decimal,
    pub btc_price: Decimal,
    pub datetime: DateTime<Utc>,
}
