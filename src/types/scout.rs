use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Diagnostic log of one ratio evaluation. Logged unconditionally for every
/// outgoing pair considered, independent of whether a jump happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutEntry {
    pub from_coin: String,
    pub to_coin: String,
    pub remembered_ratio: Decimal,
    pub current_coin_price: Decimal,
    pub other_coin_price: Decimal,
    pub datetime: DateTime<Utc>,
}
