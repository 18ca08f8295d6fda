use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradeable asset symbol, e.g. "ETH". Coins are operator-configured rather
/// than a fixed enum: `SUPPORTED_COIN_LIST` names whichever alts are in play.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: String,
    pub enabled: bool,
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// The universal quote asset every rotation routes through. Not itself a row
/// in `coins` — just a configured symbol compared against by equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bridge(pub String);

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Bridge {
    pub fn symbol(&self) -> &str {
        &self.0
    }

    /// The market symbol for trading `coin` against this bridge, e.g. "ETHUSDT".
    pub fn market_symbol(&self, coin: &str) -> String {
        format!("{coin}{}", self.0)
    }
}
