use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

/// Single-writer (stream / post-trade updater) / single-reader (trading
/// loop) balance cache. The reader may demand a forced refresh to bypass it
/// entirely; this struct only holds the last value written, it never talks
/// to the exchange itself.
#[derive(Clone, Default)]
pub struct BalanceCache {
    balances: Arc<RwLock<HashMap<String, Decimal>>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, coin: &str) -> Option<Decimal> {
        self.balances.read().await.get(coin).copied()
    }

    pub async fn set(&self, coin: &str, amount: Decimal) {
        self.balances.write().await.insert(coin.to_string(), amount);
    }
}

/// Best bid/ask book populated by the price stream, read synchronously by
/// the trading loop.
#[derive(Clone, Default)]
pub struct BookCache {
    book: Arc<RwLock<HashMap<String, (Decimal, Decimal)>>>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.book.write().await.insert(symbol.to_string(), (bid, ask));
    }

    pub async fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.book.read().await.get(symbol).map(|(bid, _)| *bid)
    }

    pub async fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.book.read().await.get(symbol).map(|(_, ask)| *ask)
    }
}
