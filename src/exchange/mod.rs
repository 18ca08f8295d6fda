pub mod binance;
pub mod cache;
pub mod websocket;

pub use binance::BinanceClient;
pub use cache::BalanceCache;
pub use websocket::PriceStream;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::Trade;

/// Named failure modes of the exchange adapter contract (spec §7's
/// taxonomy: order rejection, credential failure, transient request
/// failure). Grounded on `other_examples/.../arbitrage-engine-src-lib.rs`'s
/// `ArbitrageError` shape (`thiserror::Error`, flat enum of named variants).
/// `sell_alt`/`buy_alt` rejection is modeled as `Ok(None)` per the trait
/// contract, not as a variant here; this enum covers the request/credential
/// failures that are genuinely exceptional.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("exchange rejected the request: {0}")]
    Api(String),

    #[error("credential probe failed: {0}")]
    CredentialProbe(String),
}

/// One open-high-low-close-volume bar. Open price lives at index 1 in the
/// wire format this is decoded from; kept here as a named field instead.
#[derive(Debug, Clone, Copy)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Exchange adapter contract: prices, balances, fees, min-notional, order
/// placement, and historical klines. All calls may block on network I/O;
/// that is the only place the trading loop yields.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Current mid/last price for `symbol` (e.g. "ETHUSDT"); `None` if the
    /// symbol is absent from the exchange.
    async fn get_ticker_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>>;

    /// Best bid from the streamed book.
    async fn get_sell_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>>;

    /// Best ask from the streamed book.
    async fn get_buy_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>>;

    async fn get_currency_balance(&self, coin: &str, force_refresh: bool) -> anyhow::Result<Decimal>;

    async fn get_min_notional(&self, alt: &str, bridge: &str) -> anyhow::Result<Decimal>;

    /// Effective fee rate for `coin` priced against `bridge`.
    async fn get_fee(&self, coin: &str, bridge: &str, selling: bool) -> anyhow::Result<Decimal>;

    /// Market-sells all available `from` balance for `bridge`. Blocks until
    /// the order reaches COMPLETE; `Ok(None)` on rejection.
    async fn sell_alt(&self, from: &str, bridge: &str) -> anyhow::Result<Option<Trade>>;

    /// Market-buys `to` with available `bridge` balance. `limit_price` bounds
    /// the fill when set. Blocks until COMPLETE; `Ok(None)` on rejection.
    async fn buy_alt(
        &self,
        to: &str,
        bridge: &str,
        limit_price: Option<Decimal>,
    ) -> anyhow::Result<Option<Trade>>;

    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<Kline>>;

    /// The exchange's notion of current time.
    async fn now(&self) -> DateTime<Utc>;

    /// Credential probe at startup; failure aborts boot.
    async fn get_account(&self) -> anyhow::Result<()>;

    /// Graceful shutdown of any streaming connection.
    async fn close(&self);
}
