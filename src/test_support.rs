//! Shared test doubles for `ratio_book`, `strategy`, and `trader` unit
//! tests (spec §8: scenarios S1-S6 must be covered by unit tests in those
//! modules). Not compiled into the release binary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::exchange::{Exchange, Kline};
use crate::types::{Trade, TradeState};

/// A scripted `Exchange` double: every query reads from a map seeded by the
/// test, and `sell_alt`/`buy_alt` return pre-queued trades (or `None`/`Err`
/// to simulate rejection) so a test can drive §4.3's PRECHECK/SELLING/BOUGHT
/// branches deterministically.
pub struct FakeExchange {
    pub ticker_prices: Mutex<HashMap<String, Decimal>>,
    pub sell_prices: Mutex<HashMap<String, Decimal>>,
    pub buy_prices: Mutex<HashMap<String, Decimal>>,
    pub balances: Mutex<HashMap<String, Decimal>>,
    pub min_notional: Mutex<HashMap<String, Decimal>>,
    pub fees: Mutex<HashMap<(String, bool), Decimal>>,
    pub klines: Mutex<HashMap<String, Vec<Kline>>>,
    pub queued_sells: Mutex<Vec<Option<Trade>>>,
    pub queued_buys: Mutex<Vec<Option<Trade>>>,
    pub now: Mutex<DateTime<Utc>>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            ticker_prices: Mutex::new(HashMap::new()),
            sell_prices: Mutex::new(HashMap::new()),
            buy_prices: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            min_notional: Mutex::new(HashMap::new()),
            fees: Mutex::new(HashMap::new()),
            klines: Mutex::new(HashMap::new()),
            queued_sells: Mutex::new(Vec::new()),
            queued_buys: Mutex::new(Vec::new()),
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.ticker_prices.lock().unwrap().insert(symbol.to_string(), price);
        self
    }

    pub fn with_min_notional(self, symbol: &str, amount: Decimal) -> Self {
        self.min_notional.lock().unwrap().insert(symbol.to_string(), amount);
        self
    }

    pub fn with_balance(self, coin: &str, amount: Decimal) -> Self {
        self.balances.lock().unwrap().insert(coin.to_string(), amount);
        self
    }

    pub fn with_fee(self, coin: &str, selling: bool, fee: Decimal) -> Self {
        self.fees.lock().unwrap().insert((coin.to_string(), selling), fee);
        self
    }

    pub fn queue_sell(&self, trade: Option<Trade>) {
        self.queued_sells.lock().unwrap().push(trade);
    }

    pub fn queue_buy(&self, trade: Option<Trade>) {
        self.queued_buys.lock().unwrap().push(trade);
    }
}

pub fn fake_trade(alt_coin: &str, crypto_coin: &str, selling: bool, alt_amount: Decimal, crypto_amount: Decimal) -> Trade {
    Trade {
        id: uuid::Uuid::new_v4().to_string(),
        alt_coin: alt_coin.to_string(),
        crypto_coin: crypto_coin.to_string(),
        selling,
        alt_amount,
        crypto_amount,
        state: TradeState::Complete,
        datetime: Utc::now(),
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    async fn get_ticker_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.ticker_prices.lock().unwrap().get(symbol).copied())
    }

    async fn get_sell_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        let prices = self.sell_prices.lock().unwrap();
        if let Some(p) = prices.get(symbol) {
            return Ok(Some(*p));
        }
        drop(prices);
        self.get_ticker_price(symbol).await
    }

    async fn get_buy_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
        let prices = self.buy_prices.lock().unwrap();
        if let Some(p) = prices.get(symbol) {
            return Ok(Some(*p));
        }
        drop(prices);
        self.get_ticker_price(symbol).await
    }

    async fn get_currency_balance(&self, coin: &str, _force_refresh: bool) -> anyhow::Result<Decimal> {
        Ok(self.balances.lock().unwrap().get(coin).copied().unwrap_or(Decimal::ZERO))
    }

    async fn get_min_notional(&self, alt: &str, _bridge: &str) -> anyhow::Result<Decimal> {
        Ok(self.min_notional.lock().unwrap().get(alt).copied().unwrap_or(Decimal::ZERO))
    }

    async fn get_fee(&self, coin: &str, _bridge: &str, selling: bool) -> anyhow::Result<Decimal> {
        Ok(self
            .fees
            .lock()
            .unwrap()
            .get(&(coin.to_string(), selling))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn sell_alt(&self, _from: &str, _bridge: &str) -> anyhow::Result<Option<Trade>> {
        Ok(self.queued_sells.lock().unwrap().pop())
    }

    async fn buy_alt(&self, _to: &str, _bridge: &str, _limit_price: Option<Decimal>) -> anyhow::Result<Option<Trade>> {
        Ok(self.queued_buys.lock().unwrap().pop())
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        _interval: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _limit: u32,
    ) -> anyhow::Result<Vec<Kline>> {
        Ok(self.klines.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn get_account(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
