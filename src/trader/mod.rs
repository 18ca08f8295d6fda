use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::exchange::Exchange;
use crate::ratio_book;
use crate::store::Store;
use crate::types::{Bridge, Trade};

/// Hard-coded bridge-balance fallback threshold from spec §4.3 PRECHECK /
/// §9 Open Questions: a USDT-specific policy constant, not derived from
/// `min_notional` and not configurable.
pub const BRIDGE_FALLBACK_MIN_UNITS: Decimal = dec!(10);

/// States of one transition attempt (spec §4.3). `Idle` never appears as a
/// return value; it is only the implicit state before `transition_through_bridge`
/// is called and after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Precheck,
    Selling,
    Bought,
    Anchored,
    Aborted,
}

/// Outcome of one `transition_through_bridge` call.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Anchored { to_coin: String, fill_price: Decimal },
    Aborted { state: TransitionState, reason: String },
}

/// Implements spec §4.3, the two-leg bridge transition: PRECHECK -> SELLING
/// -> BOUGHT -> ANCHORED, aborting to scouting on any leg's failure. Holds
/// the `failed_buy_order` flag set on a failed buy leg so the next scout
/// cycle knows to run bridge-scout instead of a normal jump (spec §4.3
/// Atomicity / S5).
pub struct AutoTrader {
    store: Arc<Store>,
    exchange: Arc<dyn Exchange>,
    config: Arc<AppConfig>,
    bridge: Bridge,
    failed_buy_order: Arc<AtomicBool>,
}

impl AutoTrader {
    pub fn new(store: Arc<Store>, exchange: Arc<dyn Exchange>, config: Arc<AppConfig>) -> Self {
        let bridge = Bridge(config.bridge.clone());
        Self {
            store,
            exchange,
            config,
            bridge,
            failed_buy_order: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failed_buy_order(&self) -> bool {
        self.failed_buy_order.load(Ordering::Acquire)
    }

    pub fn clear_failed_buy_order(&self) {
        self.failed_buy_order.store(false, Ordering::Release);
    }

    /// Jumps from `from` to `to` through the bridge. Never panics on
    /// exchange/store error paths that spec §7 calls non-fatal; those are
    /// folded into `Aborted`. A genuine `Err` return means a store I/O error,
    /// which the supervisor is tolerant of (spec §7: "propagate out of the
    /// current job").
    pub async fn transition_through_bridge(&self, from: &str, to: &str) -> Result<TransitionOutcome> {
        let bridge_symbol = self.bridge.symbol();
        let from_market = self.bridge.market_symbol(from);

        let can_sell = self.precheck(from, &from_market).await?;
        let can_sell = match can_sell {
            Some(can_sell) => can_sell,
            None => {
                return Ok(TransitionOutcome::Aborted {
                    state: TransitionState::Precheck,
                    reason: format!("insufficient {from} balance and no leftover {bridge_symbol} to fall back on"),
                });
            }
        };

        if can_sell {
            let sold = self.exchange.sell_alt(from, bridge_symbol).await?;
            match sold {
                Some(trade) => self.record_trade(&trade).await,
                None => {
                    info!("transition {from}->{to}: sell leg rejected, returning to scouting");
                    return Ok(TransitionOutcome::Aborted {
                        state: TransitionState::Selling,
                        reason: "sell order rejected".to_string(),
                    });
                }
            }
        }

        let bought = self.exchange.buy_alt(to, bridge_symbol, None).await?;
        let fill_price = match bought {
            Some(trade) => {
                self.failed_buy_order.store(false, Ordering::Release);
                let price = trade.crypto_amount / trade.alt_amount;
                self.record_trade(&trade).await;
                price
            }
            None => {
                self.failed_buy_order.store(true, Ordering::Release);
                info!("transition {from}->{to}: buy leg rejected, next cycle will bridge-scout");
                return Ok(TransitionOutcome::Aborted {
                    state: TransitionState::Bought,
                    reason: "buy order rejected".to_string(),
                });
            }
        };

        let now = self.exchange.now().await;
        self.store.set_current_coin(to, now).await?;

        let mut session = self.store.begin().await?;
        ratio_book::post_jump_reset(&mut session, self.exchange.as_ref(), &self.bridge, from, to, fill_price).await?;
        session.commit().await?;

        info!("transition {from}->{to}: ANCHORED at {fill_price}");
        Ok(TransitionOutcome::Anchored {
            to_coin: to.to_string(),
            fill_price,
        })
    }

    /// PRECHECK (spec §4.3): `Some(true)` to sell-then-buy, `Some(false)` to
    /// skip straight to the buy leg against leftover bridge balance,
    /// `None` to abort.
    async fn precheck(&self, from: &str, from_market: &str) -> Result<Option<bool>> {
        let min_notional = self
            .exchange
            .get_min_notional(from, self.bridge.symbol())
            .await?;
        let from_price = self.exchange.get_ticker_price(from_market).await?;

        let sellable = |balance: Decimal, price: Option<Decimal>| {
            price.map(|p| balance * p > min_notional).unwrap_or(false)
        };

        let balance = self.exchange.get_currency_balance(from, false).await?;
        if sellable(balance, from_price) {
            return Ok(Some(true));
        }

        warn!("precheck: cached balance resulted in an invalid opportunity, refreshing balance to confirm");
        let balance = self.exchange.get_currency_balance(from, true).await?;
        if sellable(balance, from_price) {
            return Ok(Some(true));
        }

        info!("precheck: skipping sell, maybe the order already went ahead? balance={balance}, min_notional={min_notional}");
        let bridge_balance = self
            .exchange
            .get_currency_balance(self.bridge.symbol(), false)
            .await?;
        if bridge_balance >= BRIDGE_FALLBACK_MIN_UNITS {
            info!("precheck: looks like there is bridge currency, will continue with buy");
            return Ok(Some(false));
        }

        Ok(None)
    }

    async fn record_trade(&self, trade: &Trade) {
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => {
                warn!("failed to open store session to record trade {}: {e}", trade.id);
                return;
            }
        };
        if let Err(e) = session.insert_trade(trade).await {
            warn!("failed to record trade {}: {e}", trade.id);
            return;
        }
        if let Err(e) = session.commit().await {
            warn!("failed to commit trade {}: {e}", trade.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::config::AppConfig;
    use crate::store::Store;
    use crate::test_support::{fake_trade, FakeExchange};

    #[test]
    fn bridge_fallback_threshold_is_ten() {
        assert_eq!(BRIDGE_FALLBACK_MIN_UNITS, dec!(10));
    }

    async fn trader_with(exchange: FakeExchange) -> (AutoTrader, Arc<Store>) {
        let store = Arc::new(Store::connect_test().await.unwrap());
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        let config = Arc::new(AppConfig {
            bridge: "USDT".to_string(),
            ..Default::default()
        });
        let trader = AutoTrader::new(store.clone(), Arc::new(exchange), config);
        (trader, store)
    }

    // S5 — sell succeeds, buy leg returns null: `failed_buy_order` is set so
    // the next scout cycle triggers bridge-scout, and the transition aborts
    // without touching the current-coin pointer or the ratio book.
    #[tokio::test]
    async fn buy_leg_rejection_sets_failed_buy_order_and_aborts() {
        let exchange = FakeExchange::new()
            .with_price("AUSDT", dec!(10))
            .with_balance("A", dec!(5))
            .with_min_notional("A", dec!(1));
        exchange.queue_sell(Some(fake_trade("A", "USDT", true, dec!(5), dec!(50))));
        // No queued buy: buy_alt returns None (rejected).

        let (trader, store) = trader_with(exchange).await;
        store.set_current_coin("A", Utc::now()).await.unwrap();

        let outcome = trader.transition_through_bridge("A", "B").await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Aborted { state: TransitionState::Bought, .. }));
        assert!(trader.failed_buy_order());

        let current = store.get_current_coin().await.unwrap().unwrap();
        assert_eq!(current.symbol, "A", "current coin must not change on a failed buy leg");
    }

    #[tokio::test]
    async fn successful_transition_clears_failed_buy_order_and_anchors() {
        let exchange = FakeExchange::new()
            .with_price("AUSDT", dec!(10))
            .with_price("BUSDT", dec!(20))
            .with_balance("A", dec!(5))
            .with_min_notional("A", dec!(1));
        exchange.queue_sell(Some(fake_trade("A", "USDT", true, dec!(5), dec!(50))));
        exchange.queue_buy(Some(fake_trade("B", "USDT", false, dec!(2.5), dec!(50))));

        let (trader, store) = trader_with(exchange).await;
        store.set_current_coin("A", Utc::now()).await.unwrap();

        let outcome = trader.transition_through_bridge("A", "B").await.unwrap();
        match outcome {
            TransitionOutcome::Anchored { to_coin, fill_price } => {
                assert_eq!(to_coin, "B");
                assert_eq!(fill_price, dec!(20));
            }
            other => panic!("expected Anchored, got {other:?}"),
        }
        assert!(!trader.failed_buy_order());

        let current = store.get_current_coin().await.unwrap().unwrap();
        assert_eq!(current.symbol, "B");
    }

    // §4.3 PRECHECK: no sellable balance and no leftover bridge dust aborts
    // cleanly without placing any order.
    #[tokio::test]
    async fn precheck_aborts_when_nothing_to_sell_and_no_bridge_dust() {
        let exchange = FakeExchange::new().with_price("AUSDT", dec!(10));
        let (trader, store) = trader_with(exchange).await;
        store.set_current_coin("A", Utc::now()).await.unwrap();

        let outcome = trader.transition_through_bridge("A", "B").await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Aborted { state: TransitionState::Precheck, .. }));
    }

    // §4.3 PRECHECK fallback: below min-notional balance but bridge already
    // holds dust from a prior partial transition skips straight to the buy leg.
    #[tokio::test]
    async fn precheck_falls_back_to_buy_when_bridge_has_leftover_balance() {
        let exchange = FakeExchange::new()
            .with_price("AUSDT", dec!(10))
            .with_balance("USDT", dec!(15))
            .with_min_notional("A", dec!(1000));
        exchange.queue_buy(Some(fake_trade("B", "USDT", false, dec!(0.75), dec!(15))));

        let (trader, store) = trader_with(exchange).await;
        store.set_current_coin("A", Utc::now()).await.unwrap();

        let outcome = trader.transition_through_bridge("A", "B").await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Anchored { .. }));
    }
}
