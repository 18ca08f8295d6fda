use std::collections::HashMap;

use anyhow::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::exchange::Exchange;
use crate::store::{PairFilter, StoreSession};
use crate::types::Bridge;

/// Fetches a live bridge price for `coin`, logging and returning `None`
/// rather than erroring when the exchange has no symbol or no price.
async fn live_price(exchange: &dyn Exchange, bridge: &Bridge, coin: &str) -> Option<Decimal> {
    let symbol = bridge.market_symbol(coin);
    match exchange.get_ticker_price(&symbol).await {
        Ok(price) => price,
        Err(e) => {
            warn!("ratio book: price lookup failed for {symbol}: {e}");
            None
        }
    }
}

/// Cold-initializes every null-ratio pair between enabled coins from a
/// single live price snapshot: `ratio = price(from)/price(to)`.
pub async fn initialize_cold(
    session: &mut StoreSession<'_>,
    exchange: &dyn Exchange,
    bridge: &Bridge,
) -> Result<()> {
    let pairs = session
        .list_pairs(PairFilter {
            ratio_is_null: Some(true),
            enabled_endpoints_only: true,
            ..Default::default()
        })
        .await?;

    for pair in pairs {
        let price_from = live_price(exchange, bridge, &pair.from_coin).await;
        let price_to = live_price(exchange, bridge, &pair.to_coin).await;

        match (price_from, price_to) {
            (Some(from), Some(to)) if !to.is_zero() => {
                session
                    .set_pair_ratio(&pair.from_coin, &pair.to_coin, from / to)
                    .await?;
            }
            _ => {
                debug!(
                    "ratio book: skipping cold init of {}->{}, price unavailable",
                    pair.from_coin, pair.to_coin
                );
            }
        }
    }

    Ok(())
}

/// Warm-initializes every null-ratio pair between enabled coins by seeding
/// an EWMA of length `w` (`RATIO_ADJUST_WEIGHT`) over the last `2w` 1-minute
/// open prices, batched one history fetch per coin rather than per pair.
pub async fn initialize_warm(
    session: &mut StoreSession<'_>,
    exchange: &dyn Exchange,
    bridge: &Bridge,
    coins: &[String],
    w: u32,
) -> Result<()> {
    if w == 0 {
        warn!("ratio book: RATIO_ADJUST_WEIGHT must be >= 1, skipping warm init");
        return Ok(());
    }

    let two_w = 2 * w;
    let end = exchange.now().await;
    let start = end - Duration::minutes(two_w as i64);

    let mut histories: HashMap<String, Vec<Decimal>> = HashMap::new();
    for coin in coins {
        let symbol = bridge.market_symbol(coin);
        let klines = exchange
            .get_historical_klines(&symbol, "1m", start, end, two_w)
            .await?;
        histories.insert(coin.clone(), klines.iter().map(|k| k.open).collect());
    }

    let pairs = session
        .list_pairs(PairFilter {
            ratio_is_null: Some(true),
            enabled_endpoints_only: true,
            ..Default::default()
        })
        .await?;

    for pair in pairs {
        let (Some(price_from), Some(price_to)) = (
            histories.get(&pair.from_coin),
            histories.get(&pair.to_coin),
        ) else {
            continue;
        };

        if price_from.len() != two_w as usize || price_to.len() != two_w as usize {
            debug!(
                "ratio book: skipping warm init of {}->{}, history length mismatch",
                pair.from_coin, pair.to_coin
            );
            continue;
        }

        let w_usize = w as usize;
        let w_dec = Decimal::from(w);

        let mut sma = Decimal::ZERO;
        for i in 0..w_usize {
            sma += price_from[i] / price_to[i];
        }
        sma /= w_dec;

        let mut r = sma;
        for i in w_usize..two_w as usize {
            r = (w_dec * r + price_from[i] / price_to[i]) / (w_dec + Decimal::ONE);
        }

        session
            .set_pair_ratio(&pair.from_coin, &pair.to_coin, r)
            .await?;
    }

    Ok(())
}

/// Periodic EWMA re-anchor: every pair between enabled coins with a
/// non-null ratio is nudged toward the live sell(from)/buy(to) ratio.
/// A pair is skipped, leaving its ratio unchanged, if either side's book
/// price or the ratio itself is unavailable.
pub async fn reanchor(
    session: &mut StoreSession<'_>,
    exchange: &dyn Exchange,
    bridge: &Bridge,
    w: u32,
) -> Result<()> {
    let w_dec = Decimal::from(w);

    let pairs = session
        .list_pairs(PairFilter {
            ratio_is_null: Some(false),
            enabled_endpoints_only: true,
            ..Default::default()
        })
        .await?;

    for pair in pairs {
        let Some(current_ratio) = pair.ratio else {
            continue;
        };

        let sell_symbol = bridge.market_symbol(&pair.from_coin);
        let buy_symbol = bridge.market_symbol(&pair.to_coin);

        let sell_price = exchange.get_sell_price(&sell_symbol).await.ok().flatten();
        let buy_price = exchange.get_buy_price(&buy_symbol).await.ok().flatten();

        match (sell_price, buy_price) {
            (Some(sell), Some(buy)) if !buy.is_zero() => {
                let new_ratio = (w_dec * current_ratio + sell / buy) / (w_dec + Decimal::ONE);
                session
                    .set_pair_ratio(&pair.from_coin, &pair.to_coin, new_ratio)
                    .await?;
            }
            _ => {
                debug!(
                    "ratio book: skipping reanchor of {}->{}, price unavailable",
                    pair.from_coin, pair.to_coin
                );
            }
        }
    }

    Ok(())
}

/// Post-jump threshold reset after a successful transition to `to_coin` at
/// buy-leg fill price `fill_price`. Updates the inverse pair using the
/// *live* price of `source_coin` (not its pre-jump sell price — preserved
/// intentionally, see DESIGN.md's Open Questions), and every `X -> to_coin`
/// pair using the live price of X. Pairs not touching `to_coin` are
/// untouched; missing prices skip that row with a log line.
pub async fn post_jump_reset(
    session: &mut StoreSession<'_>,
    exchange: &dyn Exchange,
    bridge: &Bridge,
    source_coin: &str,
    to_coin: &str,
    fill_price: Decimal,
) -> Result<()> {
    match live_price(exchange, bridge, source_coin).await {
        Some(source_price) if !source_price.is_zero() => {
            session
                .set_pair_ratio(to_coin, source_coin, fill_price / source_price)
                .await?;
        }
        _ => {
            warn!("ratio book: skipping inverse reset {to_coin}->{source_coin}, price unavailable");
        }
    }

    let enabled = session.list_enabled_coins().await?;
    for x in enabled {
        if x == to_coin {
            continue;
        }
        match live_price(exchange, bridge, &x).await {
            Some(price_x) if !fill_price.is_zero() => {
                session
                    .set_pair_ratio(&x, to_coin, price_x / fill_price)
                    .await?;
            }
            _ => {
                debug!("ratio book: skipping reset {x}->{to_coin}, price unavailable");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ewma_update_matches_spec_formula() {
        let w = dec!(10);
        let r = dec!(2);
        let sample = dec!(2.2);
        let updated = (w * r + sample) / (w + Decimal::ONE);
        assert_eq!(updated, (dec!(20) + dec!(2.2)) / dec!(11));
    }

    #[test]
    fn ewma_stays_within_sample_bounds() {
        // Law: if the live ratio stream is bounded in [a,b], the EWMA-updated
        // ratio remains in [a,b], since it is always a convex combination.
        let w = dec!(10);
        let mut r = dec!(1.0);
        let samples = [dec!(1.2), dec!(0.9), dec!(1.1), dec!(1.05)];
        for s in samples {
            r = (w * r + s) / (w + Decimal::ONE);
            assert!(r >= dec!(0.9) && r <= dec!(1.2));
        }
    }

    // S1 — Cold init: coins {A,B,C}, bridge USDT, prices A=10,B=20,C=5.
    #[tokio::test]
    async fn cold_init_sets_ratio_as_from_over_to_price() {
        use crate::store::Store;
        use crate::test_support::FakeExchange;

        let store = Store::connect_test().await.unwrap();
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string(), "C".to_string()])
            .await
            .unwrap();

        let exchange = FakeExchange::new()
            .with_price("AUSDT", dec!(10))
            .with_price("BUSDT", dec!(20))
            .with_price("CUSDT", dec!(5));
        let bridge = Bridge("USDT".to_string());

        let mut session = store.begin().await.unwrap();
        initialize_cold(&mut session, &exchange, &bridge).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.begin().await.unwrap();
        assert_eq!(session.get_pair("A", "B").await.unwrap().unwrap().ratio, Some(dec!(0.5)));
        assert_eq!(session.get_pair("A", "C").await.unwrap().unwrap().ratio, Some(dec!(2)));
        assert_eq!(session.get_pair("B", "A").await.unwrap().unwrap().ratio, Some(dec!(2)));
        assert_eq!(session.get_pair("B", "C").await.unwrap().unwrap().ratio, Some(dec!(4)));
        assert_eq!(session.get_pair("C", "A").await.unwrap().unwrap().ratio, Some(dec!(0.5)));
        assert_eq!(session.get_pair("C", "B").await.unwrap().unwrap().ratio, Some(dec!(0.25)));
        session.commit().await.unwrap();
    }

    // S6 — a pair whose candidate price is unavailable is skipped, not fatal.
    #[tokio::test]
    async fn cold_init_skips_pair_with_missing_price() {
        use crate::store::Store;
        use crate::test_support::FakeExchange;

        let store = Store::connect_test().await.unwrap();
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        // B's price is never seeded; both directions touching it stay null.
        let exchange = FakeExchange::new().with_price("AUSDT", dec!(10));
        let bridge = Bridge("USDT".to_string());

        let mut session = store.begin().await.unwrap();
        initialize_cold(&mut session, &exchange, &bridge).await.unwrap();
        let pair = session.get_pair("A", "B").await.unwrap().unwrap();
        assert!(pair.ratio.is_none());
        session.commit().await.unwrap();
    }

    // S2 — post-jump reset on a 3-coin book: jump A->C with fill price 5,
    // source A's live price 12.
    #[tokio::test]
    async fn post_jump_reset_matches_spec_formula() {
        use crate::store::Store;
        use crate::test_support::FakeExchange;

        let store = Store::connect_test().await.unwrap();
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string(), "C".to_string()])
            .await
            .unwrap();

        let exchange = FakeExchange::new()
            .with_price("AUSDT", dec!(12))
            .with_price("BUSDT", dec!(20));
        let bridge = Bridge("USDT".to_string());

        let mut session = store.begin().await.unwrap();
        post_jump_reset(&mut session, &exchange, &bridge, "A", "C", dec!(5)).await.unwrap();

        let inverse = session.get_pair("C", "A").await.unwrap().unwrap();
        assert_eq!(inverse.ratio, Some(dec!(5) / dec!(12)));

        let from_a = session.get_pair("A", "C").await.unwrap().unwrap();
        assert_eq!(from_a.ratio, Some(dec!(12) / dec!(5)));

        let from_b = session.get_pair("B", "C").await.unwrap().unwrap();
        assert_eq!(from_b.ratio, Some(dec!(20) / dec!(5)));

        session.commit().await.unwrap();
    }
}
