use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::exchange::Exchange;
use crate::notifications::{AlertType, NotificationManager};
use crate::store::Store;
use crate::types::{Bridge, CoinValue, TradeState};

/// Renders the last-10-trades progress table (spec §4.4 "logging
/// progress"). Grounded almost verbatim on `original_source/stats.py`'s
/// `_get_progress_table`: for each completed buy, shows the change in alt
/// amount held against the previous completed buy of the same coin.
pub async fn progress_table(store: &Store) -> anyhow::Result<String> {
    let trades = store.recent_trades(200).await?;

    let mut buys: Vec<_> = trades
        .into_iter()
        .filter(|t| !t.selling && t.state == TradeState::Complete)
        .collect();
    buys.sort_by(|a, b| a.datetime.cmp(&b.datetime));

    let mut prior_amount: HashMap<String, Decimal> = HashMap::new();
    let mut with_change = Vec::with_capacity(buys.len());
    for trade in &buys {
        let change = prior_amount.get(&trade.alt_coin).map(|prior| trade.alt_amount - prior);
        with_change.push((trade.clone(), change));
        prior_amount.insert(trade.alt_coin.clone(), trade.alt_amount);
    }

    with_change.sort_by(|a, b| b.0.datetime.cmp(&a.0.datetime));
    with_change.truncate(10);

    if with_change.is_empty() {
        return Ok("No trades.".to_string());
    }

    let rows: Vec<String> = with_change
        .iter()
        .map(|(trade, change)| {
            let change_str = match change {
                Some(c) => format!("{c:>10.2}"),
                None => format!("{:>10}", "-- NEW! --"),
            };
            format!(
                "{:<6} | {:>10.2} | {:>10.2} | {} | {:>16}",
                trade.alt_coin,
                trade.alt_amount,
                trade.crypto_amount,
                change_str,
                trade.datetime.format("%Y-%m-%d %H:%M"),
            )
        })
        .collect();

    let header = format!(
        "{:<6} | {:>10} | {:>10} | {:>10} | {:<16}",
        "Coin", "Amount", "USD", "Change", "Date/Time"
    );
    let separator = "-".repeat(rows[0].len());

    let mut out = vec![header, separator];
    out.extend(rows);
    Ok(out.join("\n"))
}

/// Renders the progress table and fans it out through the notification
/// sink (spec §4.4 "logging progress": "render last-10-trades table, emit
/// via notification").
pub async fn log_progress(store: &Store, notifications: &NotificationManager) -> anyhow::Result<()> {
    let table = progress_table(store).await?;
    info!("progress report for up to the last 10 trades:\n{table}");
    notifications.notify(AlertType::ProgressReport { table }).await;
    Ok(())
}

/// Records one value-history snapshot per enabled coin with a non-zero
/// balance (spec §4.4 "updating value history"). Grounded on
/// `original_source/auto_trader.py::update_values`: for each held coin,
/// look up its balance, its bridge-quoted USD price, and its BTC price,
/// and persist the triple. A coin missing a BTC market (already itself
/// BTC, or simply unlisted) gets a zero `btc_price` rather than skipping
/// the snapshot entirely.
pub async fn snapshot_coin_values(
    store: &Store,
    exchange: &dyn Exchange,
    bridge: &Bridge,
    coins: &[String],
) -> anyhow::Result<()> {
    let now = exchange.now().await;

    for coin in coins {
        let balance = exchange.get_currency_balance(coin, false).await?;
        if balance.is_zero() {
            continue;
        }

        let usd_price = match exchange.get_ticker_price(&bridge.market_symbol(coin)).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!("value snapshot: no {coin}/{} market, skipping", bridge.symbol());
                continue;
            }
            Err(e) => {
                warn!("value snapshot: price lookup failed for {coin}: {e}");
                continue;
            }
        };

        let btc_price = if coin == "BTC" {
            Decimal::ONE
        } else {
            exchange
                .get_ticker_price(&format!("{coin}BTC"))
                .await
                .ok()
                .flatten()
                .unwrap_or(Decimal::ZERO)
        };

        store
            .insert_coin_value(&CoinValue {
                coin: coin.clone(),
                balance,
                usd_price,
                btc_price,
                datetime: now,
            })
            .await?;
    }

    Ok(())
}
