pub mod session;

pub use session::{PairFilter, StoreSession};

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::types::{Coin, CoinValue, CurrentCoin, Pair, ScoutEntry, Trade, TradeState};

/// SQLite-backed persistence for every entity in the data model: coins,
/// directed pairs, the current-coin pointer, trades, scout log, value
/// history. Everything is stored as `TEXT` for Decimal/DateTime columns and
/// parsed back through `Decimal::from_str` / `DateTime::parse_from_rfc3339`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("parsing database url")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to sqlite store")?;

        Ok(Self { pool })
    }

    pub async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coins (
                symbol TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 1
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pairs (
                from_coin TEXT NOT NULL,
                to_coin TEXT NOT NULL,
                ratio TEXT,
                PRIMARY KEY (from_coin, to_coin)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS current_coin (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                symbol TEXT NOT NULL,
                since TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                alt_coin TEXT NOT NULL,
                crypto_coin TEXT NOT NULL,
                selling INTEGER NOT NULL,
                alt_amount TEXT NOT NULL,
                crypto_amount TEXT NOT NULL,
                state TEXT NOT NULL,
                datetime TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scout_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_coin TEXT NOT NULL,
                to_coin TEXT NOT NULL,
                remembered_ratio TEXT NOT NULL,
                current_coin_price TEXT NOT NULL,
                other_coin_price TEXT NOT NULL,
                datetime TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS coin_value_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                coin TEXT NOT NULL,
                balance TEXT NOT NULL,
                usd_price TEXT NOT NULL,
                btc_price TEXT NOT NULL,
                datetime TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        info!("store schema ready");
        Ok(())
    }

    /// Idempotent upsert of the supported coin list: inserts any new coin
    /// rows, then generates every missing directed pair among enabled coins.
    /// Existing pair ratios are left untouched.
    pub async fn set_supported_coin_list(&self, symbols: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for symbol in symbols {
            sqlx::query(
                "INSERT INTO coins (symbol, enabled) VALUES (?, 1)
                 ON CONFLICT(symbol) DO NOTHING",
            )
            .bind(symbol)
            .execute(&mut *tx)
            .await?;
        }

        for from in symbols {
            for to in symbols {
                if from == to {
                    continue;
                }
                sqlx::query(
                    "INSERT INTO pairs (from_coin, to_coin, ratio) VALUES (?, ?, NULL)
                     ON CONFLICT(from_coin, to_coin) DO NOTHING",
                )
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_coins(&self) -> Result<Vec<Coin>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT symbol, enabled FROM coins")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(symbol, enabled)| Coin {
                symbol,
                enabled: enabled != 0,
            })
            .collect())
    }

    pub async fn get_current_coin(&self) -> Result<Option<CurrentCoin>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT symbol, since FROM current_coin WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((symbol, since)) => Ok(Some(CurrentCoin {
                symbol,
                since: DateTime::parse_from_rfc3339(&since)?.with_timezone(&Utc),
            })),
            None => Ok(None),
        }
    }

    pub async fn set_current_coin(&self, symbol: &str, since: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO current_coin (id, symbol, since) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET symbol = excluded.symbol, since = excluded.since",
        )
        .bind(symbol)
        .bind(since.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_coin_value(&self, value: &CoinValue) -> Result<()> {
        sqlx::query(
            "INSERT INTO coin_value_history (coin, balance, usd_price, btc_price, datetime)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&value.coin)
        .bind(value.balance.to_string())
        .bind(value.usd_price.to_string())
        .bind(value.btc_price.to_string())
        .bind(value.datetime.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn prune_scout_history(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scout_history WHERE datetime < ?")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn prune_coin_value_history(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM coin_value_history WHERE datetime < ?")
            .bind(older_than.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let rows: Vec<(String, String, String, i64, String, String, String, String)> =
            sqlx::query_as(
                "SELECT id, alt_coin, crypto_coin, selling, alt_amount, crypto_amount, state, datetime
                 FROM trades ORDER BY datetime DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_trade).collect()
    }

    pub async fn recent_scout_entries(&self, limit: i64) -> Result<Vec<ScoutEntry>> {
        let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
            "SELECT from_coin, to_coin, remembered_ratio, current_coin_price, other_coin_price, datetime
             FROM scout_history ORDER BY datetime DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(from_coin, to_coin, remembered_ratio, current_coin_price, other_coin_price, datetime)| {
                Ok(ScoutEntry {
                    from_coin,
                    to_coin,
                    remembered_ratio: Decimal::from_str(&remembered_ratio)?,
                    current_coin_price: Decimal::from_str(&current_coin_price)?,
                    other_coin_price: Decimal::from_str(&other_coin_price)?,
                    datetime: DateTime::parse_from_rfc3339(&datetime)?.with_timezone(&Utc),
                })
            })
            .collect()
    }

    /// An in-memory store for unit tests: a single pooled connection so the
    /// `:memory:` database survives across calls (a second connection would
    /// see an empty database of its own).
    #[cfg(test)]
    pub async fn connect_test() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// Opens one transactional session. Every scout/transition cycle performs
    /// its reads and writes through a single session so observers never see
    /// a partially re-anchored ratio book (spec's one-transaction-per-cycle
    /// ordering guarantee).
    pub async fn begin(&self) -> Result<StoreSession<'_>> {
        let tx = self.pool.begin().await?;
        Ok(StoreSession::new(tx))
    }
}

pub(crate) fn row_to_trade(
    row: (String, String, String, i64, String, String, String, String),
) -> Result<Trade> {
    let (id, alt_coin, crypto_coin, selling, alt_amount, crypto_amount, state, datetime) = row;
    Ok(Trade {
        id,
        alt_coin,
        crypto_coin,
        selling: selling != 0,
        alt_amount: Decimal::from_str(&alt_amount)?,
        crypto_amount: Decimal::from_str(&crypto_amount)?,
        state: match state.as_str() {
            "STARTING" => TradeState::Starting,
            "ORDERED" => TradeState::Ordered,
            _ => TradeState::Complete,
        },
        datetime: DateTime::parse_from_rfc3339(&datetime)?.with_timezone(&Utc),
    })
}

pub(crate) fn row_to_pair(row: (String, String, Option<String>)) -> Result<Pair> {
    let (from_coin, to_coin, ratio) = row;
    Ok(Pair {
        from_coin,
        to_coin,
        ratio: ratio.map(|r| Decimal::from_str(&r)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Invariant 3: exactly one directed pair row per ordered (from, to),
    // from != to, for every ordered pair of supported coins.
    #[tokio::test]
    async fn supported_coin_list_generates_complete_directed_graph() {
        let store = Store::connect_test().await.unwrap();
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string(), "C".to_string()])
            .await
            .unwrap();

        let mut session = store.begin().await.unwrap();
        let pairs = session.list_pairs(PairFilter::default()).await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(pairs.len(), 6, "3 coins should yield 3*2 directed pairs");
        assert!(pairs.iter().all(|p| p.from_coin != p.to_coin));
        assert!(pairs.iter().all(|p| p.ratio.is_none()));

        let mut seen = std::collections::HashSet::new();
        for p in &pairs {
            assert!(seen.insert((p.from_coin.clone(), p.to_coin.clone())), "duplicate pair row");
        }
    }

    // Re-upserting the same coin list is idempotent: no duplicate pairs,
    // and an already-set ratio survives.
    #[tokio::test]
    async fn set_supported_coin_list_is_idempotent_and_preserves_ratios() {
        let store = Store::connect_test().await.unwrap();
        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        let mut session = store.begin().await.unwrap();
        session.set_pair_ratio("A", "B", Decimal::new(5, 1)).await.unwrap();
        session.commit().await.unwrap();

        store
            .set_supported_coin_list(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();

        let mut session = store.begin().await.unwrap();
        let pairs = session.list_pairs(PairFilter::default()).await.unwrap();
        assert_eq!(pairs.len(), 2);
        let ab = session.get_pair("A", "B").await.unwrap().unwrap();
        assert_eq!(ab.ratio, Some(Decimal::new(5, 1)));
        session.commit().await.unwrap();
    }

    // Invariant 4: CurrentCoin is a singleton — re-setting overwrites
    // rather than inserting a second row.
    #[tokio::test]
    async fn current_coin_is_a_singleton() {
        let store = Store::connect_test().await.unwrap();
        let t1 = Utc::now();
        store.set_current_coin("A", t1).await.unwrap();
        let t2 = t1 + chrono::Duration::hours(1);
        store.set_current_coin("B", t2).await.unwrap();

        let current = store.get_current_coin().await.unwrap().unwrap();
        assert_eq!(current.symbol, "B");

        let row_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM current_coin")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row_count.0, 1);
    }

    #[tokio::test]
    async fn prune_scout_history_removes_only_entries_older_than_cutoff() {
        let store = Store::connect_test().await.unwrap();
        let now = Utc::now();
        let old_entry = ScoutEntry {
            from_coin: "A".to_string(),
            to_coin: "B".to_string(),
            remembered_ratio: Decimal::ONE,
            current_coin_price: Decimal::ONE,
            other_coin_price: Decimal::ONE,
            datetime: now - chrono::Duration::days(2),
        };
        let fresh_entry = ScoutEntry {
            datetime: now,
            ..old_entry.clone()
        };

        let mut session = store.begin().await.unwrap();
        session.insert_scout_entry(&old_entry).await.unwrap();
        session.insert_scout_entry(&fresh_entry).await.unwrap();
        session.commit().await.unwrap();

        let removed = store.prune_scout_history(now - chrono::Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.recent_scout_entries(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].datetime, fresh_entry.datetime);
    }
}
