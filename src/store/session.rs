use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use crate::types::{CurrentCoin, Pair, ScoutEntry, Trade};

use super::{row_to_pair, row_to_trade};

/// One scout/transition cycle's worth of reads and writes, all inside a
/// single sqlite transaction. Dropping without calling `commit` rolls the
/// whole cycle back, which is what happens when an exchange call errors
/// partway through a cycle (spec §5: a cycle never leaves a partial
/// re-anchor visible).
pub struct StoreSession<'a> {
    tx: Transaction<'a, Sqlite>,
}

/// Optional filters for `StoreSession::list_pairs`.
#[derive(Debug, Default, Clone)]
pub struct PairFilter<'a> {
    pub from_coin: Option<&'a str>,
    pub ratio_is_null: Option<bool>,
    pub enabled_endpoints_only: bool,
}

impl<'a> StoreSession<'a> {
    pub(crate) fn new(tx: Transaction<'a, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn list_pairs(&mut self, filter: PairFilter<'_>) -> Result<Vec<Pair>> {
        let rows: Vec<(String, String, Option<String>)> = if filter.enabled_endpoints_only {
            sqlx::query_as(
                "SELECT p.from_coin, p.to_coin, p.ratio FROM pairs p
                 JOIN coins cf ON cf.symbol = p.from_coin
                 JOIN coins ct ON ct.symbol = p.to_coin
                 WHERE cf.enabled = 1 AND ct.enabled = 1",
            )
            .fetch_all(&mut *self.tx)
            .await?
        } else {
            sqlx::query_as("SELECT from_coin, to_coin, ratio FROM pairs")
                .fetch_all(&mut *self.tx)
                .await?
        };

        let pairs: Result<Vec<Pair>> = rows.into_iter().map(row_to_pair).collect();
        let mut pairs = pairs?;

        if let Some(from) = filter.from_coin {
            pairs.retain(|p| p.from_coin == from);
        }
        if let Some(want_null) = filter.ratio_is_null {
            pairs.retain(|p| p.ratio.is_none() == want_null);
        }

        Ok(pairs)
    }

    pub async fn get_pair(&mut self, from: &str, to: &str) -> Result<Option<Pair>> {
        let row: Option<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT from_coin, to_coin, ratio FROM pairs WHERE from_coin = ? AND to_coin = ?",
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_pair).transpose()
    }

    pub async fn set_pair_ratio(
        &mut self,
        from: &str,
        to: &str,
        ratio: rust_decimal::Decimal,
    ) -> Result<()> {
        sqlx::query("UPDATE pairs SET ratio = ? WHERE from_coin = ? AND to_coin = ?")
            .bind(ratio.to_string())
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn list_enabled_coins(&mut self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT symbol FROM coins WHERE enabled = 1")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(|(symbol,)| symbol).collect())
    }

    pub async fn get_current_coin(&mut self) -> Result<Option<CurrentCoin>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT symbol, since FROM current_coin WHERE id = 1")
                .fetch_optional(&mut *self.tx)
                .await?;

        match row {
            Some((symbol, since)) => Ok(Some(CurrentCoin {
                symbol,
                since: DateTime::parse_from_rfc3339(&since)?.with_timezone(&Utc),
            })),
            None => Ok(None),
        }
    }

    pub async fn set_current_coin(&mut self, symbol: &str, since: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO current_coin (id, symbol, since) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET symbol = excluded.symbol, since = excluded.since",
        )
        .bind(symbol)
        .bind(since.to_rfc3339())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn insert_scout_entry(&mut self, entry: &ScoutEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO scout_history
                (from_coin, to_coin, remembered_ratio, current_coin_price, other_coin_price, datetime)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.from_coin)
        .bind(&entry.to_coin)
        .bind(entry.remembered_ratio.to_string())
        .bind(entry.current_coin_price.to_string())
        .bind(entry.other_coin_price.to_string())
        .bind(entry.datetime.to_rfc3339())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn insert_trade(&mut self, trade: &Trade) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades
                (id, alt_coin, crypto_coin, selling, alt_amount, crypto_amount, state, datetime)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state",
        )
        .bind(&trade.id)
        .bind(&trade.alt_coin)
        .bind(&trade.crypto_coin)
        .bind(trade.selling as i64)
        .bind(trade.alt_amount.to_string())
        .bind(trade.crypto_amount.to_string())
        .bind(trade.state.to_string())
        .bind(trade.datetime.to_rfc3339())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Commits every read/write performed through this session.
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
