use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::types::{Trade, TradeState};

use super::cache::{BalanceCache, BookCache};
use super::websocket::PriceStream;
use super::{Exchange, ExchangeError, Kline};

const BINANCE_US_API: &str = "https://api.binance.us";
const BINANCE_US_TESTNET: &str = "https://testnet.binance.vision";

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceClient {
    client: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    balances: BalanceCache,
    book: BookCache,
    stream: PriceStream,
}

impl BinanceClient {
    pub fn new(api_key: String, secret_key: String, use_testnet: bool) -> Self {
        let base_url = if use_testnet {
            BINANCE_US_TESTNET.to_string()
        } else {
            BINANCE_US_API.to_string()
        };

        let book = BookCache::new();
        let stream = PriceStream::new(book.clone());

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            api_key,
            secret_key,
            base_url,
            balances: BalanceCache::new(),
            book,
            stream,
        }
    }

    /// Connects the book-ticker stream for every market this instance will
    /// be asked about.
    pub fn start_stream(&self, bridge: &str, coins: &[String]) {
        let symbols: Vec<String> = coins.iter().map(|c| format!("{c}{bridge}")).collect();
        self.stream.start(symbols);
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_signed_query(&self, params: &HashMap<&str, String>) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut query_parts: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        query_parts.push(format!("timestamp={timestamp}"));
        query_parts.push("recvWindow=5000".to_string());
        let query = query_parts.join("&");
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn account(&self) -> Result<AccountResponse> {
        let url = format!("{}/api/v3/account", self.base_url);
        let query = self.build_signed_query(&HashMap::new());
        let full_url = format!("{url}?{query}");

        let resp = self
            .client
            .get(&full_url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(ExchangeError::Api(format!("account request failed: {error_text}")).into());
        }

        Ok(resp.json().await?)
    }

    async fn wait_for_fill(&self, symbol: &str, order_id: u64) -> Result<OrderResponse> {
        for _ in 0..30 {
            let url = format!("{}/api/v3/order", self.base_url);
            let mut params = HashMap::new();
            params.insert("symbol", symbol.to_string());
            params.insert("orderId", order_id.to_string());
            let query = self.build_signed_query(&params);
            let full_url = format!("{url}?{query}");

            let resp = self
                .client
                .get(&full_url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await?;

            if resp.status().is_success() {
                let order: OrderResponse = resp.json().await?;
                match order.status.as_str() {
                    "FILLED" => return Ok(order),
                    "CANCELED" | "REJECTED" | "EXPIRED" => {
                        return Err(
                            ExchangeError::Api(format!("order {order_id} ended in {}", order.status)).into(),
                        )
                    }
                    _ => {}
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Err(ExchangeError::Api(format!("order {order_id} did not fill in time")).into())
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: Option<Decimal>,
        quote_quantity: Option<Decimal>,
    ) -> Result<OrderResponse> {
        let url = format!("{}/api/v3/order", self.base_url);

        let mut params: HashMap<&str, String> = HashMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("side", side.to_string());
        params.insert("type", "MARKET".to_string());
        if let Some(qty) = quantity {
            params.insert("quantity", qty.to_string());
        }
        if let Some(quote_qty) = quote_quantity {
            params.insert("quoteOrderQty", quote_qty.to_string());
        }

        let query = self.build_signed_query(&params);
        let full_url = format!("{url}?{query}");

        debug!("placing {side} market order for {symbol}");

        let resp = self
            .client
            .post(&full_url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(ExchangeError::Api(format!("order placement failed: {error_text}")).into());
        }

        let order: OrderResponse = resp.json().await?;
        if order.status == "FILLED" {
            Ok(order)
        } else {
            self.wait_for_fill(symbol, order.order_id).await
        }
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_ticker_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let parsed: TickerPriceResponse = resp.json().await?;
        Ok(Decimal::from_str(&parsed.price).ok())
    }

    async fn get_sell_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        if let Some(bid) = self.book.best_bid(symbol).await {
            return Ok(Some(bid));
        }
        self.get_ticker_price(symbol).await
    }

    async fn get_buy_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        if let Some(ask) = self.book.best_ask(symbol).await {
            return Ok(Some(ask));
        }
        self.get_ticker_price(symbol).await
    }

    async fn get_currency_balance(&self, coin: &str, force_refresh: bool) -> Result<Decimal> {
        if !force_refresh {
            if let Some(balance) = self.balances.get(coin).await {
                return Ok(balance);
            }
        }

        let account = self.account().await?;
        let mut found = Decimal::ZERO;
        for balance in &account.balances {
            let free = Decimal::from_str(&balance.free).unwrap_or(Decimal::ZERO);
            self.balances.set(&balance.asset, free).await;
            if balance.asset == coin {
                found = free;
            }
        }
        Ok(found)
    }

    async fn get_min_notional(&self, alt: &str, bridge: &str) -> Result<Decimal> {
        let symbol = format!("{alt}{bridge}");
        let url = format!("{}/api/v3/exchangeInfo?symbol={symbol}", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(Decimal::new(10, 0));
        }

        let info: ExchangeInfoResponse = resp.json().await?;
        let min_notional = info
            .symbols
            .first()
            .and_then(|s| s.filters.iter().find(|f| f.filter_type == "MIN_NOTIONAL" || f.filter_type == "NOTIONAL"))
            .and_then(|f| f.min_notional.as_deref())
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or(Decimal::new(10, 0));

        Ok(min_notional)
    }

    async fn get_fee(&self, _coin: &str, _bridge: &str, selling: bool) -> Result<Decimal> {
        let account = self.account().await?;
        let bps = if selling {
            account.maker_commission
        } else {
            account.taker_commission
        };
        Ok(Decimal::from(bps) / Decimal::from(10_000))
    }

    async fn sell_alt(&self, from: &str, bridge: &str) -> Result<Option<Trade>> {
        let symbol = format!("{from}{bridge}");
        let quantity = self.get_currency_balance(from, true).await?;
        if quantity.is_zero() {
            return Ok(None);
        }

        match self.market_order(&symbol, "SELL", Some(quantity), None).await {
            Ok(order) => {
                self.balances.set(from, Decimal::ZERO).await;
                Ok(Some(Trade {
                    id: order.order_id.to_string(),
                    alt_coin: from.to_string(),
                    crypto_coin: bridge.to_string(),
                    selling: true,
                    alt_amount: Decimal::from_str(&order.executed_qty)?,
                    crypto_amount: order
                        .cummulative_quote_qty
                        .as_deref()
                        .and_then(|s| Decimal::from_str(s).ok())
                        .unwrap_or(Decimal::ZERO),
                    state: TradeState::Complete,
                    datetime: Utc::now(),
                }))
            }
            Err(e) => {
                warn!("sell_alt {from}->{bridge} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn buy_alt(
        &self,
        to: &str,
        bridge: &str,
        limit_price: Option<Decimal>,
    ) -> Result<Option<Trade>> {
        let symbol = format!("{to}{bridge}");
        let bridge_balance = self.get_currency_balance(bridge, true).await?;
        if bridge_balance.is_zero() {
            return Ok(None);
        }

        let order_result = if let Some(price) = limit_price {
            let quantity = bridge_balance / price;
            self.market_order(&symbol, "BUY", Some(quantity), None).await
        } else {
            self.market_order(&symbol, "BUY", None, Some(bridge_balance)).await
        };

        match order_result {
            Ok(order) => {
                self.balances.set(bridge, Decimal::ZERO).await;
                info!("bought {} {to} via {symbol}", order.executed_qty);
                Ok(Some(Trade {
                    id: order.order_id.to_string(),
                    alt_coin: to.to_string(),
                    crypto_coin: bridge.to_string(),
                    selling: false,
                    alt_amount: Decimal::from_str(&order.executed_qty)?,
                    crypto_amount: order
                        .cummulative_quote_qty
                        .as_deref()
                        .and_then(|s| Decimal::from_str(s).ok())
                        .unwrap_or(Decimal::ZERO),
                    state: TradeState::Complete,
                    datetime: Utc::now(),
                }))
            }
            Err(e) => {
                warn!("buy_alt {bridge}->{to} failed: {e}");
                Ok(None)
            }
        }
    }

    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}&startTime={}&endTime={}&limit={limit}",
            self.base_url,
            start.timestamp_millis(),
            end.timestamp_millis(),
        );

        let resp: Vec<Vec<serde_json::Value>> = self.client.get(&url).send().await?.json().await?;

        let klines: Result<Vec<Kline>> = resp
            .into_iter()
            .map(|k| {
                let open_time = k.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
                let open = k.get(1).and_then(|v| v.as_str()).unwrap_or("0");
                let high = k.get(2).and_then(|v| v.as_str()).unwrap_or("0");
                let low = k.get(3).and_then(|v| v.as_str()).unwrap_or("0");
                let close = k.get(4).and_then(|v| v.as_str()).unwrap_or("0");
                let volume = k.get(5).and_then(|v| v.as_str()).unwrap_or("0");

                Ok(Kline {
                    open_time: Utc.timestamp_millis_opt(open_time).unwrap(),
                    open: Decimal::from_str(open)?,
                    high: Decimal::from_str(high)?,
                    low: Decimal::from_str(low)?,
                    close: Decimal::from_str(close)?,
                    volume: Decimal::from_str(volume)?,
                })
            })
            .collect();

        klines
    }

    async fn now(&self) -> DateTime<Utc> {
        let url = format!("{}/api/v3/time", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => match resp.json::<ServerTimeResponse>().await {
                Ok(parsed) => Utc
                    .timestamp_millis_opt(parsed.server_time)
                    .single()
                    .unwrap_or_else(Utc::now),
                Err(_) => Utc::now(),
            },
            Err(_) => Utc::now(),
        }
    }

    async fn get_account(&self) -> Result<()> {
        self.account().await?;
        Ok(())
    }

    async fn close(&self) {
        self.stream.close().await;
    }
}

#[derive(Debug, Deserialize)]
struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
    status: String,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    #[serde(rename = "cummulativeQuoteQty")]
    cummulative_quote_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(rename = "makerCommission")]
    maker_commission: i64,
    #[serde(rename = "takerCommission")]
    taker_commission: i64,
    balances: Vec<BalanceResponse>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
struct SymbolFilter {
    #[serde(rename = "filterType")]
    filter_type: String,
    #[serde(rename = "minNotional")]
    min_notional: Option<String>,
}
