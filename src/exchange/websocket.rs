use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::cache::BookCache;

const BINANCE_US_STREAM: &str = "wss://stream.binance.us:9443/stream";

/// Keeps a `BookCache` current by subscribing to combined bookTicker streams
/// for every configured market symbol, reconnecting on drop.
pub struct PriceStream {
    book: BookCache,
    closed: Arc<AtomicBool>,
}

impl PriceStream {
    pub fn new(book: BookCache) -> Self {
        Self {
            book,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the background connection task. `symbols` are market symbols
    /// such as "ETHUSDT".
    pub fn start(&self, symbols: Vec<String>) {
        if symbols.is_empty() {
            return;
        }

        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}@bookTicker", s.to_lowercase()))
            .collect();
        let url = format!("{}?streams={}", BINANCE_US_STREAM, streams.join("/"));

        let book = self.book.clone();
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            while !closed.load(Ordering::Acquire) {
                if let Err(e) = Self::run_connection(&url, &book, &closed).await {
                    warn!("price stream error: {e}, reconnecting");
                }
                if closed.load(Ordering::Acquire) {
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
            info!("price stream closed");
        });
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn run_connection(
        url: &str,
        book: &BookCache,
        closed: &Arc<AtomicBool>,
    ) -> anyhow::Result<()> {
        let (ws_stream, _) = connect_async(url).await?;
        let (_write, mut read) = ws_stream.split();

        info!("price stream connected");

        while let Some(msg) = read.next().await {
            if closed.load(Ordering::Acquire) {
                break;
            }
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(tick) = Self::parse(&text) {
                        book.set(&tick.symbol, tick.bid_price, tick.ask_price).await;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("price stream closed by server");
                    break;
                }
                Err(e) => {
                    error!("price stream error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn parse(text: &str) -> Option<BookTick> {
        let combined: CombinedStreamMessage = serde_json::from_str(text).ok()?;
        let msg: WsBookTickerMessage = serde_json::from_value(combined.data).ok()?;
        debug!("book ticker: {} {}/{}", msg.symbol, msg.bid_price, msg.ask_price);
        Some(BookTick {
            symbol: msg.symbol,
            bid_price: Decimal::from_str(&msg.bid_price).ok()?,
            ask_price: Decimal::from_str(&msg.ask_price).ok()?,
        })
    }
}

struct BookTick {
    symbol: String,
    bid_price: Decimal,
    ask_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct CombinedStreamMessage {
    #[allow(dead_code)]
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WsBookTickerMessage {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid_price: String,
    #[serde(rename = "a")]
    ask_price: String,
}
