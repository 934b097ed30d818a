//! Coinbase Exchange level-2 book.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::{array_entry, parse_side, side_array, ExchangeSource, HttpTransport, VenueBook};
use crate::error::SourceError;
use crate::orderbook::BookSide;

/// Default level-2 endpoint.
pub const DEFAULT_URL: &str = "https://api.exchange.coinbase.com/products/BTC-USDT/book?level=2";

const NAME: &str = "Coinbase Pro";

/// Coinbase depth source. Levels arrive as `[price, size, num_orders]`.
#[derive(Debug, Clone)]
pub struct CoinbaseSource {
    transport: HttpTransport,
    url: String,
    book: VenueBook,
}

impl CoinbaseSource {
    /// Create a source polling `url`.
    pub fn new(transport: HttpTransport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            book: VenueBook::default(),
        }
    }

    async fn load(&self) -> Result<VenueBook, SourceError> {
        let body = self.transport.get(&self.url).await?;
        parse_book(&body)
    }
}

/// Parse a Coinbase book document.
pub fn parse_book(body: &str) -> Result<VenueBook, SourceError> {
    let doc: Value = serde_json::from_str(body)?;

    debug!("Parsing Coinbase Pro order book");
    Ok(VenueBook {
        bids: parse_side(side_array(&doc, "bids")?, NAME, array_entry),
        asks: parse_side(side_array(&doc, "asks")?, NAME, array_entry),
    })
}

#[async_trait]
impl ExchangeSource for CoinbaseSource {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(source = NAME))]
    async fn fetch(&mut self) -> Result<(), SourceError> {
        match self.load().await {
            Ok(book) => {
                info!(
                    bids = book.bids.len(),
                    asks = book.asks.len(),
                    "Parsed Coinbase Pro order book"
                );
                self.book = book;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Error fetching Coinbase Pro order book");
                Err(err)
            }
        }
    }

    fn bids(&self) -> &BookSide {
        &self.book.bids
    }

    fn asks(&self) -> &BookSide {
        &self.book.asks
    }
}
