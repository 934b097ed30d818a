//! Gemini public order book.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::{parse_side, scalar_text, side_array, ExchangeSource, HttpTransport, VenueBook};
use crate::error::{ParseError, SourceError};
use crate::orderbook::BookSide;

/// Default book endpoint.
pub const DEFAULT_URL: &str = "https://api.gemini.com/v1/book/btcusd?limit_bids=1000&limit_asks=1000";

const NAME: &str = "Gemini";

/// Gemini depth source. Levels arrive as `{price, amount, timestamp}`;
/// zero amounts are dropped.
#[derive(Debug, Clone)]
pub struct GeminiSource {
    transport: HttpTransport,
    url: String,
    book: VenueBook,
}

impl GeminiSource {
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

fn object_entry(entry: &Value) -> Result<(String, String), ParseError> {
    let price = entry.get("price").ok_or(ParseError::MissingField("price"))?;
    let amount = entry.get("amount").ok_or(ParseError::MissingField("amount"))?;

    Ok((scalar_text(price, "price")?, scalar_text(amount, "amount")?))
}

/// Parse a Gemini book document.
pub fn parse_book(body: &str) -> Result<VenueBook, SourceError> {
    let doc: Value = serde_json::from_str(body)?;

    debug!("Parsing Gemini order book");
    Ok(VenueBook {
        bids: parse_side(side_array(&doc, "bids")?, NAME, object_entry),
        asks: parse_side(side_array(&doc, "asks")?, NAME, object_entry),
    })
}

#[async_trait]
impl ExchangeSource for GeminiSource {
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
                    "Parsed Gemini order book"
                );
                self.book = book;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Error fetching Gemini order book");
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
