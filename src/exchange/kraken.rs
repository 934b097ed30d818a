//! Kraken public depth endpoint.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::{array_entry, parse_side, side_array, ExchangeSource, HttpTransport, VenueBook};
use crate::error::SourceError;
use crate::orderbook::BookSide;

/// Default depth endpoint.
pub const DEFAULT_URL: &str = "https://api.kraken.com/0/public/Depth?pair=XBTUSD&count=1000";

/// Result key Kraken uses for XBTUSD.
pub const DEFAULT_PAIR: &str = "XXBTZUSD";

const NAME: &str = "Kraken";

/// Kraken depth source. Levels arrive as `[price, volume, timestamp]` under
/// `result.<pair>`; a non-empty `error` array fails the fetch.
#[derive(Debug, Clone)]
pub struct KrakenSource {
    transport: HttpTransport,
    url: String,
    pair: String,
    book: VenueBook,
}

impl KrakenSource {
    /// Create a source polling `url` and reading the `pair` result key.
    pub fn new(transport: HttpTransport, url: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            pair: pair.into(),
            book: VenueBook::default(),
        }
    }

    async fn load(&self) -> Result<VenueBook, SourceError> {
        let body = self.transport.get(&self.url).await?;
        parse_book(&body, &self.pair)
    }
}

/// Parse a Kraken depth document for `pair`.
pub fn parse_book(body: &str, pair: &str) -> Result<VenueBook, SourceError> {
    let doc: Value = serde_json::from_str(body)?;

    if let Some(first) = doc
        .get("error")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        let message = first
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| first.to_string());
        return Err(SourceError::Api(message));
    }

    let result = doc
        .get("result")
        .and_then(|r| r.get(pair))
        .ok_or_else(|| SourceError::MalformedPayload(format!("missing result.{pair}")))?;

    debug!("Parsing Kraken order book");
    Ok(VenueBook {
        bids: parse_side(side_array(result, "bids")?, NAME, array_entry),
        asks: parse_side(side_array(result, "asks")?, NAME, array_entry),
    })
}

#[async_trait]
impl ExchangeSource for KrakenSource {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(source = NAME, pair = %self.pair))]
    async fn fetch(&mut self) -> Result<(), SourceError> {
        match self.load().await {
            Ok(book) => {
                info!(
                    bids = book.bids.len(),
                    asks = book.asks.len(),
                    "Parsed Kraken order book"
                );
                self.book = book;
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Error fetching Kraken order book");
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
