//! Exchange sources feeding the aggregator.
//!
//! This module handles:
//! - The `ExchangeSource` capability every venue implements
//! - A shared HTTP transport for REST polling
//! - Coinbase, Gemini and Kraken depth endpoints
//! - A scripted mock source for tests

pub mod coinbase;
pub mod gemini;
pub mod kraken;
pub mod mock;
pub mod transport;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ParseError, SourceError, TransportError};
use crate::orderbook::{BookSide, PriceLevel};

pub use coinbase::CoinbaseSource;
pub use gemini::GeminiSource;
pub use kraken::KrakenSource;
pub use mock::{MockControl, MockExchange};
pub use transport::HttpTransport;

/// One venue's latest bid/ask snapshot.
#[async_trait]
pub trait ExchangeSource: Send + Sync {
    /// Stable identifier used in diagnostics and entry provenance.
    fn name(&self) -> &str;

    /// Pull the venue's current book, replacing the stored snapshot.
    ///
    /// A failed fetch leaves the previous snapshot untouched.
    async fn fetch(&mut self) -> Result<(), SourceError>;

    /// Bids from the last successful fetch.
    fn bids(&self) -> &BookSide;

    /// Asks from the last successful fetch.
    fn asks(&self) -> &BookSide;
}

/// Parsed snapshot held by a venue between fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueBook {
    /// Bid side.
    pub bids: BookSide,
    /// Ask side.
    pub asks: BookSide,
}

/// The three REST venues, configured from `config`, sharing one HTTP client.
pub fn venue_sources(config: &Config) -> Result<Vec<Box<dyn ExchangeSource>>, TransportError> {
    let transport = HttpTransport::new(config.http_timeout())?;

    Ok(vec![
        Box::new(CoinbaseSource::new(transport.clone(), config.coinbase_url.as_str())),
        Box::new(GeminiSource::new(transport.clone(), config.gemini_url.as_str())),
        Box::new(KrakenSource::new(
            transport,
            config.kraken_url.as_str(),
            config.kraken_pair.as_str(),
        )),
    ])
}

/// Build one side from raw payload entries, skipping entries that fail.
pub(crate) fn parse_side<F>(entries: &[Value], source: &str, extract: F) -> BookSide
where
    F: Fn(&Value) -> Result<(String, String), ParseError>,
{
    let mut side = BookSide::new();

    for entry in entries {
        let parsed = extract(entry).and_then(|(price, quantity)| {
            PriceLevel::parse(&price, &quantity, source)
        });

        match parsed {
            Ok(level) => side.insert(level),
            Err(ParseError::NonPositiveQuantity(quantity)) => {
                debug!(source, quantity = %quantity, "Skipping empty level");
            }
            Err(err) => {
                warn!(source, error = %err, "Failed to parse order");
            }
        }
    }

    side
}

/// Price and quantity from an `[price, quantity, ...]` array entry.
pub(crate) fn array_entry(entry: &Value) -> Result<(String, String), ParseError> {
    let price = entry.get(0).ok_or(ParseError::MissingField("price"))?;
    let quantity = entry.get(1).ok_or(ParseError::MissingField("quantity"))?;

    Ok((
        scalar_text(price, "price")?,
        scalar_text(quantity, "quantity")?,
    ))
}

/// Text form of a JSON string or number.
pub(crate) fn scalar_text(value: &Value, field: &'static str) -> Result<String, ParseError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ParseError::InvalidNumber {
            field,
            value: other.to_string(),
        }),
    }
}

/// Array under `key`, or a malformed-payload error.
pub(crate) fn side_array<'a>(doc: &'a Value, key: &str) -> Result<&'a [Value], SourceError> {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| SourceError::MalformedPayload(format!("missing {key} array")))
}
