//! Order book types and data structures.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::Display;

use crate::error::ParseError;

/// Which side of a book to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// Buy interest, best price is the highest.
    Bid,
    /// Sell interest, best price is the lowest.
    Ask,
}

/// Direction of a hypothetical trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buying consumes asks.
    Buy,
    /// Selling consumes bids.
    Sell,
}

impl TradeSide {
    /// The book side this trade walks.
    pub fn book_side(self) -> Side {
        match self {
            TradeSide::Buy => Side::Ask,
            TradeSide::Sell => Side::Bid,
        }
    }
}

/// Single resting quantity at a price, tagged with the venue it came from.
///
/// Construction enforces `quantity > 0` and `price >= 0`; fields are
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceLevel {
    price: Decimal,
    quantity: Decimal,
    source: String,
}

impl PriceLevel {
    /// Create a validated price level.
    pub fn new(
        price: Decimal,
        quantity: Decimal,
        source: impl Into<String>,
    ) -> Result<Self, ParseError> {
        if quantity <= Decimal::ZERO {
            return Err(ParseError::NonPositiveQuantity(quantity));
        }
        if price.is_sign_negative() && !price.is_zero() {
            return Err(ParseError::NegativePrice(price));
        }

        Ok(Self {
            price,
            quantity,
            source: source.into(),
        })
    }

    /// Parse a level from the string fields venues send.
    pub fn parse(price: &str, quantity: &str, source: &str) -> Result<Self, ParseError> {
        let price: Decimal = price.trim().parse().map_err(|_| ParseError::InvalidNumber {
            field: "price",
            value: price.to_string(),
        })?;
        let quantity: Decimal =
            quantity
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidNumber {
                    field: "quantity",
                    value: quantity.to_string(),
                })?;

        Self::new(price, quantity, source)
    }

    /// Price at this level.
    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Quantity resting at this level.
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Venue that quoted this level.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// One side of a book: ascending by price, duplicates allowed.
///
/// Levels at an equal price keep insertion order, so entries from several
/// venues quoting the same price all survive a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSide {
    levels: BTreeMap<Decimal, Vec<PriceLevel>>,
    len: usize,
}

impl BookSide {
    /// Create an empty side.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a level without merging it into existing ones.
    pub fn insert(&mut self, level: PriceLevel) {
        self.levels.entry(level.price).or_default().push(level);
        self.len += 1;
    }

    /// Remove every level.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.len = 0;
    }

    /// Number of entries (not distinct prices).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the side has no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries cheapest first.
    pub fn ascending(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.values().flatten()
    }

    /// Entries most expensive first.
    pub fn descending(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.values().rev().flatten()
    }

    /// Lowest price on this side.
    pub fn lowest_price(&self) -> Option<Decimal> {
        self.levels.keys().next().copied()
    }

    /// Highest price on this side.
    pub fn highest_price(&self) -> Option<Decimal> {
        self.levels.keys().next_back().copied()
    }

    /// Total quantity across all entries, `None` on overflow.
    pub fn total_quantity(&self) -> Option<Decimal> {
        self.ascending()
            .try_fold(Decimal::ZERO, |total, level| total.checked_add(level.quantity()))
    }
}

impl FromIterator<PriceLevel> for BookSide {
    fn from_iter<I: IntoIterator<Item = PriceLevel>>(iter: I) -> Self {
        let mut side = BookSide::new();
        for level in iter {
            side.insert(level);
        }
        side
    }
}

impl Extend<PriceLevel> for BookSide {
    fn extend<I: IntoIterator<Item = PriceLevel>>(&mut self, iter: I) {
        for level in iter {
            self.insert(level);
        }
    }
}

/// Result of walking both sides of the book for one quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    /// Quantity priced.
    pub quantity: Decimal,
    /// Total paid to buy `quantity` from the asks.
    pub buy_cost: Decimal,
    /// Total received selling `quantity` into the bids.
    pub sell_proceeds: Decimal,
}

impl CostEstimate {
    /// Volume-weighted average buy price, `None` if it does not fit.
    pub fn buy_vwap(&self) -> Option<Decimal> {
        self.buy_cost.checked_div(self.quantity)
    }

    /// Volume-weighted average sell price, `None` if it does not fit.
    pub fn sell_vwap(&self) -> Option<Decimal> {
        self.sell_proceeds.checked_div(self.quantity)
    }
}
