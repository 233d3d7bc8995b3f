//! Venue documents for Binance USDⓈ-M futures.
//!
//! Only the fields the adapter consumes are modeled; everything else in the
//! venue payloads is ignored on deserialization. Numeric venue values arrive
//! as decimal strings and stay strings until a filter or conversion needs
//! them.
//!
use serde::{Deserialize, Serialize};

use crate::follow::error::{FollowError, Result};
use crate::follow::model::{ExchangeOrder, ExchangeOrderStatus, OrderSide};

/// Venue error body: `{"code": -2019, "msg": "Margin is insufficient."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

/// Exchange-info snapshot: server time plus the symbol table with its
/// trading filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfo {
    /// Venue server time, milliseconds since epoch. Cache freshness is
    /// measured against this, not against local file timestamps.
    pub server_time: i64,
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl SymbolInfo {
    pub fn price_filter(&self) -> Option<&PriceFilter> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::Price(pf) => Some(pf),
            _ => None,
        })
    }

    pub fn lot_size_filter(&self) -> Option<&LotSizeFilter> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize(lsf) => Some(lsf),
            _ => None,
        })
    }

    pub fn market_lot_size_filter(&self) -> Option<&LotSizeFilter> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::MarketLotSize(lsf) => Some(lsf),
            _ => None,
        })
    }

    pub fn min_notional_filter(&self) -> Option<&MinNotionalFilter> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::MinNotional(mnf) => Some(mnf),
            _ => None,
        })
    }
}

/// A venue trading filter, tagged by `filterType`. Filters the adapter does
/// not apply fall into `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER")]
    Price(PriceFilter),
    #[serde(rename = "LOT_SIZE")]
    LotSize(LotSizeFilter),
    #[serde(rename = "MARKET_LOT_SIZE")]
    MarketLotSize(LotSizeFilter),
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional(MinNotionalFilter),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFilter {
    pub min_price: String,
    pub max_price: String,
    pub tick_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotSizeFilter {
    #[serde(rename = "minQty")]
    pub min_quantity: String,
    #[serde(rename = "maxQty")]
    pub max_quantity: String,
    pub step_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinNotionalFilter {
    #[serde(default)]
    pub notional: String,
}

/// Venue order types the adapter submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueOrderType {
    Limit,
    Market,
    StopMarket,
    TakeProfitMarket,
}

impl VenueOrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            VenueOrderType::Limit => "LIMIT",
            VenueOrderType::Market => "MARKET",
            VenueOrderType::StopMarket => "STOP_MARKET",
            VenueOrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }

    /// Whether the evaluated price travels in the `stopPrice` field.
    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            VenueOrderType::StopMarket | VenueOrderType::TakeProfitMarket
        )
    }
}

/// A venue order document, as returned by the order endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueOrder {
    pub order_id: i64,
    pub symbol: String,
    pub status: ExchangeOrderStatus,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: OrderSide,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub stop_price: String,
    #[serde(rename = "origQty", default)]
    pub orig_quantity: String,
}

impl VenueOrder {
    /// Converts the venue document into the engine's opaque value record.
    pub fn into_exchange_order(self) -> Result<ExchangeOrder> {
        Ok(ExchangeOrder {
            id: self.order_id.to_string(),
            status: self.status,
            order_type: self.order_type,
            symbol: self.symbol,
            side: self.side,
            price: parse_decimal(&self.price)?,
            stop_price: parse_decimal(&self.stop_price)?,
            base_quantity: parse_decimal(&self.orig_quantity)?,
        })
    }
}

/// Parses a venue decimal string; empty strings are zero.
pub fn parse_decimal(s: &str) -> Result<f64> {
    if s.is_empty() {
        return Ok(0.0);
    }
    s.parse()
        .map_err(|_| FollowError::Parse(format!("invalid venue decimal: {s}")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_symbol_filters_deserialize_and_lookup() {
        let info: SymbolInfo = serde_json::from_str(
            r#"{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.10", "maxPrice": "100000", "tickSize": "0.10"},
                    {"filterType": "LOT_SIZE", "minQty": "0.001", "maxQty": "1000", "stepSize": "0.001"},
                    {"filterType": "MARKET_LOT_SIZE", "minQty": "0.001", "maxQty": "500", "stepSize": "0.001"},
                    {"filterType": "MIN_NOTIONAL", "notional": "5"},
                    {"filterType": "PERCENT_PRICE", "multiplierUp": "1.05", "multiplierDown": "0.95"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(info.price_filter().unwrap().tick_size, "0.10");
        assert_eq!(info.lot_size_filter().unwrap().max_quantity, "1000");
        assert_eq!(info.market_lot_size_filter().unwrap().max_quantity, "500");
        assert_eq!(info.min_notional_filter().unwrap().notional, "5");
    }

    #[test]
    fn test_venue_order_conversion() {
        let venue: VenueOrder = serde_json::from_str(
            r#"{
                "orderId": 283194212,
                "symbol": "BTCUSDT",
                "status": "NEW",
                "type": "LIMIT",
                "side": "BUY",
                "price": "20000.50",
                "stopPrice": "0",
                "origQty": "0.010"
            }"#,
        )
        .unwrap();

        let eo = venue.into_exchange_order().unwrap();
        assert_eq!(eo.id, "283194212");
        assert_eq!(eo.status, ExchangeOrderStatus::New);
        assert_eq!(eo.side, OrderSide::Buy);
        assert_eq!(eo.price, 20000.50);
        assert_eq!(eo.base_quantity, 0.010);
    }

    #[test]
    fn test_parse_decimal_empty_is_zero() {
        assert_eq!(parse_decimal("").unwrap(), 0.0);
        assert!(parse_decimal("not-a-number").is_err());
    }
}
