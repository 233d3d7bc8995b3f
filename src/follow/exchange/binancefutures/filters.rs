//! Venue arithmetic filters, applied before every order submission.
//!
//! Prices snap to the symbol's tick size, quantities floor to the step size,
//! and the notional floor is enforced. A price that leaves its allowed band
//! becomes `0`, which the venue then rejects upstream; quantity violations
//! reject immediately.
//!
use crate::follow::error::{FollowError, Result};
use crate::follow::exchange::binancefutures::models::{
    parse_decimal, LotSizeFilter, MinNotionalFilter, PriceFilter, SymbolInfo, VenueOrderType,
};
use crate::follow::model::OrderSide;

/// The values an order submission is built from, adjusted in place by the
/// filters.
#[derive(Debug, Clone)]
pub struct OrderValues {
    pub symbol: SymbolInfo,
    pub side: OrderSide,
    pub order_type: VenueOrderType,
    /// Target price; for trigger orders this is the stop price.
    pub price: f64,
    pub base_quantity: f64,
    pub reduce_only: bool,
    pub close_position: bool,
}

/// Applies the filter set for the order type.
pub fn apply(values: &mut OrderValues) -> Result<()> {
    match values.order_type {
        VenueOrderType::Limit => {
            apply_price(values)?;
            let lsf = values.symbol.lot_size_filter().cloned();
            apply_lot_size(values, lsf)?;
            apply_min_notional(values)
        }
        VenueOrderType::StopMarket | VenueOrderType::TakeProfitMarket => {
            apply_price(values)?;
            let lsf = values.symbol.market_lot_size_filter().cloned();
            apply_lot_size(values, lsf)?;
            apply_min_notional(values)
        }
        // Market orders carry no price; the venue prices them at execution.
        VenueOrderType::Market => {
            let lsf = values.symbol.market_lot_size_filter().cloned();
            apply_lot_size(values, lsf)
        }
    }
}

fn apply_price(values: &mut OrderValues) -> Result<()> {
    if let Some(pf) = values.symbol.price_filter() {
        values.price = price_filter(pf, values.price)?;
    }
    Ok(())
}

fn apply_lot_size(values: &mut OrderValues, filter: Option<LotSizeFilter>) -> Result<()> {
    if let Some(lsf) = filter {
        values.base_quantity = lot_size_filter(&lsf, values.base_quantity)?;
    }
    Ok(())
}

fn apply_min_notional(values: &mut OrderValues) -> Result<()> {
    if let Some(mnf) = values.symbol.min_notional_filter() {
        min_notional_filter(mnf, values.price, values.base_quantity)?;
    }
    Ok(())
}

/// Snaps a price to the nearest multiple of the tick size, rounded to the
/// tick size's decimal places. A price outside `[minPrice, maxPrice]` becomes
/// `0` (zero bounds disable that side).
pub fn price_filter(pf: &PriceFilter, price: f64) -> Result<f64> {
    let tick_size = parse_decimal(&pf.tick_size)?;

    let mut new_price = price;
    if tick_size != 0.0 {
        let exp = decimal_places_exp(&pf.tick_size);
        new_price = (price / tick_size).round() * tick_size;
        new_price = (new_price * exp).round() / exp;
    }

    let min_price = parse_decimal(&pf.min_price)?;
    if min_price != 0.0 && new_price < min_price {
        return Ok(0.0);
    }

    let max_price = parse_decimal(&pf.max_price)?;
    if max_price != 0.0 && new_price > max_price {
        return Ok(0.0);
    }

    Ok(new_price)
}

/// Floors a quantity to the step size; quantities outside
/// `[minQty, maxQty]` are rejected.
pub fn lot_size_filter(lsf: &LotSizeFilter, qty: f64) -> Result<f64> {
    let step_size = parse_decimal(&lsf.step_size)?;

    let mut new_qty = qty;
    if step_size != 0.0 {
        let exp = decimal_places_exp(&lsf.step_size);
        new_qty = (qty / step_size).floor() * step_size;
        new_qty = (new_qty * exp).round() / exp;
    }

    let min_qty = parse_decimal(&lsf.min_quantity)?;
    if new_qty < min_qty {
        return Err(FollowError::Filter("quantity too small".to_string()));
    }

    let max_qty = parse_decimal(&lsf.max_quantity)?;
    if max_qty != 0.0 && new_qty > max_qty {
        return Err(FollowError::Filter("quantity too large".to_string()));
    }

    Ok(new_qty)
}

/// Rejects orders whose `price * qty` is below the venue's notional floor.
pub fn min_notional_filter(mnf: &MinNotionalFilter, price: f64, qty: f64) -> Result<()> {
    if mnf.notional.is_empty() {
        return Ok(());
    }

    let min_notional = parse_decimal(&mnf.notional)?;
    if price * qty < min_notional {
        return Err(FollowError::Filter(format!(
            "notional too small, expected >= {min_notional}, got {}",
            price * qty
        )));
    }

    Ok(())
}

/// Number of significant decimal places in a venue decimal string:
/// `"0.00100"` has 3.
fn decimal_places(s: &str) -> usize {
    let s = s.trim_matches('0');
    match s.find('.') {
        Some(i) => s.len() - i - 1,
        None => 0,
    }
}

fn decimal_places_exp(s: &str) -> f64 {
    10f64.powi(decimal_places(s) as i32)
}
