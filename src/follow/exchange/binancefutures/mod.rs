//! Binance USDⓈ-M futures adapter.
//!
//! Implements the [`Exchange`] port for Binance futures, including the parts
//! the engine must never see:
//!
//! - symbol composition and the exchange-info cache (persisted to a file,
//!     refreshed when the venue server timestamp is older than 24h),
//! - the price/lot-size/notional filters applied before every submission,
//! - order-type mapping (`TAKE_PROFIT` → `TAKE_PROFIT_MARKET`,
//!     `STOP_LOSS` → `STOP_MARKET`),
//! - the modify policy: native modify for `LIMIT`, cancel-and-recreate for
//!     trigger orders, and the translation of venue "no change required" and
//!     "price out of band" rejections.
//!
//! # Submodules
//!
//! - `client`: signed REST client.
//! - `models`: venue documents (exchange info, filters, orders).
//! - `filters`: venue arithmetic.
//!
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use secrecy::Secret;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error};
use url::Url;

use crate::follow::error::{FollowError, Result};
use crate::follow::exchange::cache::FileStore;
use crate::follow::model::{
    ExchangeOrder, ExchangeOrderStatus, OrderSide, OrderType, Pair,
};
use crate::follow::ports::{CreateOrderRequest, Exchange, ModifyOrderRequest};

pub mod client;
pub mod filters;
pub mod models;

use client::{RestClient, CODE_NO_NEED_TO_MODIFY, CODE_UNKNOWN_ORDER};
use filters::OrderValues;
use models::{ExchangeInfo, SymbolInfo, VenueOrder, VenueOrderType};

/// Identity name this adapter is registered under.
pub const EXCHANGE_NAME: &str = "BINANCE_FUTURES";

const EI_FILE_NAME: &str = "binancefutures_ei.json";
const MAX_EI_AGE_MS: i64 = 24 * 3600 * 1000;

/// Account configuration carried in the exchange identity document.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub testnet: bool,
    #[serde(rename = "API_KEY")]
    pub api_key: Secret<String>,
    #[serde(rename = "SECRET_KEY")]
    pub secret_key: Secret<String>,
    /// When a cancel discovers the order already filled, submit a
    /// reduce-only market order on the opposite side for the filled
    /// quantity. Off unless explicitly enabled.
    #[serde(rename = "closeFilledOnCancel", default)]
    pub close_filled_on_cancel: bool,
}

/// Adapter configuration.
pub struct Config {
    pub user_config: UserConfig,
    pub info_store: FileStore<ExchangeInfo>,
}

/// The Binance futures venue adapter.
pub struct BinanceFutures {
    client: RestClient,
    info_store: FileStore<ExchangeInfo>,
    testnet: bool,
    close_filled_on_cancel: bool,
    // Single-writer in-memory exchange-info cache.
    info: Mutex<Option<ExchangeInfo>>,
}

impl BinanceFutures {
    pub fn new(cfg: Config) -> Result<Self> {
        let base = if cfg.user_config.testnet {
            client::BINANCE_FUTURES_TESTNET_API_BASE
        } else {
            client::BINANCE_FUTURES_API_BASE
        };
        let base_url = Url::parse(base)
            .map_err(|e| FollowError::Internal(format!("invalid base url {base}: {e}")))?;

        Ok(Self {
            client: RestClient::new(
                base_url,
                cfg.user_config.api_key.clone(),
                cfg.user_config.secret_key.clone(),
            ),
            info_store: cfg.info_store,
            testnet: cfg.user_config.testnet,
            close_filled_on_cancel: cfg.user_config.close_filled_on_cancel,
            info: Mutex::new(None),
        })
    }

    fn cache_file(&self) -> String {
        if self.testnet {
            format!("testnet_{EI_FILE_NAME}")
        } else {
            EI_FILE_NAME.to_string()
        }
    }

    fn is_fresh(ei: &ExchangeInfo) -> bool {
        Utc::now().timestamp_millis() - ei.server_time <= MAX_EI_AGE_MS
    }

    /// Returns the exchange info and whether it was fetched from the venue
    /// by this call.
    ///
    /// Policy: serve the in-memory copy while fresh; otherwise try the cache
    /// file; a missing or stale snapshot is refetched and rewritten. Save
    /// failures are logged, never fatal.
    async fn exchange_info(&self, force: bool) -> Result<(ExchangeInfo, bool)> {
        let mut guard = self.info.lock().await;

        if !force {
            if let Some(ei) = guard.as_ref() {
                if Self::is_fresh(ei) {
                    return Ok((ei.clone(), false));
                }
            } else if let Ok(ei) = self.info_store.read(&self.cache_file()) {
                if Self::is_fresh(&ei) {
                    *guard = Some(ei.clone());
                    return Ok((ei, false));
                }
            }
        }

        debug!(testnet = self.testnet, "fetching exchange info");
        let ei: ExchangeInfo = self.client.get_public("/fapi/v1/exchangeInfo").await?;

        if let Err(e) = self.info_store.save(&self.cache_file(), &ei) {
            error!(error = %e, "error saving exchange info");
        }

        *guard = Some(ei.clone());
        Ok((ei, true))
    }

    /// Looks a venue symbol up in the exchange info.
    ///
    /// A miss against a snapshot fetched by this very call is final; a miss
    /// against a cached snapshot forces one refresh and retries before
    /// failing.
    async fn symbol(&self, symbol: &str) -> Result<SymbolInfo> {
        let (ei, fetched_now) = self.exchange_info(false).await?;
        if let Some(s) = find_symbol(&ei, symbol) {
            return Ok(s);
        }

        if fetched_now {
            return Err(FollowError::UnknownSymbol(symbol.to_string()));
        }

        let (ei, _) = self.exchange_info(true).await?;
        find_symbol(&ei, symbol).ok_or_else(|| FollowError::UnknownSymbol(symbol.to_string()))
    }

    /// Submits already-filtered order values to the venue.
    async fn submit(&self, values: OrderValues) -> Result<ExchangeOrder> {
        let mut params: Vec<(&str, String)> = vec![
            ("symbol", values.symbol.symbol.clone()),
            ("side", side_str(values.side).to_string()),
            ("type", values.order_type.as_str().to_string()),
        ];

        match values.order_type {
            VenueOrderType::Limit => {
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("quantity", values.base_quantity.to_string()));
                params.push(("price", values.price.to_string()));
            }
            VenueOrderType::Market => {
                params.push(("quantity", values.base_quantity.to_string()));
            }
            VenueOrderType::StopMarket | VenueOrderType::TakeProfitMarket => {
                params.push(("stopPrice", values.price.to_string()));
                if values.close_position {
                    params.push(("closePosition", "true".to_string()));
                } else {
                    params.push(("quantity", values.base_quantity.to_string()));
                }
            }
        }

        if values.reduce_only && !values.close_position {
            params.push(("reduceOnly", "true".to_string()));
        }

        let venue: VenueOrder = self
            .client
            .request(Method::POST, "/fapi/v1/order", &params, true)
            .await?;
        venue.into_exchange_order()
    }

    async fn fetch_order(&self, eo: &ExchangeOrder) -> Result<ExchangeOrder> {
        let venue: VenueOrder = self
            .client
            .request(
                Method::GET,
                "/fapi/v1/order",
                &[
                    ("symbol", eo.symbol.clone()),
                    ("orderId", eo.id.clone()),
                ],
                true,
            )
            .await?;
        venue.into_exchange_order()
    }

    /// Recreates a trigger order with new values: cancel, then create. A
    /// cancel that discovers a fill short-circuits to the filled state.
    async fn recreate(&self, eo: &ExchangeOrder, values: OrderValues) -> Result<ExchangeOrder> {
        let canceled = self.cancel(eo).await?;
        if canceled.status == ExchangeOrderStatus::Filled {
            return Ok(canceled);
        }
        self.submit(values).await
    }

    async fn cancel(&self, eo: &ExchangeOrder) -> Result<ExchangeOrder> {
        let result: Result<VenueOrder> = self
            .client
            .request(
                Method::DELETE,
                "/fapi/v1/order",
                &[
                    ("symbol", eo.symbol.clone()),
                    ("orderId", eo.id.clone()),
                ],
                true,
            )
            .await;

        match result {
            Ok(venue) => venue.into_exchange_order(),
            Err(FollowError::Venue { code, .. }) if code == CODE_UNKNOWN_ORDER => {
                // The order is gone from the open set; if it filled in the
                // meantime the cancel is a no-op success on the filled state.
                let current = self.fetch_order(eo).await?;
                if current.status != ExchangeOrderStatus::Filled {
                    return Ok(current);
                }
                if self.close_filled_on_cancel {
                    self.close_filled(&current).await?;
                }
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    /// Flattens a filled order with a reduce-only market order on the
    /// opposite side.
    async fn close_filled(&self, eo: &ExchangeOrder) -> Result<ExchangeOrder> {
        debug!(order = %eo.id, "closing filled order with inverse market order");
        let symbol = self.symbol(&eo.symbol).await?;

        let mut values = OrderValues {
            symbol,
            side: eo.side.opposite(),
            order_type: VenueOrderType::Market,
            price: 0.0,
            base_quantity: eo.base_quantity,
            reduce_only: true,
            close_position: false,
        };
        filters::apply(&mut values)?;
        self.submit(values).await
    }
}

#[async_trait]
impl Exchange for BinanceFutures {
    async fn init(&self) -> Result<()> {
        let _: serde_json::Value = self.client.get_public("/fapi/v1/ping").await?;
        self.exchange_info(false).await?;
        Ok(())
    }

    async fn get_order(&self, exchange_order: &ExchangeOrder) -> Result<ExchangeOrder> {
        self.fetch_order(exchange_order).await
    }

    async fn create_order(&self, req: CreateOrderRequest) -> Result<ExchangeOrder> {
        let symbol = self.symbol(&venue_symbol(&req.pair)).await?;
        let order_type = venue_order_type(req.order_type);
        let target = if order_type.is_trigger() {
            req.stop_price
        } else {
            req.price
        };

        let mut values = OrderValues {
            symbol,
            side: req.side,
            order_type,
            price: target,
            base_quantity: req.base_quantity,
            reduce_only: req.reduce_only,
            close_position: req.close_position,
        };
        filters::apply(&mut values)?;

        self.submit(values).await
    }

    async fn modify_order(&self, req: ModifyOrderRequest) -> Result<ExchangeOrder> {
        let eo = req.exchange_order.clone();
        let symbol = self.symbol(&eo.symbol).await?;
        let order_type = parse_venue_order_type(&eo.order_type)?;
        let target = if order_type.is_trigger() {
            req.stop_price
        } else {
            req.price
        };

        let mut values = OrderValues {
            symbol,
            side: eo.side,
            order_type,
            price: target,
            base_quantity: req.base_quantity,
            reduce_only: req.reduce_only,
            close_position: req.close_position,
        };
        filters::apply(&mut values)?;

        // Nothing to do when the filtered values match the live order.
        let current_target = if order_type.is_trigger() {
            eo.stop_price
        } else {
            eo.price
        };
        if values.price == current_target && values.base_quantity == eo.base_quantity {
            debug!(order = %eo.id, price = values.price, "values unchanged, skipping modify");
            return Ok(eo);
        }

        if order_type != VenueOrderType::Limit {
            return self.recreate(&eo, values).await;
        }

        let result: Result<VenueOrder> = self
            .client
            .request(
                Method::PUT,
                "/fapi/v1/order",
                &[
                    ("orderId", eo.id.clone()),
                    ("symbol", values.symbol.symbol.clone()),
                    ("side", side_str(values.side).to_string()),
                    ("quantity", values.base_quantity.to_string()),
                    ("price", values.price.to_string()),
                ],
                true,
            )
            .await;

        match result {
            Ok(venue) => venue.into_exchange_order(),
            Err(FollowError::Venue { code, .. }) if code == CODE_NO_NEED_TO_MODIFY => {
                debug!(order = %eo.id, "venue reports no change required");
                Ok(eo)
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_order(&self, exchange_order: &ExchangeOrder) -> Result<ExchangeOrder> {
        self.cancel(exchange_order).await
    }
}

fn venue_symbol(pair: &Pair) -> String {
    format!("{}{}", pair.base, pair.quote)
}

fn venue_order_type(order_type: OrderType) -> VenueOrderType {
    match order_type {
        OrderType::Limit => VenueOrderType::Limit,
        OrderType::Market => VenueOrderType::Market,
        OrderType::TakeProfit => VenueOrderType::TakeProfitMarket,
        OrderType::StopLoss => VenueOrderType::StopMarket,
    }
}

fn parse_venue_order_type(s: &str) -> Result<VenueOrderType> {
    match s {
        "LIMIT" => Ok(VenueOrderType::Limit),
        "MARKET" => Ok(VenueOrderType::Market),
        "STOP_MARKET" => Ok(VenueOrderType::StopMarket),
        "TAKE_PROFIT_MARKET" => Ok(VenueOrderType::TakeProfitMarket),
        other => Err(FollowError::Parse(format!(
            "unsupported venue order type: {other}"
        ))),
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn find_symbol(ei: &ExchangeInfo, symbol: &str) -> Option<SymbolInfo> {
    ei.symbols.iter().find(|s| s.symbol == symbol).cloned()
}
