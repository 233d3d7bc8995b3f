//! Venue adapters implementing the [`Exchange`] port.
//!
//! # Submodules
//!
//! - `binancefutures`: Binance USDⓈ-M futures adapter.
//! - `cache`: JSON file store used by adapters to persist venue metadata
//!     between runs.
//!
use std::path::Path;
use std::sync::Arc;

use crate::follow::error::{FollowError, Result};
use crate::follow::model::request::ExchangeIdentity;
use crate::follow::ports::Exchange;

pub mod binancefutures;
pub mod cache;

/// Builds the venue adapter an exchange identity names.
pub fn from_identity(
    identity: &ExchangeIdentity,
    exchange_info_dir: &Path,
) -> Result<Arc<dyn Exchange>> {
    match identity.name.as_str() {
        binancefutures::EXCHANGE_NAME => {
            let user_config: binancefutures::UserConfig = identity.resolve_config()?;
            let adapter = binancefutures::BinanceFutures::new(binancefutures::Config {
                user_config,
                info_store: cache::FileStore::new(exchange_info_dir)?,
            })?;
            Ok(Arc::new(adapter))
        }
        other => Err(FollowError::UnknownExchange(other.to_string())),
    }
}
