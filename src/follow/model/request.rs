//! Boundary documents exchanged with the ingress.
//!
//! The HTTP layer that accepts these documents is an external collaborator;
//! this module only fixes their shape. Exchange credentials travel out of
//! band (e.g. headers) as an [`ExchangeIdentity`] and never appear inside the
//! follow document itself.
//!
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::follow::error::{FollowError, Result};
use crate::follow::model::order::{OrderSide, OrderType, StatusRelation};
use crate::follow::model::{Follow, Order};
use crate::follow::plot::PlotSpec;

/// Request to create a follow: a symbol, a re-evaluation interval and the
/// order bundle, each order carrying its plot specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFollowRequest {
    pub symbol: String,
    pub interval: String,
    pub orders: Vec<CreateOrderRequest>,
    #[serde(rename = "webhookURL", default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    #[serde(default)]
    pub base_quantity: f64,
    #[serde(default)]
    pub quote_quantity: f64,
    #[serde(default)]
    pub close_position: bool,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub relations: Vec<StatusRelation>,
    #[serde(rename = "plot")]
    pub plot_spec: PlotSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFollowResponse {
    #[serde(rename = "followID")]
    pub follow_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFollowRequest {
    #[serde(rename = "followID")]
    pub follow_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFollowResponse {
    pub follow: Follow,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopFollowRequest {
    #[serde(rename = "followID")]
    pub follow_id: String,
    #[serde(rename = "cancelOrders", default)]
    pub cancel_orders: bool,
}

/// Out-of-band exchange identity: which venue, and its adapter config.
///
/// When `config_env` is set the adapter config JSON is read from that named
/// environment variable; otherwise the inline `config` document is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeIdentity {
    pub name: String,
    #[serde(default)]
    pub config_env: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ExchangeIdentity {
    /// An identity whose adapter config is read from `config_env`.
    pub fn from_env(name: impl Into<String>, config_env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_env: Some(config_env.into()),
            config: serde_json::Value::Null,
        }
    }

    /// Deserializes the adapter config, from the environment variable when
    /// `config_env` is set, from the inline document otherwise.
    pub fn resolve_config<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.config_env {
            Some(env) => {
                let raw = std::env::var(env)?;
                Ok(serde_json::from_str(&raw)?)
            }
            None => Ok(serde_json::from_value(self.config.clone())?),
        }
    }

    /// A stable fingerprint of this identity.
    ///
    /// SHA-256 hex over the venue name and the identity's config source.
    /// `serde_json` keeps object keys sorted, so the fingerprint does not
    /// depend on the key order of the submitted config document.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.name);
        if let Some(env) = &self.config_env {
            hasher.update(env);
        }
        hasher.update(self.config.to_string());
        hex::encode(hasher.finalize())
    }

    /// Verifies that this identity matches the hash a follow was created
    /// under.
    pub fn verify(&self, expected_hash: &str, follow_id: &str) -> Result<()> {
        if self.hash() != expected_hash {
            return Err(FollowError::IdentityMismatch(follow_id.to_string()));
        }
        Ok(())
    }
}
