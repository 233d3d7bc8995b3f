//! Signed REST client for the Binance futures API.
//!
//! A thin wrapper over `reqwest::Client` that signs requests with the
//! account's HMAC-SHA256 key, retries transient transport failures under a
//! rate-limit-aware backoff policy, and maps venue rejections onto the
//! crate's semantic error kinds.
//!
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::debug;
use url::Url;

use crate::follow::error::{FollowError, Result};
use crate::follow::exchange::binancefutures::models::ApiError;

/// Default production API base url.
pub const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";

/// Default testnet API base url.
pub const BINANCE_FUTURES_TESTNET_API_BASE: &str = "https://testnet.binancefuture.com";

// Venue error codes the engine gives dedicated semantics.
//
// -4016/-4024: limit price above/below the allowed band. Retriable, the
// order is deferred to a later tick.
const PRICE_BAND_CODES: [i64; 2] = [-4016, -4024];

/// "No need to modify the order": the submitted values already match.
pub const CODE_NO_NEED_TO_MODIFY: i64 = -5027;

/// "Unknown order sent": the order is gone, typically already filled or
/// cancelled.
pub const CODE_UNKNOWN_ORDER: i64 = -2011;

type HmacSha256 = Hmac<Sha256>;

/// Creates a backoff policy with a minimum interval between attempts derived
/// from the allowed request rate, bounded in total elapsed time so a venue
/// outage surfaces as an error instead of retrying forever.
fn create_backoff_policy(rate_limit_per_second: u64) -> ExponentialBackoff {
    let min_interval = Duration::from_secs_f64(1.0 / rate_limit_per_second as f64);

    ExponentialBackoffBuilder::new()
        .with_initial_interval(min_interval)
        .with_multiplier(2.0)
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(15)))
        .build()
}

/// An asynchronous client for the Binance futures REST API.
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Secret<String>,
    secret_key: Secret<String>,
    backoff: ExponentialBackoff,
}

impl RestClient {
    pub fn new(base_url: Url, api_key: Secret<String>, secret_key: Secret<String>) -> Self {
        Self {
            // Default timeout for I/O operations: 10 seconds
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key,
            secret_key,
            // Order endpoints allow 300 requests per minute per account.
            backoff: create_backoff_policy(5),
        }
    }

    /// Unsigned GET for public endpoints (ping, exchange info).
    pub async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, &[], false).await
    }

    /// Signed request carrying the given query parameters.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T> {
        let query = self.build_query(params, signed)?;
        let url = self.url(path, &query)?;

        debug!(%method, path, "binance futures request");

        let response = backoff::future::retry(self.backoff.clone(), || async {
            let mut req = self.client.request(method.clone(), url.clone());
            if signed {
                req = req.header("X-MBX-APIKEY", self.api_key.expose_secret());
            }

            let resp = req.send().await.map_err(|e| {
                // Connect/timeout problems are worth another attempt.
                backoff::Error::transient(FollowError::from(e))
            })?;

            let status = resp.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(venue_error(
                    status.as_u16() as i64,
                    resp.text().await.unwrap_or_default(),
                )));
            }
            Ok(resp)
        })
        .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_venue_error(&body, status.as_u16() as i64));
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn build_query(&self, params: &[(&str, String)], signed: bool) -> Result<String> {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencode(v)))
            .collect();

        if signed {
            pairs.push(format!("timestamp={}", Utc::now().timestamp_millis()));
            let payload = pairs.join("&");
            pairs.push(format!("signature={}", self.sign(&payload)?));
        }

        Ok(pairs.join("&"))
    }

    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| FollowError::Internal(format!("hmac key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn url(&self, path: &str, query: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| FollowError::Internal(format!("invalid url path {path}: {e}")))?;
        if !query.is_empty() {
            url.set_query(Some(query));
        }
        Ok(url)
    }
}

/// Maps a venue rejection body onto the crate's error kinds.
fn parse_venue_error(body: &str, http_status: i64) -> FollowError {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api_err) => venue_error(api_err.code, api_err.msg),
        Err(_) => FollowError::Venue {
            code: http_status,
            message: body.to_string(),
        },
    }
}

fn venue_error(code: i64, message: String) -> FollowError {
    if PRICE_BAND_CODES.contains(&code) {
        return FollowError::PriceOutOfRange;
    }
    FollowError::Venue { code, message }
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
