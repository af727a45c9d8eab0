//! External priority-fee estimation over HTTP
//!
//! Posts a JSON-RPC `getPriorityFeeEstimate` request carrying the base58
//! encoded transaction and a priority level derived from the fee tier.
//! Any error payload is a hard failure; the engine never substitutes a
//! locally computed price.

use serde::Deserialize;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::debug;

use crate::config::ExternalFeeConfig;
use crate::errors::DeliveryError;
use crate::types::FeeTier;

/// JSON-RPC envelope returned by the estimation service.
#[derive(Debug, Deserialize)]
struct PriorityFeeResponse {
    result: Option<PriorityFeeResult>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorityFeeResult {
    priority_fee_estimate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// Client for a Helius-compatible priority-fee estimation endpoint.
#[derive(Debug, Clone)]
pub struct HeliusFeeEstimator {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HeliusFeeEstimator {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("fee service client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ExternalFeeConfig) -> Result<Self, DeliveryError> {
        let url = config.url.as_deref().ok_or_else(|| {
            DeliveryError::Configuration("external fee strategy requires fees.external.url".into())
        })?;
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            DeliveryError::Configuration(
                "external fee strategy requires fees.external.api_key".into(),
            )
        })?;
        Self::new(url, api_key, Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Price in micro-lamports per compute unit for `tier`.
    pub async fn estimate(
        &self,
        tx: &VersionedTransaction,
        tier: FeeTier,
    ) -> Result<u64, DeliveryError> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| DeliveryError::estimation(tier, format!("serialize: {}", e)))?;
        let encoded = bs58::encode(bytes).into_string();

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": "getPriorityFeeEstimate",
            "params": [{
                "transaction": encoded,
                "options": { "priorityLevel": tier.priority_level() },
            }],
        });

        let response = self
            .client
            .post(&self.url)
            .query(&[("api-key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::estimation(tier, format!("fee service request: {}", e)))?;

        let response = response
            .error_for_status()
            .map_err(|e| DeliveryError::estimation(tier, format!("fee service status: {}", e)))?;

        let parsed: PriorityFeeResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::estimation(tier, format!("fee service body: {}", e)))?;

        let price = parse_estimate(parsed, tier)?;
        debug!(tier = %tier, price, "External priority fee estimate");
        Ok(price)
    }
}

fn parse_estimate(response: PriorityFeeResponse, tier: FeeTier) -> Result<u64, DeliveryError> {
    if let Some(error) = response.error {
        return Err(DeliveryError::estimation(
            tier,
            format!("fee service error {}: {}", error.code, error.message),
        ));
    }

    let estimate = response
        .result
        .and_then(|r| r.priority_fee_estimate)
        .ok_or_else(|| DeliveryError::estimation(tier, "fee service returned no estimate"))?;

    if !estimate.is_finite() || estimate < 0.0 {
        return Err(DeliveryError::estimation(
            tier,
            format!("fee service returned invalid estimate {}", estimate),
        ));
    }

    let rounded = estimate.ceil();
    if rounded > u64::MAX as f64 {
        return Err(DeliveryError::estimation(
            tier,
            format!("fee service estimate {} out of range", estimate),
        ));
    }
    Ok(rounded as u64)
}
