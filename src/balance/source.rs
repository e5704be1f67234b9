use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::BalanceError;

/// The paid-API account whose balance is tracked.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_balance(&self) -> Result<f64, BalanceError>;
}

/// Moonshot-style `GET {base}/users/me/balance` endpoint.
pub struct HttpBalanceSource {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HttpBalanceSource {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, BalanceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

pub(crate) fn parse_balance(json: &serde_json::Value) -> Result<f64, BalanceError> {
    json["data"]["available_balance"]
        .as_f64()
        .ok_or_else(|| BalanceError::Payload(format!("missing data.available_balance in {json}")))
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    fn name(&self) -> &str {
        "moonshot"
    }

    async fn fetch_balance(&self) -> Result<f64, BalanceError> {
        let response = self
            .client
            .get(format!("{}/users/me/balance", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BalanceError::Status { status, body });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BalanceError::Payload(e.to_string()))?;

        parse_balance(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_available_balance() {
        let body = json!({
            "code": 0,
            "data": {"available_balance": 49.58, "voucher_balance": 46.58, "cash_balance": 3.0},
            "status": true
        });
        assert_eq!(parse_balance(&body).unwrap(), 49.58);
    }

    #[test]
    fn rejects_payload_without_balance() {
        let err = parse_balance(&json!({"code": 1, "error": "unauthorized"})).unwrap_err();
        assert!(matches!(err, BalanceError::Payload(_)));
    }
}
