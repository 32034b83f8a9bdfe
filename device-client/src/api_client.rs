use anyhow::{Context, Result};
use log::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// What `POST /device/start` hands back.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedFlow {
    pub device_code: String,
    pub user_code: String,
    pub interval: u64,
    pub expires_in: u64,
    pub verification_path: String,
    #[serde(default)]
    pub verification_url: Option<String>,
}

/// What `POST /device/token` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    AuthorizationPending {
        interval: u64,
    },
    SlowDown {
        interval: u64,
    },
    Success {
        #[serde(rename = "accessToken")]
        access_token: String,
        #[serde(rename = "accessTokenExpiresAt", default)]
        access_token_expires_at: Option<i64>,
    },
    ExpiredToken,
    InvalidGrant,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub async fn start(&self) -> Result<StartedFlow> {
        self.post("/device/start", json!({}))
            .await
            .context("Failed to start a device flow")
    }

    pub async fn poll(&self, device_code: &str) -> Result<PollOutcome> {
        self.post("/device/token", json!({ "deviceCode": device_code }))
            .await
            .context("Failed to poll the device flow")
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("{} returned {} - Response: {}", path, status, body);
        }

        let api_response: Value = response.json().await.context("Failed to parse response")?;
        unwrap_data(api_response)
    }
}

/// Extracts the `data` member of the server's `ApiResponse` wrapper.
fn unwrap_data<T: DeserializeOwned>(mut api_response: Value) -> Result<T> {
    let data = api_response
        .get_mut("data")
        .map(Value::take)
        .context("No data in response")?;
    serde_json::from_value(data).context("Unexpected response shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_flow_is_read_from_the_envelope() {
        let started: StartedFlow = unwrap_data(json!({
            "status_code": 200,
            "data": {
                "deviceCode": "a".repeat(64),
                "userCode": "ABCD-EFGH",
                "interval": 5,
                "expiresIn": 600,
                "verificationPath": "/device"
            }
        }))
        .unwrap();

        assert_eq!(started.user_code, "ABCD-EFGH");
        assert_eq!(started.interval, 5);
        assert_eq!(started.expires_in, 600);
        assert_eq!(started.verification_url, None);
    }

    #[test]
    fn every_poll_status_is_understood() {
        let cases = [
            (
                json!({ "status": "authorization_pending", "interval": 5 }),
                PollOutcome::AuthorizationPending { interval: 5 },
            ),
            (
                json!({ "status": "slow_down", "interval": 10 }),
                PollOutcome::SlowDown { interval: 10 },
            ),
            (
                json!({ "status": "success", "accessToken": "token" }),
                PollOutcome::Success {
                    access_token: "token".to_string(),
                    access_token_expires_at: None,
                },
            ),
            (json!({ "status": "expired_token" }), PollOutcome::ExpiredToken),
            (json!({ "status": "invalid_grant" }), PollOutcome::InvalidGrant),
        ];

        for (data, expected) in cases {
            let outcome: PollOutcome =
                unwrap_data(json!({ "status_code": 200, "data": data })).unwrap();
            assert_eq!(outcome, expected);
        }
    }

    #[test]
    fn missing_data_is_an_error() {
        assert!(unwrap_data::<PollOutcome>(json!({ "status_code": 500 })).is_err());
    }
}
