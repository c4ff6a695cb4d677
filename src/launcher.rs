use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::EngineError;
use crate::model::PendingLaunch;

/// Result of a successful token launch.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchedToken {
    pub mint: String,
    #[serde(default)]
    pub signature: Option<String>,
}

/// The external launch service. It creates the mint on the bonding curve
/// from the funded dev wallet; mint-collision safety is its guarantee,
/// ours is calling it at most once per claimed launch.
#[async_trait]
pub trait TokenLauncher: Send + Sync {
    async fn launch(&self, launch: &PendingLaunch) -> Result<LaunchedToken, EngineError>;
}

pub struct HttpLauncher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLauncher {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            // Launches mint and fund in one shot; give the upstream room.
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EngineError::Config(format!("building launcher client: {e}")))?;
        Ok(HttpLauncher { http, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl TokenLauncher for HttpLauncher {
    async fn launch(&self, launch: &PendingLaunch) -> Result<LaunchedToken, EngineError> {
        let response = self
            .http
            .post(format!("{}/v1/launch", self.base_url))
            .json(&json!({
                "name": launch.name,
                "symbol": launch.symbol,
                "image": launch.image,
                "description": launch.description,
                "devWallet": launch.deposit_address,
                "opsWallet": launch.ops_address,
            }))
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("launcher unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                EngineError::Transient(format!("launcher {status}: {body}"))
            } else {
                EngineError::Other(format!("launch rejected ({status}): {body}"))
            });
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Other(format!("launcher response shape: {e}")))
    }
}
