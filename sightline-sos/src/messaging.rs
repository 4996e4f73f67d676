//! Outbound alert delivery

use crate::config::TwilioConfig;
use crate::error::SosError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Sends a text message, returning the provider's message id
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<String, SosError>;
}

/// WhatsApp messages through the Twilio Messages API
pub struct TwilioMessenger {
    client: Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl TwilioMessenger {
    pub fn new(config: &TwilioConfig, timeout: Duration) -> Result<Self, SosError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SosError::Messaging(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<String, SosError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() {
            return Err(SosError::Messaging("Twilio credentials not configured".to_string()));
        }
        if to.is_empty() {
            return Err(SosError::Messaging("Guardian number not configured".to_string()));
        }

        let params = [("To", to), ("From", from), ("Body", body)];
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TwilioErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            return Err(SosError::Messaging(format!("Twilio rejected message: {}", detail)));
        }

        let message: MessageResource = response.json().await?;
        info!("WhatsApp message sent: {}", message.sid);
        Ok(message.sid)
    }
}
