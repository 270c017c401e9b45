use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use relay_core::{Messenger, RelayError};

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends SMS through the Twilio Messages REST resource.
pub struct TwilioMessenger {
    client: Client,
    account_sid: String,
    auth_token: SecretString,
    api_base: String,
}

impl TwilioMessenger {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: SecretString,
        api_base: impl Into<String>,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            account_sid: account_sid.into(),
            auth_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    #[instrument(skip_all, fields(to = %to))]
    async fn send_message(&self, to: &str, from: &str, body: &str) -> Result<(), RelayError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| RelayError::upstream(format!("sms request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::upstream(format!(
                "sms provider returned {}: {text}",
                status.as_u16()
            )));
        }
        debug!("sms accepted by provider");
        Ok(())
    }
}
