//! Settings types.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// E.164 number as accepted by the SMS provider, e.g. `+19875551234`.
static PHONE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{10,14}$").expect("phone number pattern is valid"));

/// Check a phone number against the E.164 shape.
pub fn is_valid_phone_number(number: &str) -> bool {
    PHONE_NUMBER.is_match(number)
}

/// Deployment environment reported by the health endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(SettingsError::InvalidValue(format!(
                "env must be development|staging|production, got {other}"
            ))),
        }
    }
}

/// Top-level relay settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub server: ServerSettings,
    pub sms: SmsSettings,
    pub translator: TranslatorSettings,
    pub logging: LoggingSettings,
}

/// HTTP listener and control-channel settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub env: Environment,
    /// How long a webhook waits for the control client to answer.
    pub request_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
    /// Outbound messages buffered for the control client before sends fail.
    pub max_send_queue: usize,
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            env: Environment::Development,
            request_timeout_ms: 5_000,
            heartbeat_interval_secs: 30,
            max_send_queue: 64,
            max_message_size: 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// SMS provider account and the single allow-listed sender.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmsSettings {
    pub user_phone_number: String,
    pub twilio_phone_number: String,
    pub account_sid: String,
    pub auth_token: String,
    pub api_base_url: String,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            user_phone_number: String::new(),
            twilio_phone_number: String::new(),
            account_sid: String::new(),
            auth_token: String::new(),
            api_base_url: "https://api.twilio.com".into(),
        }
    }
}

impl fmt::Debug for SmsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsSettings")
            .field("user_phone_number", &self.user_phone_number)
            .field("twilio_phone_number", &self.twilio_phone_number)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Chat-completions endpoint used to translate SMS text.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatorSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o".into(),
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for TranslatorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorSettings")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Values supplied on the command line. `None` leaves the loaded value alone.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub env: Option<Environment>,
    pub user_phone_number: Option<String>,
    pub twilio_phone_number: Option<String>,
}

impl RelaySettings {
    pub fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(env) = cli.env {
            self.server.env = env;
        }
        if let Some(number) = cli.user_phone_number.filter(|n| !n.is_empty()) {
            self.sms.user_phone_number = number;
        }
        if let Some(number) = cli.twilio_phone_number.filter(|n| !n.is_empty()) {
            self.sms.twilio_phone_number = number;
        }
    }

    /// Reject settings the relay cannot start with.
    pub fn validate(&self) -> Result<()> {
        check_phone("sms.userPhoneNumber", &self.sms.user_phone_number)?;
        check_phone("sms.twilioPhoneNumber", &self.sms.twilio_phone_number)?;
        if self.sms.account_sid.is_empty() {
            return Err(SettingsError::Missing("sms.accountSid"));
        }
        if self.sms.auth_token.is_empty() {
            return Err(SettingsError::Missing("sms.authToken"));
        }
        if self.translator.api_key.is_empty() {
            return Err(SettingsError::Missing("translator.apiKey"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.requestTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must be greater than zero".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn check_phone(key: &'static str, number: &str) -> Result<()> {
    if number.is_empty() {
        return Err(SettingsError::Missing(key));
    }
    if !is_valid_phone_number(number) {
        return Err(SettingsError::InvalidValue(format!(
            "{key} is not in the correct format ('+19875551234'): {number}"
        )));
    }
    Ok(())
}
