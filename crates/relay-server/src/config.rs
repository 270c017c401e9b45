//! Runtime configuration for the relay server.

use std::time::Duration;

use relay_settings::{Environment, RelaySettings};

/// Resolved server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    pub env: Environment,
    /// Deadline for a control-client reply.
    pub request_timeout: Duration,
    /// Interval between websocket pings to the control client.
    pub heartbeat_interval: Duration,
    /// Outbound queue depth for the control connection.
    pub max_send_queue: usize,
    /// Max websocket message size in bytes.
    pub max_message_size: usize,
    /// The only sender whose SMS is acted on.
    pub user_phone_number: String,
    /// Number replies are sent from.
    pub service_phone_number: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            env: Environment::Development,
            request_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            max_send_queue: 64,
            max_message_size: 1024 * 1024,
            user_phone_number: String::new(),
            service_phone_number: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            env: settings.server.env,
            request_timeout: settings.server.request_timeout(),
            heartbeat_interval: settings.server.heartbeat_interval(),
            max_send_queue: settings.server.max_send_queue,
            max_message_size: settings.server.max_message_size,
            user_phone_number: settings.sms.user_phone_number.clone(),
            service_phone_number: settings.sms.twilio_phone_number.clone(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_settings_copies_server_and_sms_values() {
        let mut settings = RelaySettings::default();
        settings.server.port = 4100;
        settings.server.request_timeout_ms = 2500;
        settings.server.env = Environment::Production;
        settings.sms.user_phone_number = "+14155550100".into();
        settings.sms.twilio_phone_number = "+14155550199".into();

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:4100");
        assert_eq!(cfg.request_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.env, Environment::Production);
        assert_eq!(cfg.user_phone_number, "+14155550100");
        assert_eq!(cfg.service_phone_number, "+14155550199");
    }
}
