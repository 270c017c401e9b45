use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;

use relay_core::{Messenger, Translator};
use relay_server::ServerConfig;
use relay_settings::{CliOverrides, Environment};
use relay_telemetry::TelemetryConfig;
use relay_upstream::{OpenAiTranslator, TwilioMessenger};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay natural-language SMS to a home lighting control client.
#[derive(Debug, Parser)]
#[command(name = "hue-relay", version)]
struct Args {
    /// HTTP listen port.
    #[arg(long)]
    port: Option<u16>,
    /// Deployment environment (development|staging|production).
    #[arg(long)]
    env: Option<Environment>,
    /// The only phone number allowed to send commands.
    #[arg(long)]
    user_phone_number: Option<String>,
    /// Number replies are sent from.
    #[arg(long)]
    twilio_phone_number: Option<String>,
    /// Load variables from a .env file (default `.env`).
    #[arg(long, num_args = 0..=1, default_missing_value = ".env")]
    env_file: Option<PathBuf>,
    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.env_file {
        relay_settings::load_dotenv(Some(path)).context("loading env file")?;
    }

    let mut settings =
        relay_settings::load_settings(args.config.as_deref()).context("loading settings")?;
    settings.apply_cli(CliOverrides {
        port: args.port,
        env: args.env,
        user_phone_number: args.user_phone_number,
        twilio_phone_number: args.twilio_phone_number,
    });

    let telemetry = relay_telemetry::init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));
    tracing::debug!(filter = telemetry.filter(), json = telemetry.is_json(), "telemetry initialized");

    if let Err(e) = settings.validate() {
        tracing::error!(error = %e, "invalid settings");
        return Err(e).context("validating settings");
    }

    let openai = OpenAiTranslator::new(
        SecretString::from(settings.translator.api_key.clone()),
        settings.translator.model.clone(),
        settings.translator.base_url.clone(),
        Duration::from_secs(settings.translator.timeout_secs),
    )?;
    tracing::info!(model = openai.model(), "translator configured");
    let translator: Arc<dyn Translator> = Arc::new(openai);
    let messenger: Arc<dyn Messenger> = Arc::new(TwilioMessenger::new(
        settings.sms.account_sid.clone(),
        SecretString::from(settings.sms.auth_token.clone()),
        settings.sms.api_base_url.clone(),
    )?);

    let config = ServerConfig::from_settings(&settings);
    let handle = relay_server::start(config, translator, messenger)
        .await
        .context("starting server")?;

    tracing::info!(port = handle.port, env = %settings.server.env, "hue relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown();
    handle.wait(SHUTDOWN_TIMEOUT).await;
    Ok(())
}
