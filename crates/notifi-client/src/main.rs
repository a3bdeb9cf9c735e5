//! Notifi command-line client entry point.

use std::path::PathBuf;

use clap::Parser;
use notifi_app::Runtime;
use notifi_client::{
    ApiClient, ClientConfig, ConfigOverrides, NetworkDriver, SystemEnv, TokenStore,
    terminal::DEFAULT_VISIBLE_ROWS,
};
use notifi_core::{HostInfo, Identity, MemorySessionStore};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Notifi real-time chat client
#[derive(Parser, Debug)]
#[command(name = "notifi")]
#[command(about = "Line-based client for the Notifi chat service")]
#[command(version)]
struct Args {
    /// REST API origin [env: NOTIFI_API_URL] [default: http://localhost:8000]
    #[arg(long)]
    api_url: Option<String>,

    /// Live-channel origin; derived from the API origin when omitted
    /// [env: NOTIFI_WS_URL]
    #[arg(long)]
    ws_url: Option<String>,

    /// Messages per history fetch: 10, 20 or 50 [env: NOTIFI_BATCH_SIZE]
    #[arg(long)]
    batch_size: Option<u32>,

    /// File the auth token is kept in between runs [env: NOTIFI_TOKEN_FILE]
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Rows of the virtual viewport
    #[arg(long, default_value_t = DEFAULT_VISIBLE_ROWS)]
    rows: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries the chat
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &args.log_level;
        EnvFilter::new(format!(
            "notifi={level},notifi_client={level},notifi_app={level},notifi_core={level}"
        ))
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    let config = ClientConfig::from_env(ConfigOverrides {
        api_url: args.api_url,
        ws_url: args.ws_url,
        batch_size: args.batch_size,
        token_file: args.token_file,
    })?;

    let env = SystemEnv::new();
    let host =
        HostInfo::new(std::env::consts::OS, concat!("notifi-cli/", env!("CARGO_PKG_VERSION")));
    let identity = Identity::create(&env, &host, &mut MemorySessionStore::new());
    info!(
        device_id = %identity.device_id(),
        api = %config.endpoints.api(),
        live = %config.endpoints.live(),
        "starting notifi"
    );

    let tokens = TokenStore::new(config.token_file.clone());
    let restored = match tokens.load() {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable token file");
            None
        },
    };

    let driver = NetworkDriver::stdio(ApiClient::new(config.endpoints.clone()), tokens, args.rows);
    let mut runtime = Runtime::new(
        driver,
        env,
        identity,
        config.connection_config(),
        config.app_config(),
    );

    Ok(runtime.run(restored).await?)
}
