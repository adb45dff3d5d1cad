//! OBO Gate - bearer-token gate with on-behalf-of exchange

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use obo_gate::{
    cli::{Cli, Command},
    config::Config,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.map(|f| f.as_str())) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> obo_gate::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    Ok(config)
}

/// Print the effective configuration without secrets
fn check_config(config: &Config) -> ExitCode {
    println!("Configuration OK");
    println!("  Listen:   {}:{}", config.server.host, config.server.port);
    println!("  Issuer:   {}", config.identity.issuer);
    println!("  Audience: {}", config.identity.audience);
    println!("  JWKS:     {}", config.identity.resolved_jwks_uri());
    if config.exchange.enabled {
        println!(
            "  Exchange: enabled ({} -> {})",
            config.exchange.client_id,
            config.exchange.scopes.join(" ")
        );
    } else {
        println!("  Exchange: disabled");
    }
    ExitCode::SUCCESS
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        exchange = config.exchange.enabled,
        "Starting OBO gate"
    );

    if let Err(e) = Server::new(config).run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
