use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use meridian::{
    adapters::{HttpClientAdapter, HttpHandler},
    config::{GatewayConfig, GatewayConfigValidator, load_config},
    core::GatewayService,
    metrics,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::{GracefulShutdown, HealthCheckSupervisor},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config: GatewayConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    GatewayConfigValidator::validate(&config).context("Invalid configuration")?;

    tracing_setup::init_tracing_with_config(&config.logging.level, config.logging.json)?;
    metrics::init_metrics();

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let config = Arc::new(config);
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let gateway = Arc::new(
        GatewayService::new(config.clone())
            .await
            .context("Failed to register configured services")?,
    );

    let supervisor = Arc::new(HealthCheckSupervisor::new(
        gateway.registry().clone(),
        http_client.clone(),
        config.health_check.clone(),
    ));
    if supervisor.is_enabled() {
        for instance in gateway.registry().list_all() {
            supervisor.watch(&instance).await;
        }
        tracing::info!(
            checkers = supervisor.len(),
            interval_secs = config.health_check.interval_secs,
            path = %config.health_check.path,
            max_retries = config.health_check.max_retries,
            "Health checking enabled"
        );
    } else {
        tracing::info!("Health checking disabled, instances are routable on registration");
    }

    for (prefix, service) in &config.routes {
        tracing::info!("Configured route: {} -> {}", prefix, service);
    }
    if let Some(prefix) = &config.service_prefix {
        tracing::info!("Service prefix routing under {}", prefix);
    }

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    let http_handler = Arc::new(HttpHandler::new(
        gateway.clone(),
        http_client,
        supervisor.clone(),
    )?);
    let app = http_handler.router();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Starting Meridian API Gateway on {} ({} instances, {} breakers)",
        addr,
        gateway.registry().len(),
        gateway.breakers().len()
    );
    println!("Meridian API Gateway listening on {addr}");

    let shutdown_token = graceful_shutdown.shutdown_token();
    let server_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown_token.wait_for_shutdown().await;
        tracing::info!("Shutdown signal received: {:?}", reason);
    })
    .await
    .context("Server error");

    tracing::info!("Shutting down health checkers...");
    supervisor.shutdown().await;
    tracing::info!("Graceful shutdown completed");

    server_result
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.routes.len());
            println!(
                "   • Service Prefix: {}",
                config.service_prefix.as_deref().unwrap_or("none")
            );
            println!("   • Static Instances: {}", config.services.len());
            println!("   • Health Checks: {}", config.health_check.enabled);
            println!(
                "   • Breaker Overrides: {}",
                config.circuit_breaker.overrides.len()
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Route prefixes must start with '/'");
            println!("   • Every instance needs a name, a host and a non-zero port");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Meridian API Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Requests under /api/v1/<service>/... go to <service>
service_prefix = "/api/v1"

# Explicit prefix routes (longest prefix wins)
[routes]
"/calls" = "calling-service"

# Instances registered at startup
[[services]]
name = "auth-service"
host = "127.0.0.1"
port = 3001
version = "1.0.0"

[[services]]
name = "calling-service"
host = "127.0.0.1"
port = 3002

[health_check]
enabled = true
interval_secs = 30
timeout_secs = 5
max_retries = 3
path = "/health"

[circuit_breaker]
failure_threshold = 5
reset_timeout_secs = 30
half_open_max_requests = 3

# Stricter policy for a single service
# [circuit_breaker.overrides.calling-service]
# failure_threshold = 2
# reset_timeout_secs = 10
# half_open_max_requests = 1

[proxy]
timeout_secs = 30
load_balance = "round_robin"

[logging]
level = "info"
json = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'meridian serve --config {config_path}' to start the gateway");
    Ok(())
}
