//! Command-line parcel delivery over PoHTTP.
//!
//! Loads configuration, initializes logging and delivers a single parcel
//! to a recipient given as a URL or an overlay network address.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use pohttp_delivery::{
    client::HttpTransport,
    resolver::{Nameserver, ResolverSettings, SrvAddressResolver},
    Config, GatewayHeader, ParcelDeliverer,
};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

/// Deliver a parcel to the next hop over PoHTTP.
#[derive(Debug, Parser)]
#[command(name = "pohttp-deliver", version, about)]
struct Cli {
    /// Recipient URL or Internet address
    recipient: String,

    /// File containing the serialized parcel (`-` or omitted for stdin)
    parcel: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = pohttp_delivery::config::CONFIG_FILE)]
    config: PathBuf,

    /// Address of this node, announced to the recipient
    #[arg(long)]
    gateway_address: Option<String>,

    /// Header carrying the gateway address
    #[arg(long, value_parser = parse_gateway_header)]
    gateway_header: Option<GatewayHeader>,

    /// Number of 307/308 redirects to follow
    #[arg(long)]
    max_redirects: Option<u32>,

    /// Timeout of each POST attempt in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Reach resolved addresses over plain HTTP and allow non-TLS URLs
    #[arg(long)]
    no_tls: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        },
    };

    init_tracing(&config.log_level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration and applies command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_from(&cli.config)?;

    if let Some(address) = &cli.gateway_address {
        config.gateway_address = Some(address.clone());
    }
    if let Some(header) = cli.gateway_header {
        config.gateway_header = header;
    }
    if let Some(max_redirects) = cli.max_redirects {
        config.max_redirects = max_redirects;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if cli.no_tls {
        config.use_tls = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let parcel = read_parcel(cli.parcel.as_deref()).await?;
    info!(
        recipient = %cli.recipient,
        parcel_len = parcel.len(),
        max_redirects = config.max_redirects,
        use_tls = config.use_tls,
        tls_required = config.tls_required,
        "Configuration loaded"
    );

    let transport = HttpTransport::new(&config.to_transport_config())
        .context("Failed to create HTTP transport")?;
    let resolver = create_resolver(config.to_resolver_settings())?;
    let deliverer = ParcelDeliverer::new(Arc::new(transport), Arc::new(resolver))
        .with_tls_policy(config.to_tls_policy());

    let started = std::time::Instant::now();
    let response =
        deliverer.deliver(&cli.recipient, parcel, &config.to_delivery_options()).await?;
    let elapsed: Duration = started.elapsed();

    info!(duration_ms = elapsed.as_millis(), "Delivery complete");
    println!(
        "Delivered to {} (HTTP {}, {} redirect(s))",
        response.url, response.status, response.redirects
    );
    Ok(())
}

/// Creates the SRV resolver, falling back to public nameservers when the
/// system DNS configuration cannot be loaded.
fn create_resolver(settings: ResolverSettings) -> Result<SrvAddressResolver> {
    match SrvAddressResolver::new(&settings) {
        Ok(resolver) => Ok(resolver),
        Err(e) if settings.nameserver == Nameserver::System => {
            warn!(error = %e, "System DNS configuration unavailable, using Cloudflare");
            let fallback = ResolverSettings { nameserver: Nameserver::Cloudflare, ..settings };
            SrvAddressResolver::new(&fallback).context("Failed to create address resolver")
        },
        Err(e) => Err(e).context("Failed to create address resolver"),
    }
}

/// Reads the parcel from `path`, or from stdin when absent or `-`.
async fn read_parcel(path: Option<&std::path::Path>) -> Result<Bytes> {
    match path {
        Some(path) if path.as_os_str() != "-" => {
            let contents = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read parcel from {}", path.display()))?;
            Ok(Bytes::from(contents))
        },
        _ => {
            let mut contents = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut contents)
                .await
                .context("Failed to read parcel from stdin")?;
            Ok(Bytes::from(contents))
        },
    }
}

fn parse_gateway_header(value: &str) -> Result<GatewayHeader, String> {
    match value.to_ascii_lowercase().as_str() {
        "awala-gateway" | "x-awala-gateway" => Ok(GatewayHeader::AwalaGateway),
        "relaynet-gateway" | "x-relaynet-gateway" => Ok(GatewayHeader::RelaynetGateway),
        "relaynet-relay" | "x-relaynet-relay" => Ok(GatewayHeader::RelaynetRelay),
        other => Err(format!("unknown gateway header: {other}")),
    }
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
