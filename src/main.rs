//! qrlink - QR-code device pairing and login delivery
//!
//! Pairs a secondary viewer device (e.g. a desktop dashboard) with an
//! already-authenticated scanner device (e.g. a phone) via a single-use QR
//! code, and pushes the login result to the viewer over a WebSocket.

use anyhow::Result;
use clap::Parser;
use qrlink_auth::{AccountStorage, CredentialStore, TokenSigner};
use qrlink_core::Config;
use qrlink_pairing::{
    ChannelManager, DeviceLinkStorage, DeviceRegistry, PairingOrchestrator, SessionRegistry,
};
use qrlink_server::{
    calculate_cert_fingerprint, create_router, create_rustls_config, AppState, CertificateManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// qrlink - pair devices with single-use QR codes
#[derive(Parser, Debug)]
#[command(name = "qrlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Pairing session validity in seconds
    #[arg(long, default_value = "300")]
    pairing_ttl: i64,

    /// Login token validity in seconds
    #[arg(long, default_value = "1800")]
    token_ttl: i64,

    /// Token signing secret (falls back to the QRLINK_SECRET environment
    /// variable, then to an ephemeral random secret)
    #[arg(long)]
    secret: Option<String>,

    /// Storage directory for accounts and device links
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Disable HTTPS (not recommended outside development)
    #[arg(long)]
    no_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    cert: Option<String>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    key: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("qrlink v{}", env!("CARGO_PKG_VERSION"));

    // Resolve the signing secret: flag, environment, or ephemeral
    let secret = match args.secret.or_else(|| std::env::var("QRLINK_SECRET").ok()) {
        Some(secret) => secret,
        None => {
            warn!("No signing secret configured; using an ephemeral one (tokens will not survive restarts)");
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        }
    };

    // Create configuration
    let mut config = Config::new()
        .with_port(args.port)
        .with_pairing_ttl(args.pairing_ttl)
        .with_token_ttl(args.token_ttl)
        .with_signing_secret(secret);
    if let Some(dir) = args.storage_dir {
        config = config.with_storage_dir(dir);
    }

    // Initialize storage
    info!("Initializing storage...");
    let (accounts, device_storage) = match &config.storage_dir {
        Some(dir) => (
            AccountStorage::with_path(dir.join("accounts.json")).await?,
            DeviceLinkStorage::with_path(dir.join("devices.json")).await?,
        ),
        None => (
            AccountStorage::new().await?,
            DeviceLinkStorage::new().await?,
        ),
    };
    let accounts = Arc::new(accounts);
    let device_storage = Arc::new(device_storage);

    // Get local IP address for the access URL and certificate
    let local_ip = get_local_ip().unwrap_or_else(|| "localhost".to_string());

    // Setup TLS with persistent certificates
    let use_tls = !args.no_tls;
    let (tls_config, cert_fingerprint) = if use_tls {
        let (cert_pem, key_pem, fingerprint) = match (&args.cert, &args.key) {
            (Some(cert_path), Some(key_path)) => {
                info!("Loading TLS certificate from files...");
                let cert = std::fs::read_to_string(cert_path)?;
                let key = std::fs::read_to_string(key_path)?;
                let fp = calculate_cert_fingerprint(&cert);
                (cert, key, fp)
            }
            _ => {
                info!("Using persistent certificate storage...");
                let cert_manager = CertificateManager::new()?;
                let hostnames = vec![local_ip.clone(), "localhost".to_string()];
                cert_manager.load_or_generate(&hostnames)?
            }
        };

        let rustls = create_rustls_config(&cert_pem, &key_pem).await?;
        (Some(rustls), Some(fingerprint))
    } else {
        (None, None)
    };

    // Wire the registries and orchestrator
    let signer = TokenSigner::new(config.signing_secret.clone(), config.token_ttl());
    let credentials = Arc::new(CredentialStore::new(accounts.clone(), signer));
    let devices = Arc::new(DeviceRegistry::new(device_storage, credentials.clone()));
    let sessions = Arc::new(SessionRegistry::new(config.pairing_ttl()));
    let channels = Arc::new(ChannelManager::new());
    let orchestrator = Arc::new(PairingOrchestrator::new(
        sessions.clone(),
        devices.clone(),
        channels.clone(),
    ));

    let state = Arc::new(AppState::new(
        config.clone(),
        credentials,
        sessions,
        devices,
        channels,
        orchestrator,
        cert_fingerprint.clone(),
    ));
    let router = create_router(state);

    let protocol = if use_tls { "https" } else { "http" };
    let server_url = format!("{}://{}:{}", protocol, local_ip, config.port);

    info!("Starting server on port {}...", config.port);
    info!("");
    info!("  Access URL: {}", server_url);
    if let Some(ref fp) = cert_fingerprint {
        info!("  Cert fingerprint: {}...", &fp[..23]);
        info!("");
        info!("  NOTE: You may need to accept the self-signed certificate in your browser.");
    }
    info!("  {} account(s) registered", accounts.account_count().await);
    info!("");
    info!(
        "  Pairing sessions expire after {} seconds.",
        config.pairing_ttl_secs
    );
    info!("");
    info!("Press Ctrl+C to stop.");
    info!("");

    // Run server with graceful shutdown
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));

    if let Some(tls_config) = tls_config {
        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();

        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
            shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;
    } else {
        let shutdown = async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        };

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
    }

    info!("Goodbye!");
    Ok(())
}

/// Get the local IP address
fn get_local_ip() -> Option<String> {
    use std::net::UdpSocket;

    // Connecting a UDP socket sends no packets but resolves the local
    // address the OS would route through
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    Some(addr.ip().to_string())
}
