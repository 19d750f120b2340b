//! Fleetgate Hub
//!
//! Device identity and access control for a fleet of legacy appliances:
//! HTTP API, machine directory, account store and audit trail.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use fleetgate_core::config::{
    AppConfig, AuthConfig, DEV_JWT_SECRET, DEV_SERVICE_TOKEN, GeoConfig,
};
use fleetgate_core::tracing_init::init_tracing;

use fleetgate_hub::audit::AuditRecorder;
use fleetgate_hub::auth::TokenAuthority;
use fleetgate_hub::directory::geo::IpApiProvider;
use fleetgate_hub::directory::{GatewayRegistry, GeoEnricher, JsonSnapshotStore, MachineDirectory};
use fleetgate_hub::gate::AccessGate;
use fleetgate_hub::linking::LinkResolver;
use fleetgate_hub::server::{AppState, build_router};
use fleetgate_hub::storage::HubDatabase;
use fleetgate_hub::telemetry::TelemetrySink;

#[derive(Parser, Debug)]
#[command(name = "fleetgate-hub")]
#[command(version, about = "Fleetgate hub - device identity and access control")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "FLEETGATE_ADDR")]
    addr: SocketAddr,

    /// Path to the SQLite database file.
    #[arg(long, env = "FLEETGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to the machine directory snapshot file.
    #[arg(long, env = "FLEETGATE_SNAPSHOT_PATH")]
    snapshot_path: Option<PathBuf>,

    /// Static service token for first-party callers.
    #[arg(
        long,
        env = "FLEETGATE_SERVICE_TOKEN",
        default_value = DEV_SERVICE_TOKEN
    )]
    service_token: String,

    /// Session-token signing secret.
    #[arg(long, env = "FLEETGATE_JWT_SECRET", default_value = DEV_JWT_SECRET)]
    jwt_secret: String,

    /// Issuer claim for session tokens.
    #[arg(long, default_value = "fleetgate")]
    jwt_issuer: String,

    /// Session token TTL in seconds.
    #[arg(long, default_value_t = 86_400)]
    session_ttl: i64,

    /// Refuse to start with development fallback secrets.
    #[arg(long, env = "FLEETGATE_PRODUCTION")]
    production: bool,

    /// Disable geolocation enrichment of machine connections.
    #[arg(long)]
    no_geo: bool,

    /// Geolocation lookup endpoint.
    #[arg(long, default_value = "http://ip-api.com/json")]
    geo_endpoint: String,

    /// Pacing delay between geolocation lookups, in seconds.
    #[arg(long, default_value_t = 1)]
    geo_delay: u64,

    /// Capacity of the geolocation job queue.
    #[arg(long, default_value_t = 64)]
    geo_queue: usize,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> AppConfig {
        AppConfig {
            listen_addr: self.addr,
            database_path: self.db_path,
            snapshot_path: self.snapshot_path,
            production: self.production,
            auth: AuthConfig {
                service_token: self.service_token,
                jwt_secret: self.jwt_secret,
                jwt_issuer: self.jwt_issuer,
                session_ttl_secs: self.session_ttl,
            },
            geo: GeoConfig {
                enabled: !self.no_geo,
                endpoint: self.geo_endpoint,
                startup_delay_secs: self.geo_delay,
                queue_capacity: self.geo_queue,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_json = args.log_json;
    let config = args.into_config();

    init_tracing("fleetgate_hub=info", log_json);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        "Starting fleetgate-hub"
    );
    if config.auth.jwt_secret == DEV_JWT_SECRET {
        warn!("JWT secret not configured, using the insecure development fallback");
    }
    if config.auth.service_token == DEV_SERVICE_TOKEN {
        warn!("Service token not configured, using the insecure development fallback");
    }

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => default_state_path("hub.db")?,
    };
    info!(path = %db_path.display(), "Opening hub database");
    let db = HubDatabase::open(&db_path).await?;

    let (geo_tx, geo_rx) = if config.geo.enabled {
        let (tx, rx) = mpsc::channel(config.geo.queue_capacity);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let snapshot_path = match &config.snapshot_path {
        Some(path) => path.clone(),
        None => default_state_path("machines.json")?,
    };
    info!(path = %snapshot_path.display(), "Loading machine directory");
    let directory = Arc::new(
        MachineDirectory::load(Box::new(JsonSnapshotStore::new(snapshot_path)), geo_tx).await?,
    );

    let enricher = match geo_rx {
        Some(rx) => {
            let provider = Arc::new(IpApiProvider::new(&config.geo.endpoint)?);
            Some(GeoEnricher::spawn(
                rx,
                Arc::clone(&directory),
                provider,
                Duration::from_secs(config.geo.startup_delay_secs),
            ))
        }
        None => None,
    };

    let gateways = GatewayRegistry::new();
    let state = AppState {
        gate: Arc::new(AccessGate::new(Arc::clone(&directory))),
        links: Arc::new(LinkResolver::new(Arc::clone(&directory), gateways.clone())),
        audit: AuditRecorder::new(db.clone()),
        telemetry: TelemetrySink::new(),
        authority: Arc::new(TokenAuthority::new(&config.auth)),
        directory,
        gateways,
        db,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Hub listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server.into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    if let Some(enricher) = enricher {
        enricher.shutdown().await;
    }

    info!("Hub stopped");
    Ok(())
}

fn default_state_path(file: &str) -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".fleetgate").join(file))
}
