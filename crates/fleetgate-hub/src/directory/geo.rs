//! Geolocation enrichment.
//!
//! Connection recording pushes lookup jobs onto a bounded queue; one worker
//! paces them (the public endpoint is rate-limited), resolves the IP without
//! holding any directory lock, and takes the lock only to write the result
//! back. The worker's lifetime is owned by the process: `main` spawns it next
//! to the listener and drains it on shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::MachineDirectory;

/// A queued lookup: which machine, and the IP it connected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoJob {
    pub composite_key: String,
    pub ip: String,
}

/// Geolocation lookup errors.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Resolves an IP address to a human-readable location string.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<String, GeoError>;
}

/// The ip-api.com JSON endpoint.
pub struct IpApiProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl IpApiProvider {
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        // Ensure a TLS crypto provider is installed (reqwest uses
        // rustls-no-provider). `Err` just means one already was.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    isp: String,
}

#[async_trait]
impl GeoProvider for IpApiProvider {
    async fn lookup(&self, ip: &str) -> Result<String, GeoError> {
        let url = format!("{}/{ip}", self.endpoint);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let body: IpApiResponse = response.json().await?;

        if body.status != "success" {
            return Err(GeoError::Lookup(format!(
                "provider returned status {:?} for {ip}",
                body.status
            )));
        }
        Ok(format!("{}, {} ({})", body.city, body.country, body.isp))
    }
}

/// Handle to the running enrichment worker.
pub struct GeoEnricher {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl GeoEnricher {
    /// Spawn the worker on the current runtime.
    ///
    /// `delay` is the pacing delay applied before each lookup.
    pub fn spawn(
        jobs: mpsc::Receiver<GeoJob>,
        directory: Arc<MachineDirectory>,
        provider: Arc<dyn GeoProvider>,
        delay: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker(jobs, directory, provider, delay, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Graceful stop: already-queued jobs are still processed (without the
    /// pacing delay), then the worker exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Geolocation worker ended abnormally");
        }
    }
}

async fn run_worker(
    mut jobs: mpsc::Receiver<GeoJob>,
    directory: Arc<MachineDirectory>,
    provider: Arc<dyn GeoProvider>,
    delay: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            // Drain the backlog without pacing, then stop.
            while let Ok(job) = jobs.try_recv() {
                process(&directory, provider.as_ref(), job).await;
            }
            break;
        }

        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else { break };
                if !*shutdown_rx.borrow() {
                    // Pace the lookup, unless shutdown interrupts the pause.
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
                process(&directory, provider.as_ref(), job).await;
            }
            _ = shutdown_rx.changed() => {}
        }
    }
    debug!("Geolocation worker stopped");
}

async fn process(directory: &MachineDirectory, provider: &dyn GeoProvider, job: GeoJob) {
    match provider.lookup(&job.ip).await {
        Ok(location) => directory.apply_geo(&job.composite_key, &location).await,
        // A failed lookup stays unenriched; the next qualifying connection
        // re-queues it.
        Err(e) => warn!(ip = %job.ip, error = %e, "Geolocation lookup failed"),
    }
}
