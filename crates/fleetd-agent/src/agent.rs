//! Agent driver loop
//!
//! One cycle per heartbeat interval: evaluate runtime readiness,
//! collect a snapshot, register with the control plane if needed, then
//! heartbeat. The exposition server runs concurrently and shares the
//! collector, so scrapes and cycles see the same rate state.

use crate::collector::MetricsCollector;
use crate::config::AgentConfig;
use crate::control_plane::ControlPlaneClient;
use crate::events::EventLog;
use crate::exposition::{ExpositionServer, ExpositionState};
use crate::Result;
use fleetd_core::{CredentialStore, WorkerIdentity};
use fleetd_runtime::RuntimeClient;
use fleetd_telemetry::{GpuSampler, RateTracker};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The fleetd sidecar agent.
pub struct Agent {
    config: AgentConfig,
    identity: WorkerIdentity,
    credentials: Arc<CredentialStore>,
    runtime: Arc<RuntimeClient>,
    collector: Arc<MetricsCollector>,
    control_plane: ControlPlaneClient,
    events: Arc<EventLog>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Agent {
    /// Build an agent from configuration.
    pub async fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let identity = config.identity();
        let credentials = Arc::new(config.credential_store());

        // A corrupt or unreadable token file should not keep the agent
        // down; it can still bootstrap a fresh credential.
        if let Err(e) = credentials.load_from_file() {
            warn!("could not load worker auth token file: {}", e);
        }

        let runtime = Arc::new(RuntimeClient::new(config.runtime_client_config())?);
        let collector = Arc::new(MetricsCollector::new(
            config.disk_path.clone(),
            Arc::new(RateTracker::new()),
            GpuSampler::new(config.gpu_sampler_config()),
            runtime.clone(),
        ));
        let control_plane = ControlPlaneClient::new(
            config.control_plane_config(),
            identity.clone(),
            credentials.clone(),
        )?;

        Ok(Self {
            config,
            identity,
            credentials,
            runtime,
            collector,
            control_plane,
            events: Arc::new(EventLog::default()),
            started_at: chrono::Utc::now(),
        })
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn control_plane(&self) -> &ControlPlaneClient {
        &self.control_plane
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    fn exposition_state(&self) -> Arc<ExpositionState> {
        Arc::new(ExpositionState {
            collector: self.collector.clone(),
            runtime: self.runtime.clone(),
            identity: self.identity.clone(),
            events: self.events.clone(),
            started_at: self.started_at,
        })
    }

    /// Run the agent until a shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.config.health_port).into();
        let mut server = ExpositionServer::new(self.exposition_state(), bind_addr);
        server.start().await?;

        self.events.push(format!(
            "agent started, health endpoints on :{}",
            self.config.health_port
        ));
        if !self.control_plane.enabled() {
            info!("control plane disabled, running collection and exposition only");
        }

        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                _ = &mut shutdown => {
                    info!("interrupt received, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                    break;
                }
            }
        }

        self.events.push("agent stopping".to_string());
        server.stop().await;
        Ok(())
    }

    /// Execute one readiness/collection/registration/heartbeat cycle.
    pub async fn cycle(&self) {
        let readiness = self.runtime.check_ready().await;
        let snapshot = self.collector.collect().await;
        let status = readiness.status();

        let mut heartbeat_ok = false;
        if self.control_plane.enabled() {
            if !self.control_plane.is_registered() {
                match self.control_plane.register(&snapshot).await {
                    Ok(()) => {
                        self.events.push(format!(
                            "registered worker {} with control plane",
                            self.identity.worker_id
                        ));
                    }
                    Err(e) => {
                        warn!("registration failed: {}", e);
                        self.events.push(format!("registration failed: {}", e));
                    }
                }
            }

            if self.control_plane.should_heartbeat() {
                match self.control_plane.heartbeat(status, &snapshot).await {
                    Ok(()) => heartbeat_ok = true,
                    Err(e) => warn!("heartbeat failed: {}", e),
                }
            } else {
                debug!("skipping heartbeat, no credential and not registered");
            }
        }

        let queue_depth = snapshot
            .queue_depth()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        self.events.push(format!(
            "cycle status={} registered={} heartbeat_ok={} queue_depth={}",
            status,
            self.control_plane.is_registered(),
            heartbeat_ok,
            queue_depth
        ));

        debug!(
            status,
            registered = self.control_plane.is_registered(),
            heartbeat_ok,
            gpu_utilization = snapshot.gpu_utilization(),
            "cycle complete"
        );
    }
}
