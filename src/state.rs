use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::Config;
use crate::export::ReportExporter;
use crate::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionRegistry>,
    exporter: Option<Arc<ReportExporter>>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        let sessions = Arc::new(SessionRegistry::new(
            config.engine.to_engine_config(),
            config.limits.max_sessions,
            Duration::from_secs(config.limits.session_idle_ttl_secs),
        ));
        let exporter = config
            .export
            .enabled
            .then(|| Arc::new(ReportExporter::new(&config.export.report_dir)));

        Self {
            sessions,
            exporter,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn exporter(&self) -> Option<&ReportExporter> {
        self.exporter.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
