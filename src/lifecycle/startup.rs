//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect to the init system and open the kernel journal
//! - Create the control endpoint and bind the metrics listener
//! - Spawn every task in dependency order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Collaborators are injected so the whole engine runs against fakes

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::actuator::{restart_queue, Actuator};
use crate::backends::{
    DockerCompose, InitSystem, Journal, JournalCtl, LogTailer, Restarter, Systemd,
};
use crate::config::{ActuatorBackend, WatchdogConfig};
use crate::error::StartupError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{bind_metrics, metric_sink, serve_metrics};
use crate::sources::{
    ControlEndpoint, ControlHandler, FailureSignatures, FaultDetector, KernelWatcher, LogWatcher,
};

/// How long tasks get to finish after shutdown is triggered.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// The external collaborators every task talks to.
pub struct Collaborators {
    pub tailer: Arc<dyn LogTailer>,
    pub restarter: Arc<dyn Restarter>,
    /// Required when the kernel watcher is enabled.
    pub journal: Option<Box<dyn Journal>>,
    /// Required when the kernel watcher is enabled.
    pub init: Option<Arc<dyn InitSystem>>,
}

impl Collaborators {
    /// Production collaborators: docker compose, journalctl and systemd.
    pub async fn connect(config: &WatchdogConfig) -> Result<Self, StartupError> {
        let compose = Arc::new(DockerCompose::new(
            config.compose.project_dir.clone(),
            config.log_watch.tail_lines,
        ));

        let needs_systemd =
            config.kernel.enabled || config.actuator.backend == ActuatorBackend::Systemd;
        let systemd = if needs_systemd {
            Some(Arc::new(
                Systemd::connect(config.actuator.unit_suffix.clone())
                    .await
                    .map_err(StartupError::InitSystem)?,
            ))
        } else {
            None
        };

        let restarter: Arc<dyn Restarter> = match (config.actuator.backend, &systemd) {
            (ActuatorBackend::Systemd, Some(systemd)) => systemd.clone(),
            _ => compose.clone(),
        };

        let journal: Option<Box<dyn Journal>> = if config.kernel.enabled {
            Some(Box::new(
                JournalCtl::open(config.kernel.replay_last).map_err(StartupError::Journal)?,
            ))
        } else {
            None
        };

        let init = if config.kernel.enabled {
            systemd.map(|s| s as Arc<dyn InitSystem>)
        } else {
            None
        };

        Ok(Self {
            tailer: compose,
            restarter,
            journal,
            init,
        })
    }
}

/// A running watchdog.
pub struct Watchdog {
    shutdown: Shutdown,
    /// Subscribed at startup so a trigger before `wait` is still seen.
    shutdown_rx: broadcast::Receiver<()>,
    tasks: JoinSet<()>,
    metrics: PrometheusHandle,
    metrics_addr: Option<SocketAddr>,
}

/// Wire up and spawn every task.
pub async fn start(
    config: WatchdogConfig,
    collaborators: Collaborators,
) -> Result<Watchdog, StartupError> {
    let services = config.service_set().ok_or(StartupError::NoServices)?;
    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let mut tasks = JoinSet::new();

    let (queue, queue_rx) = restart_queue(config.actuator.queue_capacity);
    let (sink, metrics_worker, metrics_handle) = metric_sink();

    // Endpoints that can fail are created before anything is spawned.
    let control = match &config.control.path {
        Some(path) => {
            let handler = ControlHandler::new(
                services.clone(),
                queue.clone(),
                sink.clone(),
                config.metrics.manual_reason,
            );
            Some(ControlEndpoint::create(path.clone(), config.control.kind, handler)?)
        }
        None => None,
    };

    let metrics_listener = match config.metrics.listen_addr() {
        Some(addr) => Some(
            bind_metrics(addr)
                .await
                .map_err(|source| StartupError::MetricsBind { addr, source })?,
        ),
        None => {
            tracing::info!("Metrics endpoint disabled");
            None
        }
    };
    let metrics_addr = metrics_listener
        .as_ref()
        .and_then(|listener| listener.local_addr().ok());

    tasks.spawn(metrics_worker.run(shutdown.subscribe()));
    if let Some(listener) = metrics_listener {
        let handle = metrics_handle.clone();
        let rx = shutdown.subscribe();
        tasks.spawn(async move {
            if let Err(e) = serve_metrics(listener, handle, rx).await {
                tracing::error!(error = %e, "Metrics endpoint failed");
            }
        });
    }

    tasks.spawn(Actuator::new(queue_rx, collaborators.restarter).run(shutdown.subscribe()));

    if config.log_watch.enabled {
        let signatures = FailureSignatures::new(config.log_watch.failure_signatures.iter().cloned());
        let watched = if config.log_watch.primary_only {
            &services.as_slice()[..1]
        } else {
            services.as_slice()
        };

        for service in watched {
            let watcher = LogWatcher::new(
                service.name.clone(),
                collaborators.tailer.clone(),
                signatures.clone(),
                queue.clone(),
                sink.clone(),
                config.log_watch.reconnect_delay(),
            );
            tasks.spawn(watcher.run(shutdown.subscribe()));
        }
    }

    if let Some(control) = control {
        tasks.spawn(control.run(shutdown.subscribe()));
    }

    if config.kernel.enabled {
        match (collaborators.journal, collaborators.init, config.primary_unit()) {
            (Some(journal), Some(init), Some(unit)) => {
                let watcher = KernelWatcher::new(
                    journal,
                    init,
                    services.clone(),
                    unit,
                    FaultDetector::new(
                        config.kernel.fault_marker.clone(),
                        config.kernel.runtime_token.clone(),
                    ),
                    queue.clone(),
                    sink.clone(),
                );
                tasks.spawn(watcher.run(shutdown.subscribe()));
            }
            _ => tracing::warn!("Kernel watching enabled but no journal or init system supplied"),
        }
    }

    tracing::info!(
        primary = %services.primary().name,
        auxiliaries = services.auxiliaries().len(),
        tasks = tasks.len(),
        "Watchdog started"
    );

    Ok(Watchdog {
        shutdown,
        shutdown_rx,
        tasks,
        metrics: metrics_handle,
        metrics_addr,
    })
}

impl Watchdog {
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Read-only view of the restart counters.
    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    /// Address the metrics endpoint actually bound, if enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Run until shutdown is triggered, then drain tasks.
    pub async fn wait(mut self) {
        let _ = self.shutdown_rx.recv().await;
        self.stop().await;
    }

    /// Trigger shutdown and wait for tasks, aborting stragglers after the
    /// deadline.
    pub async fn stop(mut self) {
        self.shutdown.trigger();

        let drained = tokio::time::timeout(SHUTDOWN_DEADLINE, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = self.tasks.len(), "Shutdown deadline passed, aborting tasks");
            self.tasks.abort_all();
        }
    }
}
