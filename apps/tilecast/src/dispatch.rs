//! Run orchestration: plans one job per shard, runs a [`BatchStreamer`] for
//! each on its own task, and tracks open connections so a stop request can
//! tear everything down.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tile_proto::Edit;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ImageRender, RunConfig};
use crate::error::{ConfigError, DispatchError};
use crate::partition::{partition, partition_blocks, Region};
use crate::progress::{ProgressEvent, Reporter, RunStatus, ShardLabel};
use crate::proxy::{load_proxy_list, Proxy};
use crate::render::{encode_region, EncodeOptions};
use crate::source::Source;
use crate::stream::{BatchStreamer, StreamOutcome, StreamSettings};
use crate::transport::{Connector, WebSocketConnector};

#[derive(Debug, Clone)]
pub struct OpenConnection {
    pub label: ShardLabel,
    closer: CancellationToken,
}

/// Connections currently owned by workers. Each entry carries a token that
/// interrupts that worker's connect, send or delay.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    open: DashMap<Uuid, OpenConnection>,
}

impl ConnectionRegistry {
    pub fn register(self: &Arc<Self>, label: ShardLabel, closer: CancellationToken) -> ConnectionLease {
        let id = Uuid::new_v4();
        debug!(%id, shard = label.index, "connection registered");
        self.open.insert(id, OpenConnection { label, closer });
        ConnectionLease {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn labels(&self) -> Vec<ShardLabel> {
        let mut labels: Vec<ShardLabel> =
            self.open.iter().map(|entry| entry.label.clone()).collect();
        labels.sort_by_key(|label| label.index);
        labels
    }

    /// Signals every registered connection to close. Returns how many were
    /// signalled.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.open.iter() {
            entry.closer.cancel();
            closed += 1;
        }
        closed
    }
}

/// Removes its connection from the registry when dropped.
#[derive(Debug)]
pub struct ConnectionLease {
    registry: Arc<ConnectionRegistry>,
    id: Uuid,
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.registry.open.remove(&self.id).is_some() {
            debug!(id = %self.id, "connection unregistered");
        }
    }
}

/// Work for one worker: its edits and, for proxied shards, its proxy.
#[derive(Debug, Clone)]
pub struct ShardJob {
    pub label: ShardLabel,
    pub proxy: Option<Proxy>,
    pub edits: Vec<Edit>,
}

#[derive(Debug)]
pub struct ShardReport {
    pub label: ShardLabel,
    pub outcome: StreamOutcome,
}

#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub shards: Vec<ShardReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn chunks_sent(&self) -> u64 {
        self.shards.iter().map(|shard| shard.outcome.chunks_sent()).sum()
    }
}

fn regions(source: &Source, render: ImageRender, shards: usize) -> Vec<Region> {
    match (source, render) {
        (Source::Image(grid), ImageRender::Quadrant) => {
            partition_blocks(grid.width(), grid.height(), shards).regions
        }
        _ => partition(source.height(), shards),
    }
}

/// Splits the source into jobs. Sharded modes pair region `i` with proxy
/// `i`; proxies beyond the region count stay idle.
pub fn plan(config: &RunConfig, source: &Source, proxies: &[Proxy]) -> Vec<ShardJob> {
    let options = EncodeOptions::from_config(config);
    if !config.mode.is_sharded() {
        return regions(source, config.image_render, 1)
            .iter()
            .map(|region| ShardJob {
                label: ShardLabel::new(0, None),
                proxy: config.proxy.clone(),
                edits: encode_region(source, config.image_render, region, &options),
            })
            .collect();
    }

    regions(source, config.image_render, proxies.len())
        .iter()
        .zip(proxies)
        .enumerate()
        .map(|(index, (region, proxy))| ShardJob {
            label: ShardLabel::new(index, Some(proxy.to_string())),
            proxy: Some(proxy.clone()),
            edits: encode_region(source, config.image_render, region, &options),
        })
        .collect()
}

/// Owns run state: at most one run at a time, stoppable from any task.
///
/// Every run token is a child of `shutdown`, so once [`Dispatcher::shutdown`]
/// has been called no later run can start streaming.
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    registry: Arc<ConnectionRegistry>,
    active: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
    reporter: Reporter,
}

struct ActiveRun<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

impl Dispatcher {
    pub fn new(reporter: Reporter) -> Self {
        Self::with_connector(Arc::new(WebSocketConnector), reporter)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, reporter: Reporter) -> Self {
        Self {
            connector,
            registry: Arc::new(ConnectionRegistry::default()),
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
            reporter,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn open_connections(&self) -> Vec<ShardLabel> {
        self.registry.labels()
    }

    /// Cancels the active run and force-closes its connections. Returns
    /// `false` when there was nothing to stop.
    pub fn stop(&self) -> bool {
        let token = self.active.lock().clone();
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                let closed = self.registry.close_all();
                info!(closed, "stop requested");
                true
            }
            _ => false,
        }
    }

    /// Stops the active run, if any, and makes every later run end as
    /// stopped before it connects. Used when the whole process is exiting.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        info!(closed, "shutdown requested");
    }

    /// Validates `config`, loads proxies and source, then streams. The run
    /// counts as active from the start, so a stop while the source is still
    /// loading prevents any connection.
    pub async fn run(&self, config: &RunConfig) -> Result<RunReport, DispatchError> {
        let (cancel, _active) = self.begin()?;
        config.validate()?;
        let proxies = self.load_proxies(config)?;
        let source = Source::load(
            config.mode.source_kind(),
            &config.source,
            config.aspect_correction,
        )?;
        self.execute(config, &source, &proxies, &cancel).await
    }

    fn load_proxies(&self, config: &RunConfig) -> Result<Vec<Proxy>, ConfigError> {
        if !config.mode.is_sharded() {
            return Ok(Vec::new());
        }
        let path = config
            .proxy_list
            .as_ref()
            .ok_or(ConfigError::MissingProxyList { mode: config.mode })?;
        let list = load_proxy_list(path).map_err(|source| ConfigError::ProxyListRead {
            path: path.clone(),
            source,
        })?;
        for rejected in &list.rejected {
            self.reporter.emit(ProgressEvent::Notice(format!(
                "Skipping proxy line {}: {} ({})",
                rejected.line, rejected.text, rejected.error
            )));
        }
        if list.proxies.is_empty() {
            return Err(ConfigError::EmptyProxyList(path.clone()));
        }
        Ok(list.proxies)
    }

    fn begin(&self) -> Result<(CancellationToken, ActiveRun<'_>), DispatchError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(DispatchError::AlreadyRunning);
        }
        let token = self.shutdown.child_token();
        *active = Some(token.clone());
        Ok((token, ActiveRun { slot: &self.active }))
    }

    /// Streams an already loaded source. Sharded modes need at least one
    /// proxy.
    pub async fn dispatch(
        &self,
        config: &RunConfig,
        source: &Source,
        proxies: &[Proxy],
    ) -> Result<RunReport, DispatchError> {
        let (cancel, _active) = self.begin()?;
        self.execute(config, source, proxies, &cancel).await
    }

    async fn execute(
        &self,
        config: &RunConfig,
        source: &Source,
        proxies: &[Proxy],
        cancel: &CancellationToken,
    ) -> Result<RunReport, DispatchError> {
        if config.mode.is_sharded() && proxies.is_empty() {
            return Err(ConfigError::EmptyProxyList(config.proxy_list.clone().unwrap_or_default()).into());
        }

        self.reporter.emit(ProgressEvent::RunStarted);
        for line in config.summary() {
            self.reporter.emit(ProgressEvent::Setting(line));
        }

        let jobs = plan(config, source, proxies);
        if config.mode.is_sharded() {
            if jobs.len() < proxies.len() {
                self.reporter.emit(ProgressEvent::Notice(format!(
                    "Using {} of {} proxies for a small image",
                    jobs.len(),
                    proxies.len()
                )));
            }
        } else {
            self.reporter.emit(ProgressEvent::Notice(match &config.proxy {
                Some(proxy) => format!("Using proxy: {proxy}"),
                None => "Using direct connection (no proxy)".to_string(),
            }));
        }
        info!(mode = %config.mode, shards = jobs.len(), "dispatching");

        let settings = StreamSettings::from_config(config);
        let jobs = if cancel.is_cancelled() {
            info!("stopped before streaming");
            Vec::new()
        } else {
            jobs
        };
        let mut workers = JoinSet::new();
        for job in jobs {
            let connector = Arc::clone(&self.connector);
            let registry = Arc::clone(&self.registry);
            let reporter = self.reporter.clone();
            let url = config.server_url.clone();
            let token = cancel.child_token();
            workers.spawn(async move {
                let _lease = registry.register(job.label.clone(), token.clone());
                let mut streamer = BatchStreamer::new(settings, job.label.clone(), reporter.clone());
                let outcome = streamer
                    .run(connector.as_ref(), &url, job.proxy.as_ref(), &job.edits, &token)
                    .await;
                if let StreamOutcome::Failed { error, .. } = &outcome {
                    reporter.emit(ProgressEvent::ShardFailed {
                        shard: job.label.clone(),
                        error: error.to_string(),
                    });
                }
                ShardReport {
                    label: job.label,
                    outcome,
                }
            });
        }

        let mut shards = Vec::new();
        let mut lost_workers = 0usize;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => shards.push(report),
                Err(err) => {
                    warn!(error = %err, "worker task ended abnormally");
                    lost_workers += 1;
                }
            }
        }
        shards.sort_by_key(|report| report.label.index);

        if config.mode.is_sharded() {
            self.reporter.emit(ProgressEvent::AllShardsFinished);
        }
        let status = if cancel.is_cancelled() {
            RunStatus::Stopped
        } else if lost_workers > 0 || shards.iter().any(|s| !s.outcome.is_completed()) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.reporter.emit(ProgressEvent::RunFinished { status });
        Ok(RunReport { status, shards })
    }
}
