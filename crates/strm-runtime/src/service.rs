//! Boundary contract: the only surface external callers (HTTP layer, jobs)
//! use. Everything here is a thin delegation to the engine components.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use strm_config::StreamConfig;
use strm_ledger::{GatewaySettings, LedgerClient, LedgerGateway};
use strm_lifecycle::{LifecycleEngine, LifecyclePolicy, PostCommit, StreamError};
use strm_progress::{calculate_progress, status_of, withdrawable_amount};
use strm_reconcile::{RecordRules, Reconciler, SyncReport};
use strm_schemas::{Amount, Clock, Progress, Stream, StreamEvent, StreamFilter, StreamSpec};
use strm_store::{StreamGuard, StreamRepository};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{spawn_reconcile_loop, ReconcileHealth};

/// Bounded event bus; slow subscribers observe `Lagged` and skip ahead.
const EVENT_BUS_CAPACITY: usize = 1024;

pub fn gateway_settings(cfg: &StreamConfig) -> GatewaySettings {
    GatewaySettings {
        request_timeout: cfg.ledger.request_timeout,
        confirm_attempts: cfg.ledger.confirm_attempts,
        confirm_backoff: cfg.ledger.confirm_backoff,
    }
}

/// Connect the gateway: readiness probe, then ready for use.
pub async fn init_ledger(
    client: Arc<dyn LedgerClient>,
    settings: GatewaySettings,
) -> Result<Arc<LedgerGateway>, StreamError> {
    let gw = LedgerGateway::connect(client, settings).await?;
    Ok(Arc::new(gw))
}

/// Reconciles each written record against the ledger before its gate is
/// released. Failures go to health; the write itself stands.
struct ReconcileAfterWrite {
    reconciler: Arc<Reconciler>,
    health: Arc<RwLock<ReconcileHealth>>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl PostCommit for ReconcileAfterWrite {
    async fn after_commit(&self, guard: &StreamGuard) {
        if let Err(e) = self.reconciler.reconcile_held(guard).await {
            let mut h = self.health.write().await;
            h.record_failure(self.clock.now(), &e);
            warn!(error = %e, consecutive_failures = h.consecutive_failures, "post-write reconcile failed; committed write kept");
        }
    }
}

pub struct StreamService {
    repo: Arc<StreamRepository>,
    gateway: Arc<LedgerGateway>,
    clock: Arc<dyn Clock>,
    engine: LifecycleEngine,
    reconciler: Arc<Reconciler>,
    events: broadcast::Sender<StreamEvent>,
    health: Arc<RwLock<ReconcileHealth>>,
    config: StreamConfig,
}

/// A started service with its periodic reconcile loop.
pub struct RunningService {
    pub service: Arc<StreamService>,
    pub reconcile_loop: JoinHandle<()>,
}

impl StreamService {
    /// Wire components around an already connected gateway. Does not sync.
    pub fn assemble(
        config: StreamConfig,
        gateway: Arc<LedgerGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repo = Arc::new(StreamRepository::new());
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let policy = LifecyclePolicy::from_config(&config);
        let rules = RecordRules::new(&policy.allowed_assets, policy.min_duration_secs);
        let reconciler = Arc::new(Reconciler::new(
            repo.clone(),
            gateway.clone(),
            clock.clone(),
            rules,
            config.reconcile.staleness_threshold_secs,
            events.clone(),
        ));
        let health = Arc::new(RwLock::new(ReconcileHealth::default()));
        let engine = LifecycleEngine::new(
            repo.clone(),
            gateway.clone(),
            clock.clone(),
            policy,
            events.clone(),
        )
        .with_post_commit(Arc::new(ReconcileAfterWrite {
            reconciler: reconciler.clone(),
            health: health.clone(),
            clock: clock.clone(),
        }));
        Self {
            repo,
            gateway,
            clock,
            engine,
            reconciler,
            events,
            health,
            config,
        }
    }

    /// Startup sequence: connect, initial sync (must succeed), ready.
    pub async fn start(
        config: StreamConfig,
        client: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let gateway = init_ledger(client, gateway_settings(&config))
            .await
            .context("ledger gateway init failed")?;
        let svc = Arc::new(Self::assemble(config, gateway, clock));

        let report = svc
            .sync_all()
            .await
            .context("initial reconcile failed; refusing to serve")?;
        info!(
            ledger_seq = report.ledger_seq,
            streams = svc.repo.len().await,
            "stream service ready"
        );
        Ok(svc)
    }

    /// [`start`](Self::start), then reconcile every `reconcile.interval_secs`.
    pub async fn serve(
        config: StreamConfig,
        client: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<RunningService> {
        let interval = config.reconcile.interval;
        let service = Self::start(config, client, clock).await?;
        let reconcile_loop = spawn_reconcile_loop(service.clone(), interval);
        info!(interval_secs = interval.as_secs(), "reconcile loop started");
        Ok(RunningService {
            service,
            reconcile_loop,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    // -- reads ---------------------------------------------------------------

    /// Streams matching `filter`, ordered by id. Status is derived at call time.
    pub async fn list_streams(&self, filter: Option<&StreamFilter>) -> Vec<Stream> {
        let Some(f) = filter else {
            return self.repo.list(|_| true).await;
        };
        let now = self.clock.now();
        self.repo
            .list(|s| f.matches_record(s) && f.status.map_or(true, |st| status_of(s, now) == st))
            .await
    }

    pub async fn get_stream(&self, id: &str) -> Option<Stream> {
        self.repo.get(id).await
    }

    pub fn calculate_progress(&self, stream: &Stream) -> Progress {
        calculate_progress(stream, self.clock.now())
    }

    pub fn withdrawable(&self, stream: &Stream) -> Amount {
        withdrawable_amount(stream, self.clock.now())
    }

    // -- writes --------------------------------------------------------------

    pub async fn create_stream(&self, spec: &StreamSpec) -> Result<Stream, StreamError> {
        self.engine.create(spec).await
    }

    /// `Ok(None)` for an unknown id.
    pub async fn cancel_stream(&self, id: &str) -> Result<Option<Stream>, StreamError> {
        match self.engine.cancel(id).await {
            Ok(s) => Ok(Some(s)),
            Err(StreamError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn reschedule_stream(
        &self,
        id: &str,
        new_start_at: i64,
    ) -> Result<Stream, StreamError> {
        self.engine.reschedule(id, new_start_at).await
    }

    pub async fn claim_stream(&self, id: &str, amount: Amount) -> Result<Stream, StreamError> {
        self.engine.claim(id, amount).await
    }

    // -- reconcile -----------------------------------------------------------

    /// One reconcile pass; the outcome is recorded in [`ReconcileHealth`].
    pub async fn sync_all(&self) -> Result<SyncReport, StreamError> {
        let res = self.reconciler.sync().await;
        let now = self.clock.now();
        let mut h = self.health.write().await;
        match res {
            Ok(report) => {
                h.record_success(now, &report);
                Ok(report)
            }
            Err(e) => {
                h.record_failure(now, &e);
                if e.is_transient() {
                    warn!(error = %e, consecutive_failures = h.consecutive_failures, "reconcile pass failed; will retry");
                } else {
                    error!(error = %e, consecutive_failures = h.consecutive_failures, "reconcile pass failed");
                }
                Err(e.into())
            }
        }
    }

    pub async fn health(&self) -> ReconcileHealth {
        self.health.read().await.clone()
    }

    // -- teardown ------------------------------------------------------------

    pub fn shutdown(&self) {
        self.gateway.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.gateway.is_closed()
    }
}
