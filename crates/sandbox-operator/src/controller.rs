//! User Controller
//!
//! This module wires the [`Reconciler`] into the kube-rs controller runtime.
//! The runtime watches Users plus the sandbox namespaces they own, dedupes
//! identities per key and schedules retries according to [`error_policy`].

use crate::error::{OperatorError, Result};
use crate::reconciler::{Outcome, Reconciler};
use crate::resources::SandboxSettings;
use crate::store::KubeStore;
use crate::user::User;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config};
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, instrument, warn};

/// Base delay for the first retry after an error
const DEFAULT_RETRY_BASE_SECONDS: u64 = 5;

/// Maximum retry delay
const DEFAULT_RETRY_MAX_SECONDS: u64 = 300;

/// Upper bound for a single reconciliation pass
const DEFAULT_RECONCILE_TIMEOUT_SECONDS: u64 = 30;

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of Users reconciled in parallel
    pub concurrency: u16,
    /// Deadline applied to each reconciliation pass
    pub reconcile_timeout: Duration,
    /// First retry delay
    pub retry_base: Duration,
    /// Retry delay cap
    pub retry_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECONDS),
            retry_base: Duration::from_secs(DEFAULT_RETRY_BASE_SECONDS),
            retry_max: Duration::from_secs(DEFAULT_RETRY_MAX_SECONDS),
        }
    }
}

/// Context passed to the controller
pub struct ControllerContext {
    /// User reconciler
    pub reconciler: Reconciler<KubeStore>,
    /// Per-user retry state
    pub backoff: RetryBackoff,
    /// Deadline for one pass
    pub reconcile_timeout: Duration,
    /// Metrics recorder (optional)
    pub metrics: Option<ControllerMetrics>,
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
    /// Counter for sandboxes created
    pub namespaces_created: metrics::Counter,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("sandbox_operator_reconciliations_total"),
            errors: metrics::counter!("sandbox_operator_reconciliation_errors_total"),
            duration: metrics::histogram!("sandbox_operator_reconciliation_duration_seconds"),
            namespaces_created: metrics::counter!("sandbox_operator_namespaces_created_total"),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential retry delays tracked per User
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    attempts: DashMap<String, u32>,
}

impl RetryBackoff {
    /// Create a backoff starting at `base` and capped at `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempts: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    ///
    /// Delays double from the base up to the cap. Errors that need human
    /// action wait the full cap straight away.
    pub fn next_delay(&self, key: &str, error: &OperatorError) -> Duration {
        let attempts = {
            let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        if !error.is_retryable() {
            return self.max;
        }

        let exponent = attempts.saturating_sub(1).min(16);
        self.base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max)
    }

    /// Forget the failures recorded for `key`
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Failures recorded for `key` since the last reset
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).map(|a| *a).unwrap_or(0)
    }
}

/// Start the User controller
pub async fn run_controller(
    client: Client,
    config: ControllerConfig,
    settings: SandboxSettings,
) -> Result<()> {
    let users: Api<User> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespace_watch = Config::default().labels(&settings.label_selector());

    let reconciler = Reconciler::new(
        KubeStore::new(client),
        settings,
        info_span!("user_controller"),
    );

    let ctx = Arc::new(ControllerContext {
        reconciler,
        backoff: RetryBackoff::new(config.retry_base, config.retry_max),
        reconcile_timeout: config.reconcile_timeout,
        metrics: Some(ControllerMetrics::new()),
    });

    info!(
        concurrency = config.concurrency,
        suffix = %ctx.reconciler.settings().namespace_suffix,
        "Starting User controller"
    );

    Controller::new(users, Config::default())
        .owns(namespaces, namespace_watch)
        .with_config(controller::Config::default().concurrency(config.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| {
            let ctx = ctx.clone();
            async move { record_result(&ctx.backoff, result) }
        })
        .await;

    info!("User controller stopped");
    Ok(())
}

type ControllerResult = std::result::Result<
    (ObjectRef<User>, Action),
    controller::Error<OperatorError, watcher::Error>,
>;

/// Log a reconciliation result and drop retry state for Users that are done
fn record_result(backoff: &RetryBackoff, result: ControllerResult) {
    match result {
        Ok((obj, action)) => {
            backoff.reset(&obj.name);
            debug!(name = %obj.name, ?action, "Reconciliation completed");
        }
        Err(controller::Error::ObjectNotFound(obj)) => {
            backoff.reset(&obj.name);
            debug!(name = %obj.name, "User gone before reconciliation");
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
        }
    }
}

/// Runtime entry point for one User
#[instrument(skip(user, ctx), fields(name = %user.name_any()))]
async fn reconcile(user: Arc<User>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = Instant::now();

    if let Some(ref metrics) = ctx.metrics {
        metrics.reconciliations.increment(1);
    }

    let identity = ObjectRef::from_obj(user.as_ref());
    let result = tokio::time::timeout(ctx.reconcile_timeout, ctx.reconciler.reconcile(&identity))
        .await
        .unwrap_or_else(|_| {
            Err(OperatorError::Timeout(format!(
                "reconciling User '{}' exceeded {:?}",
                identity.name, ctx.reconcile_timeout
            )))
        });

    if let Some(ref metrics) = ctx.metrics {
        metrics.duration.record(start.elapsed().as_secs_f64());
        match &result {
            Ok(Outcome::Provisioned { .. }) => metrics.namespaces_created.increment(1),
            Ok(_) => {}
            Err(_) => metrics.errors.increment(1),
        }
    }

    result.map(Action::from)
}

/// Error policy for the controller: per-user exponential backoff
fn error_policy(user: Arc<User>, error: &OperatorError, ctx: Arc<ControllerContext>) -> Action {
    let key = user.name_any();
    let delay = ctx.backoff.next_delay(&key, error);

    warn!(
        error = %error,
        retry = ctx.backoff.attempts(&key),
        delay_secs = delay.as_secs(),
        "Reconciliation error for User '{}', will retry",
        key
    );

    Action::requeue(delay)
}
