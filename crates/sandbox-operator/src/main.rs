//! Sandbox Kubernetes Operator
//!
//! Watches OpenShift Users and provisions a sandbox namespace with an admin
//! RoleBinding for each of them.

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use sandbox_operator::controller::{run_controller, ControllerConfig};
use sandbox_operator::resources::{
    SandboxResources, SandboxSettings, DEFAULT_ADMIN_CLUSTER_ROLE, DEFAULT_NAMESPACE_SUFFIX,
};
use sandbox_operator::user::User;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Sandbox Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "sandbox-operator")]
#[command(about = "Kubernetes operator provisioning a sandbox namespace per OpenShift user")]
#[command(version)]
struct Args {
    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health check address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Suffix appended to the lowercased user name
    #[arg(
        long,
        env = "NAMESPACE_SUFFIX",
        default_value = DEFAULT_NAMESPACE_SUFFIX,
        allow_hyphen_values = true
    )]
    namespace_suffix: String,

    /// ClusterRole granted to the user inside the sandbox
    #[arg(long, env = "ADMIN_CLUSTER_ROLE", default_value = DEFAULT_ADMIN_CLUSTER_ROLE)]
    admin_cluster_role: String,

    /// Recreate the admin RoleBinding when the sandbox namespace exists without it
    #[arg(long, env = "REPAIR_ROLE_BINDINGS", default_value = "false")]
    repair_role_bindings: bool,

    /// Number of Users reconciled in parallel
    #[arg(long, env = "CONCURRENCY", default_value = "4")]
    concurrency: u16,

    /// Deadline for a single reconciliation, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value = "30")]
    reconcile_timeout_secs: u64,

    /// First retry delay after a failed reconciliation, in seconds
    #[arg(long, env = "RETRY_BASE_SECS", default_value = "5")]
    retry_base_secs: u64,

    /// Maximum retry delay, in seconds
    #[arg(long, env = "RETRY_MAX_SECS", default_value = "300")]
    retry_max_secs: u64,

    /// Print the sandbox objects for the given user name as YAML and exit
    #[arg(long, value_name = "USER")]
    render: Option<String>,
}

impl Args {
    fn sandbox_settings(&self) -> SandboxSettings {
        SandboxSettings {
            namespace_suffix: self.namespace_suffix.clone(),
            admin_cluster_role: self.admin_cluster_role.clone(),
            repair_role_bindings: self.repair_role_bindings,
            ..Default::default()
        }
    }

    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            concurrency: self.concurrency,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            retry_base: Duration::from_secs(self.retry_base_secs),
            retry_max: Duration::from_secs(self.retry_max_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(ref user) = args.render {
        println!("{}", render(user, &args.sandbox_settings())?);
        return Ok(());
    }

    init_logging(&args);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        suffix = %args.namespace_suffix,
        cluster_role = %args.admin_cluster_role,
        repair = args.repair_role_bindings,
        "Starting Sandbox Kubernetes Operator"
    );

    let metrics_addr = args.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_addr).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    let health_addr = args.health_addr;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_addr).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    run_controller(client, args.controller_config(), args.sandbox_settings())
        .await
        .context("Controller failed")?;

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(args: &Args) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Render the sandbox objects for a user name as a multi-document YAML string
fn render(user_name: &str, settings: &SandboxSettings) -> Result<String> {
    let user = User::new(user_name, "");
    let desired = SandboxResources::for_user(&user, settings);

    let namespace = serde_yaml::to_string(&desired.namespace)?;
    let role_binding = serde_yaml::to_string(&desired.role_binding)?;
    Ok(format!("{namespace}---\n{role_binding}"))
}

/// Start the Prometheus metrics server
async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    info!(address = %addr, "Starting metrics server");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    std::future::pending::<()>().await;

    Ok(())
}

const HEALTH_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";

/// Start the health check server
async fn start_health_server(addr: SocketAddr) -> Result<()> {
    info!(address = %addr, "Starting health server");

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind health server")?;

    serve_health(listener).await
}

/// Answer every connection on `listener` with a plain `OK`
async fn serve_health(listener: TcpListener) -> Result<()> {
    loop {
        let (mut socket, peer) = listener.accept().await?;

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            if socket.read(&mut buf).await.is_ok() {
                if let Err(e) = socket.write_all(HEALTH_RESPONSE).await {
                    debug!(peer = %peer, error = %e, "Failed to write health response");
                }
            }
        });
    }
}
