use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vela_core::config::{self, Config};
use vela_core::dispatch::{ConfigMapClusterIdentityCache, ResourceKeeper, SingleClusterClientFactory};
use vela_core::leader::LeaderElector;
use vela_core::metrics::{MetricsSink, TracingMetricsSink};
use vela_core::parser::ApplicationParser;
use vela_core::reconcile::{self, ReconcileContext};
use vela_core::registry::DefinitionRegistry;
use vela_core::render::StructuralTemplateRenderer;
use vela_core::revision_store::RevisionStore;
use vela_core::rollout::RolloutController;
use vela_core::webserver;

/// Application reconciliation and rollout engine controller.
#[derive(Parser, Debug)]
#[command(name = "vela-core-controller", version)]
struct Cli {
    /// Path to the controller's YAML configuration file.
    #[arg(long, env = "VELA_CORE_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Disable leader election; always reconcile. Only meaningful with a
    /// single replica (local testing, §6).
    #[arg(long, env = "VELA_CORE_DISABLE_LEADER_ELECTION")]
    disable_leader_election: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "starting vela-core-controller");

    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let client = Client::try_default().await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.cancel();
        });
    }

    let leader_status: webserver::LeaderStatus = Arc::new(AtomicBool::new(cli.disable_leader_election));
    let governing_token = if cli.disable_leader_election {
        CancellationToken::new()
    } else {
        let identity = format!("{}-{}", hostname(), std::process::id());
        let elector = LeaderElector::new(
            client.clone(),
            "vela-core-controller",
            identity,
            config.server.leader_election.clone(),
        );
        let token = elector.acquire(shutdown.clone()).await;
        leader_status.store(true, Ordering::SeqCst);
        token
    };

    let ctx = match build_context(client.clone(), &config).await {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => {
            error!(error = %err, "failed to build reconcile context");
            std::process::exit(1);
        }
    };

    {
        let leader_status = leader_status.clone();
        let governing_token = governing_token.clone();
        tokio::spawn(async move {
            governing_token.cancelled().await;
            leader_status.store(false, Ordering::SeqCst);
        });
    }

    let health_addr = config.server.health_addr.trim_start_matches(':');
    let health_addr: std::net::SocketAddr = format!("0.0.0.0:{health_addr}").parse()?;
    let webserver_handle = tokio::spawn(async move {
        let app = webserver::create_app_with_leader_status(leader_status);
        let listener = tokio::net::TcpListener::bind(health_addr).await?;
        info!(%health_addr, "health server listening");
        axum::serve(listener, app).await
    });

    reconcile::run(ctx, governing_token.clone()).await;

    webserver_handle.abort();
    info!("vela-core-controller stopped");
    Ok(())
}

async fn build_context(client: Client, config: &Config) -> anyhow::Result<ReconcileContext> {
    let registry = DefinitionRegistry::new(client.clone(), config.oam.system_definition_namespace.clone());
    let renderer = Arc::new(StructuralTemplateRenderer);
    let parser = ApplicationParser::new(registry, renderer);
    let revision_store = RevisionStore::new(client.clone(), "vela-system", config.controller.app_revision_limit);

    let cluster_identity = ConfigMapClusterIdentityCache::new(client.clone(), config.oam.system_definition_namespace.clone());
    let cluster_clients = SingleClusterClientFactory::new(client.clone());
    let keeper = Arc::new(
        ResourceKeeper::new(
            client.clone(),
            cluster_identity,
            cluster_clients,
            config.application.max_dispatch_concurrent,
        )
        .await?,
    );

    let rollout_controller = RolloutController::new(client.clone(), keeper.clone());
    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink);

    Ok(ReconcileContext {
        client,
        parser,
        revision_store,
        keeper,
        rollout_controller,
        application_config: config.application.clone(),
        oam_config: config.oam.clone(),
        controller_config: config.controller.clone(),
        metrics,
    })
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vela-core-controller".to_string())
}
