use std::{
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use cmd_util::env::config_service;
use common::{
    http::TfaasHttpService,
    knobs::MAX_CONCURRENT_REQUESTS,
};
use docker_backend::DockerBackend;
use futures::{
    future,
    FutureExt,
};
use manager::{
    Backend,
    ManagementService,
};
use rproxy::{
    RProxy,
    RProxyOptions,
};
use state_switcher::{
    ApiSwitcher,
    NoSwitch,
    StateSwitcher,
};
use tfaas_backend::{
    config::{
        StateSwitching,
        TfaasConfig,
    },
    router,
    IngressState,
    ManagementState,
    SERVER_VERSION,
};
use tokio::signal;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let _guard = config_service();
    let config = TfaasConfig::parse();
    tracing::info!("Starting with config {config:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_server(config))
}

async fn run_server(config: TfaasConfig) -> anyhow::Result<()> {
    let instance_id = common::id::uid();

    let backend: Arc<dyn Backend> = match config.tf_backend.as_str() {
        "dockerlight" => {
            tracing::info!("using docker backend");
            let mut supported =
                String::from("This docker backend supports the following runtimes:\n");
            for runtime in docker_backend::runtimes::REGISTRY.keys() {
                supported.push_str(&format!("  - {runtime}\n"));
            }
            tracing::info!("{supported}");
            Arc::new(
                DockerBackend::new(instance_id.clone(), config.persist_func_dir.clone()).await?,
            )
        },
        backend => anyhow::bail!("invalid backend {backend}"),
    };

    let switcher: Arc<dyn StateSwitcher> = match config.stateswitching {
        StateSwitching::Api => {
            tracing::info!(
                "stateswitching enabled: apiHost: {}",
                config.stateswitching_api_url
            );
            Arc::new(ApiSwitcher::new(
                config.stateswitching_api_url.clone(),
                config.update_interval(),
            ))
        },
        StateSwitching::Off => {
            tracing::info!("stateswitching disabled");
            Arc::new(NoSwitch)
        },
    };

    let rproxy = RProxy::new(
        switcher,
        RProxyOptions::new(
            config.check_period(),
            config.backoff_period(),
            config.persist_dir.clone(),
            config.resume,
        ),
    )?;
    tracing::info!("started rproxy");

    let manager = Arc::new(
        ManagementService::new(
            instance_id,
            config.rproxy_addr(),
            rproxy.clone(),
            backend,
            config.resume,
        )
        .await?,
    );

    // Used to signal both HTTP services to stop.
    let (shutdown_tx, shutdown_rx) = async_broadcast::broadcast(1);

    let ingress_service = TfaasHttpService::new(
        router::ingress_router(IngressState {
            rproxy: rproxy.clone(),
        }),
        "rproxy",
        SERVER_VERSION.to_owned(),
        *MAX_CONCURRENT_REQUESTS,
    );
    let mut shutdown_rx_ = shutdown_rx.clone();
    let serve_ingress = ingress_service.serve(config.http_bind_address().into(), async move {
        let _ = shutdown_rx_.recv().await;
    });

    let management_service = TfaasHttpService::new(
        router::management_router(ManagementState {
            manager: manager.clone(),
        }),
        "management",
        SERVER_VERSION.to_owned(),
        *MAX_CONCURRENT_REQUESTS,
    );
    let mut shutdown_rx_ = shutdown_rx.clone();
    let serve_management =
        management_service.serve(config.config_bind_address().into(), async move {
            let _ = shutdown_rx_.recv().await;
        });

    let serve_future = future::try_join(serve_ingress, serve_management).fuse();
    futures::pin_mut!(serve_future);

    // Start shutdown with the first ctrl-c.
    futures::select! {
        r = serve_future => {
            r?;
            anyhow::bail!("Serve future stopped unexpectedly!")
        },
        r = signal::ctrl_c().fuse() => {
            tracing::info!("Received Ctrl-C signal!");
            r?;
            let _: Result<_, _> = shutdown_tx.broadcast(()).await;
        },
    }

    // Drain in-progress requests, bounded by the grace period or a second
    // ctrl-c.
    tracing::info!("Shutdown initiated, draining existing requests...");
    futures::select! {
        r = serve_future => { r?; },
        _ = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).fuse() => {
            tracing::warn!("Grace period expired before requests drained");
        },
        r = signal::ctrl_c().fuse() => {
            r?;
            tracing::warn!("Forcibly shutting down!");
        },
    }

    tracing::info!("Stopping management service...");
    if let Err(e) = manager.stop().await {
        tracing::error!("error stopping management service: {e:#}");
    }

    tracing::info!("stopped all tfaas services");
    Ok(())
}
