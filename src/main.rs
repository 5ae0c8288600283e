use clap::Parser;
use entry_gate::utils::error::{ErrorSeverity, GatewayError};
use entry_gate::utils::{logger, validation::Validate};
use entry_gate::{
    router, AppState, AuditBackendStore, CliConfig, ConfigHandle, ReputationChecker,
    RequestOrchestrator,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    logger::init_logger(cli.verbose, cli.log_json);

    tracing::info!("🚀 Starting entry-gate");
    tracing::info!("📁 Loading configuration from: {}", cli.config.display());

    let config = match cli.load().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };

    tracing::info!(
        "✅ Configuration loaded (ip validation: {}, data validation: {}, audit: {:?})",
        config.web.ip_validation_enabled,
        config.web.data_validation_enabled,
        config.audit.backend
    );

    let store = match AuditBackendStore::from_config(&config.audit).await {
        Ok(store) => store,
        Err(e) => exit_with(e),
    };
    if let AuditBackendStore::Jsonl(jsonl) = &store {
        tracing::info!("📝 Audit records appended to {}", jsonl.path().display());
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("entry-gate/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_millis(config.validation.timeout_ms))
        .build()?;

    let bind_address = config.bind_address();
    let handle = ConfigHandle::with_source(config, cli.config.clone());
    let orchestrator =
        RequestOrchestrator::new(handle.clone(), ReputationChecker::new(client), store);

    spawn_reload_listener(handle);

    let app = router(AppState::new(orchestrator));

    let addr: SocketAddr = bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

fn exit_with(e: GatewayError) -> ! {
    tracing::error!(
        "❌ Startup failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());

    let exit_code = match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

/// SIGHUP 時重新載入配置
#[cfg(unix)]
fn spawn_reload_listener(handle: ConfigHandle) {
    tokio::spawn(async move {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                tracing::error!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            if let Err(e) = handle.reload() {
                tracing::error!("Configuration reload failed, keeping previous: {}", e);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_handle: ConfigHandle) {}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = wait_for_signal(
        "SIGTERM",
        signal::unix::signal(signal::unix::SignalKind::terminate()).map(|mut signal| async move {
            signal.recv().await;
        }),
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

/// 訊號處理器安裝失敗時永遠不完成，不能因此觸發關機
#[cfg(any(unix, test))]
async fn wait_for_signal<F>(name: &str, installed: std::io::Result<F>)
where
    F: std::future::Future<Output = ()>,
{
    match installed {
        Ok(received) => received.await,
        Err(e) => {
            tracing::error!("Failed to install {} handler: {}", name, e);
            std::future::pending::<()>().await
        }
    }
}
