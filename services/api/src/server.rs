use crate::cli::ServeArgs;
use crate::infra::{open_store, AppState};
use crate::routes::with_moderation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use estate_moderation::config::AppConfig;
use estate_moderation::error::AppError;
use estate_moderation::moderation::{ModerationService, ModerationStore, TokenAuthority};
use estate_moderation::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.store)?;
    let service = Arc::new(ModerationService::new(store, config.moderation_settings()));
    let tokens = Arc::new(TokenAuthority::from_secret(
        config.auth.token_secret.as_bytes(),
        config.auth.token_ttl_minutes,
    ));

    spawn_follow_up_sweeper(
        service.clone(),
        Duration::from_secs(config.moderation.follow_up_retry_secs),
    );

    let app = with_moderation_routes(service, tokens)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        store = ?config.store.kind,
        "moderation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically retries parked follow-ups; a zero interval disables the task.
fn spawn_follow_up_sweeper<S>(service: Arc<ModerationService<S>>, every: Duration)
where
    S: ModerationStore + ?Sized + 'static,
{
    if every.is_zero() {
        warn!("follow-up sweeper disabled (FOLLOW_UP_RETRY_SECS=0)");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let sweep = service.sweep_follow_ups();
            if sweep.retried > 0 {
                info!(
                    retried = sweep.retried,
                    completed = sweep.completed,
                    abandoned = sweep.abandoned,
                    remaining = sweep.remaining,
                    "follow-up sweep finished"
                );
            }
        }
    });
}
