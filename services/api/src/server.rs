use crate::cli::ServeArgs;
use crate::infra::{seed_portfolio, AppState, InMemoryAlertPublisher, InMemoryNoteService};
use crate::routes::with_leasing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use leaseflow::config::AppConfig;
use leaseflow::error::AppError;
use leaseflow::telemetry;
use leaseflow::workflows::leasing::domain::OrganizationId;
use leaseflow::workflows::leasing::ports::{StaticActor, SystemClock};
use leaseflow::workflows::leasing::{LeasingServices, MemoryStore, UnitOfWorkExecutor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let organization_id = OrganizationId::new(args.organization);
    let store = Arc::new(MemoryStore::new());
    if args.seed_demo {
        seed_portfolio(&store, &organization_id)?;
    }

    let executor = UnitOfWorkExecutor::new(
        store,
        Arc::new(StaticActor::new(args.actor, organization_id.clone())),
        Arc::new(SystemClock),
        Arc::new(InMemoryAlertPublisher::default()),
        Arc::new(InMemoryNoteService::default()),
    );
    let services = Arc::new(LeasingServices::new(executor, config.leasing));

    let app = with_leasing_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        organization_id = %organization_id,
        leasing = ?config.leasing,
        "leasing workflow service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
