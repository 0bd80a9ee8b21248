//! Shopping-cart tracking service.
//!
//! Wires the SQLite saga store, the cart state machine runtime, the timer
//! scheduler bridge and an in-process bus into one process, and exposes them
//! over HTTP with structured logging (tracing) and Prometheus metrics.

pub mod bus;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::RetryPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{ShoppingCartMachine, StateMachineRuntime};
use saga_store::{ConnectionProvider, SqliteSagaRepository};
use scheduler::{ChannelPublisher, SchedulerBridge, TimerScheduler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use bus::{BusHandle, CartBus};
use config::Config;
use error::ServiceError;

/// The cart runtime as deployed: SQLite storage, effects to the scheduler.
pub type CartRuntime =
    StateMachineRuntime<ShoppingCartMachine, SqliteSagaRepository, SchedulerBridge>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub runtime: Arc<CartRuntime>,
    pub bridge: SchedulerBridge,
    pub provider: Arc<ConnectionProvider>,
}

/// A started service: storage open, scheduler running, bus consuming.
pub struct TrackingService {
    state: Arc<AppState>,
    bus: BusHandle,
}

impl TrackingService {
    /// Opens storage, then starts the bus and the scheduler.
    #[tracing::instrument(skip(config), fields(database_url = %config.database_url))]
    pub async fn start(config: &Config) -> Result<Self, ServiceError> {
        let provider = Arc::new(ConnectionProvider::new(config.database_url.clone()));
        let repository = SqliteSagaRepository::open(provider.clone()).await?;
        if provider.is_ephemeral() {
            warn!("Using ephemeral storage; cart state is lost on shutdown");
        }

        let (publisher, inbox) = ChannelPublisher::channel();
        let bridge = SchedulerBridge::new(
            TimerScheduler::with_history_capacity(config.scheduler_history_capacity),
            Arc::new(publisher),
            RetryPolicy {
                max_retries: config.publish_max_retries,
                ..RetryPolicy::publish()
            },
        );

        let machine =
            ShoppingCartMachine::new(config.cart_expiry, config.cart_state_queue.clone());
        let runtime = Arc::new(
            StateMachineRuntime::new(machine, repository, bridge.clone())
                .with_retry_policy(RetryPolicy::with_max_retries(config.conflict_max_retries)),
        );

        let bus = CartBus::new(runtime.clone(), config.cart_state_queue.clone()).spawn(inbox);
        bridge.start().await?;
        info!("Tracking service started");

        Ok(Self {
            state: Arc::new(AppState {
                runtime,
                bridge,
                provider,
            }),
            bus,
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Puts the scheduler in standby, drains the bus, stops the scheduler,
    /// then closes storage.
    pub async fn stop(self) {
        let scheduler = self.state.bridge.scheduler();
        if let Err(e) = scheduler.standby().await {
            warn!(error = %e, "Scheduler standby failed");
        }
        self.bus.drain().await;
        scheduler.shutdown().await;
        if let Err(e) = self.state.provider.close().await {
            warn!(error = %e, "Closing storage failed");
        }
        info!("Tracking service stopped");
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/carts/{id}", get(routes::carts::get))
        .route("/carts/{id}/events", post(routes::carts::handle_event))
        .route("/scheduler/schedule", post(routes::jobs::schedule))
        .route("/scheduler/cancel", post(routes::jobs::cancel))
        .route("/scheduler/jobs/{token}", get(routes::jobs::status))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
