//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the application router with the security middleware stack
//! - Serve the built-in health and CSRF token endpoints
//! - Run the rate-limit cleanup task and apply origin reloads
//! - Bind server to listener and shut down gracefully
//!
//! # Design Decisions
//! - The application router is supplied by the caller; the shield only layers it
//! - CORS reads the live origin list on each request so reloads take effect
//!   without rebuilding the router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    cors::{AllowCredentials, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Environment, ShieldConfig};
use crate::http::handlers;
use crate::http::middleware::{csrf_middleware, rate_limit_middleware, security_headers_middleware};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, X_REQUEST_ID};
use crate::observability::metrics;
use crate::security::csrf::CsrfTokenService;
use crate::security::headers::SecurityHeaderSet;
use crate::security::origin::{validate_origins, OriginList};
use crate::security::rate_limit::{spawn_cleanup, RateLimiter};

/// Shared security state injected into middleware and handlers.
#[derive(Clone)]
pub struct ShieldState {
    pub csrf: CsrfTokenService,
    pub limiter: Option<Arc<dyn RateLimiter>>,
    pub origins: Arc<ArcSwap<OriginList>>,
    pub headers: Arc<SecurityHeaderSet>,
    pub csrf_header: HeaderName,
    pub identity_header: HeaderName,
    pub environment: Environment,
}

impl std::fmt::Debug for ShieldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShieldState")
            .field("rate_limited", &self.limiter.is_some())
            .field("headers", &self.headers)
            .field("csrf_header", &self.csrf_header)
            .field("identity_header", &self.identity_header)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// HTTP server hosting an application behind the shield.
pub struct HttpServer {
    router: Router,
    config: ShieldConfig,
    state: ShieldState,
}

impl HttpServer {
    /// Create a new server around `app`.
    pub fn new(config: ShieldConfig, state: ShieldState, app: Router) -> Self {
        let router = Self::build_router(&config, state.clone(), app);
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added last run first, so the list below reads innermost first.
    #[allow(deprecated)]
    fn build_router(config: &ShieldConfig, state: ShieldState, app: Router) -> Router {
        let cors = cors_layer(&state);
        let timeout = Duration::from_secs(config.listener.request_timeout_secs);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/csrf-token", get(handlers::csrf_token))
            .with_state(state.clone())
            .merge(app)
            .layer(from_fn_with_state(state.clone(), csrf_middleware))
            .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
            .layer(TimeoutLayer::new(timeout))
            .layer(cors)
            .layer(from_fn_with_state(state, security_headers_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Validated configs arriving on `config_updates` replace the origin
    /// allow-list; every other setting needs a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.environment,
            "HTTP server starting"
        );

        let cleanup = self.state.limiter.clone().map(|limiter| {
            spawn_cleanup(
                limiter,
                self.config.rate_limit.cleanup_interval(),
                shutdown.resubscribe(),
            )
        });

        let reload = tokio::spawn(reload_origins(
            self.state.origins.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        reload.abort();
        if let Some(handle) = cleanup {
            let _ = handle.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Get a reference to the shared state.
    pub fn state(&self) -> &ShieldState {
        &self.state
    }

    /// The fully layered router, for serving without `run`.
    pub fn into_router(self) -> Router {
        self.router
    }
}

fn cors_layer(state: &ShieldState) -> CorsLayer {
    let origins = state.origins.clone();
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _parts| {
        origin
            .to_str()
            .map(|o| origins.load().allows(o))
            .unwrap_or(false)
    });

    // Origins admitted only through `*` get CORS access without credentials.
    let origins = state.origins.clone();
    let allow_credentials = AllowCredentials::predicate(move |origin: &HeaderValue, _parts| {
        origin
            .to_str()
            .map(|o| origins.load().allows_credentials(o))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            state.csrf_header.clone(),
            X_REQUEST_ID,
        ])
        .expose_headers([X_REQUEST_ID])
        .allow_credentials(allow_credentials)
        .max_age(Duration::from_secs(3600))
}

/// Apply origin lists from reloaded configs until shutdown.
async fn reload_origins(
    origins: Arc<ArcSwap<OriginList>>,
    mut updates: mpsc::UnboundedReceiver<ShieldConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match validate_origins(config.cors.origins.as_deref(), config.environment) {
                    Ok(list) => {
                        origins.store(Arc::new(list));
                        metrics::record_origin_reload("applied");
                        tracing::info!("CORS origins reloaded");
                    }
                    Err(e) => {
                        metrics::record_origin_reload("rejected");
                        tracing::error!(error = %e, "Origin reload rejected, keeping previous list");
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
