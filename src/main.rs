mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::access_gate::{routes as gate_routes, AccessGate, StepUpService};
use crate::features::access_gate::handlers::GateState;
use crate::features::audit::{routes as audit_routes, AuditService, PgAuditStore};
use crate::features::audit::handlers::AuditState;
use crate::features::auth::TokenService;
use crate::features::generation::{routes as generation_routes, AnthropicClient, GenerationService};
use crate::features::generation::handlers::GenerationState;
use crate::features::prompts::{routes as prompts_routes, PromptService};
use crate::features::prompts::handlers::PromptsState;
use crate::features::rate_limits::{InMemoryCounterStore, RateLimitService};
use crate::modules::vault::PromptVault;
use axum::{middleware::from_fn, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; weak security keys abort startup here
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );

    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    // Run migrations automatically
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    // Session-token validation
    let token_service = Arc::new(TokenService::new(&config.auth));
    tracing::info!("Token service initialized");

    // Content vault; key derivation happens once here
    let vault = Arc::new(
        PromptVault::new(&config.vault)
            .map_err(|e| anyhow::anyhow!("Failed to initialize vault: {}", e))?,
    );
    tracing::info!("Content vault initialized");

    // Audit trail
    let audit_service = Arc::new(AuditService::new(Arc::new(PgAuditStore::new(pool.clone()))));
    tracing::info!("Audit service initialized");

    // Rate limiting: in-memory counters for a single node; the store is
    // injected so a shared counter store can replace it
    let rate_limit_service = Arc::new(RateLimitService::new(
        Arc::new(InMemoryCounterStore::new()),
        config.rate_limits.clone(),
    ));
    tracing::info!("Rate limit service initialized");

    // Step-up verification and the access gate in front of admin operations
    let step_up_service = Arc::new(StepUpService::new("Sofer Admin"));
    let access_gate = Arc::new(AccessGate::new(
        config.gate.clone(),
        Arc::clone(&audit_service),
        Arc::clone(&rate_limit_service),
        Arc::clone(&step_up_service),
    ));
    tracing::info!("Access gate initialized");

    // Version store
    let prompt_service = Arc::new(PromptService::new(pool.clone(), Arc::clone(&vault)));
    tracing::info!("Prompt service initialized");

    // Text-generation path
    let generator = Arc::new(AnthropicClient::new(&config.generation));
    let generation_service = Arc::new(GenerationService::new(
        Arc::clone(&prompt_service),
        generator,
        Arc::clone(&rate_limit_service),
        config.generation.clone(),
    ));
    tracing::info!("Generation service initialized");

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Build swagger router
    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    // Protected routes (require a bearer token)
    let protected_routes = Router::new()
        .merge(generation_routes::routes(GenerationState {
            service: Arc::clone(&generation_service),
        }))
        .merge(prompts_routes::admin_routes(PromptsState {
            service: Arc::clone(&prompt_service),
            gate: Arc::clone(&access_gate),
            audit: Arc::clone(&audit_service),
        }))
        .merge(audit_routes::admin_routes(AuditState {
            audit: Arc::clone(&audit_service),
            gate: Arc::clone(&access_gate),
        }))
        .merge(gate_routes::admin_routes(GateState {
            gate: Arc::clone(&access_gate),
            step_up: Arc::clone(&step_up_service),
            audit: Arc::clone(&audit_service),
        }))
        .route_layer(axum::middleware::from_fn_with_state(
            token_service.clone(),
            middleware::auth_middleware,
        ));

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(protected_routes)
        .merge(health_route)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&rate_limit_service),
            middleware::general_rate_limit_middleware,
        ))
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
