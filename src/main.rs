mod app_state;
mod config;
mod models;
mod pipeline;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use pipeline::AnalysisPipeline;
use services::storage::LocalImageStore;
use services::vision::AzureVisionClient;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing screenshot-vision server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("analysis_jobs_total", "Total analysis jobs submitted");
    metrics::describe_counter!(
        "analysis_jobs_completed",
        "Total analysis jobs completed successfully"
    );
    metrics::describe_counter!("analysis_jobs_failed", "Total analysis jobs that failed");
    metrics::describe_histogram!(
        "analysis_processing_seconds",
        "Time to process one analysis job"
    );
    metrics::describe_gauge!(
        "analysis_queue_depth",
        "Current number of queued analysis jobs"
    );

    // Initialize screenshot storage
    tracing::info!(dir = %config.screenshot_dir.display(), "Initializing screenshot storage");
    let store = LocalImageStore::new(&config.screenshot_dir);
    store
        .init()
        .await
        .expect("Failed to create screenshot storage directory");
    let store = Arc::new(store);

    // Initialize Azure AI Vision client
    tracing::info!("Initializing Azure AI Vision client");
    let analyzer = AzureVisionClient::new(config.vision_options())
        .expect("Failed to initialize Azure AI Vision client");

    // Create and start the analysis pipeline
    let pipeline = Arc::new(AnalysisPipeline::new(
        config.pipeline_options(),
        Arc::new(analyzer),
        Arc::clone(&store) as Arc<dyn services::storage::SourceResolver>,
    ));
    pipeline.subscribe(|event| {
        if event.success {
            tracing::info!(
                subject_id = %event.subject_id,
                summary = %event.result.comprehensive_description(),
                "screenshot analysis ready"
            );
        }
    });
    pipeline.start();

    // Create shared application state
    let state = AppState::new(Arc::clone(&pipeline), store, config.clone());

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/screenshots",
            post(routes::analyze::submit_screenshot),
        )
        .route("/api/v1/jobs/{job_id}", get(routes::analyze::get_job))
        .route(
            "/api/v1/screenshots/{subject_id}/analysis",
            get(routes::analyze::get_analysis),
        )
        .route("/api/v1/analysis", get(routes::analyze::list_analyses))
        .route("/api/v1/queue/status", get(routes::analyze::queue_status))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(
            config.max_input_size_bytes as usize + 1024 * 1024,
        ));

    tracing::info!("Starting screenshot-vision on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Settle in-flight analysis before exiting
    pipeline.stop().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");
}
