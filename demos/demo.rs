use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use payload_logger::{LoggingHandler, PayloadLoggerConfig, PayloadLoggerLayer};
use serde_json::{json, Value};
use std::{net::SocketAddr, time::Duration};
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn hello() -> &'static str {
    "Hello, World!"
}

async fn create_order(Json(order): Json<Value>) -> impl IntoResponse {
    Json(json!({ "status": "accepted", "order": order }))
}

async fn invoice() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7 ...")
}

async fn health() -> &'static str {
    "UP"
}

/// Server-sent events produced by a background task after the handler returns.
async fn events() -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(8);
    tokio::spawn(async move {
        for i in 1..=3 {
            sleep(Duration::from_millis(200)).await;
            if tx.send(Ok(Bytes::from(format!("data: {i}\n\n")))).await.is_err() {
                break;
            }
        }
    });
    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(body))
        .expect("static response parts are valid")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("payload_logger=debug,demo=info,tower_http=info")),
        )
        .init();

    let config = PayloadLoggerConfig::from_env()?;
    info!(max_payload_length = config.max_payload_length, "Starting demo server");

    let app = Router::new()
        .route("/hello", get(hello))
        .route("/orders", post(create_order))
        .route("/invoice", get(invoice))
        .route("/events", get(events))
        .route("/actuator/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PayloadLoggerLayer::new(config, LoggingHandler)),
        );

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Listening on http://0.0.0.0:3000");
    info!("Try: curl -X POST localhost:3000/orders -H 'content-type: application/json' -d '{{\"sku\":42}}'");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
