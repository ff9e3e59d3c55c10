//! HTTP and Server-Sent Events transport
//!
//! Routes:
//! - `GET /` dashboard page, or a JSON 404 when the file is missing
//! - `GET /static/*` files under the static directory, mounted only if it exists
//! - `GET /api/v1/alerts`, `/api/v1/emissions`, `/api/v1/status` latest published values
//! - `GET /api/v1/snapshot` all three plus `last_update`
//! - `GET /api/v1/stream` change messages as `data: <json>` events
//! - `GET /health` pipeline counters
//!
//! Handlers only read the published state; the publisher thread owns updates.

use crate::error::ServerError;
use crate::events::{Alert, EmissionRecord, StatusSnapshot};
use crate::monitoring::{MonitorSnapshot, PipelineMonitor};
use crate::publisher::{PublishedState, StateHandle, SubscriberRegistry};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt};
use tower_http::services::ServeDir;

/// Interval of SSE comment frames keeping idle connections open
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub state: StateHandle,
    pub subscribers: SubscriberRegistry,
    pub monitor: PipelineMonitor,
    pub dashboard_path: PathBuf,
    pub static_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct HealthView {
    status: &'static str,
    subscribers: usize,
    last_update: Option<String>,
    pipeline: MonitorSnapshot,
}

pub fn build_router(app_state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/v1/alerts", get(get_alerts))
        .route("/api/v1/emissions", get(get_emissions))
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/snapshot", get(get_snapshot))
        .route("/api/v1/stream", get(stream_updates));

    if app_state.static_dir.is_dir() {
        info!("Serving static files from {}", app_state.static_dir.display());
        router = router.nest_service("/static", ServeDir::new(&app_state.static_dir));
    } else {
        debug!(
            "Static directory {} not found, /static is not mounted",
            app_state.static_dir.display()
        );
    }

    router.with_state(app_state)
}

async fn dashboard(State(app): State<AppState>) -> Response {
    match tokio::fs::read_to_string(&app.dashboard_path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            debug!(
                "Dashboard {} unavailable: {}",
                app.dashboard_path.display(),
                e
            );
            let name = app
                .dashboard_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dashboard".to_string());
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("{} not found", name) })),
            )
                .into_response()
        }
    }
}

async fn health(State(app): State<AppState>) -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        subscribers: app.subscribers.subscriber_count(),
        last_update: app.state.last_update(),
        pipeline: app.monitor.snapshot(),
    })
}

async fn get_alerts(State(app): State<AppState>) -> Json<Vec<Alert>> {
    Json(app.state.alerts())
}

async fn get_emissions(State(app): State<AppState>) -> Json<Vec<EmissionRecord>> {
    Json(app.state.emissions())
}

async fn get_status(State(app): State<AppState>) -> Json<StatusSnapshot> {
    Json(app.state.status())
}

async fn get_snapshot(State(app): State<AppState>) -> Json<PublishedState> {
    Json(PublishedState::clone(&app.state.current()))
}

/// Push every future change message to the client
///
/// The subscription lives inside the response stream, so when the client goes
/// away and the stream is dropped the subscriber is deregistered.
async fn stream_updates(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = app.subscribers.subscribe();
    let stream = subscription.map(|message| Event::default().json_data(&message));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Bind `addr` and serve until `shutdown` completes
///
/// # Errors
///
/// Returns `ServerError::Bind` if the address cannot be bound and
/// `ServerError::Serve` if the server fails while running.
pub async fn serve<F>(addr: &str, app_state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    serve_listener(listener, app_state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_listener<F>(
    listener: TcpListener,
    app_state: AppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(local) = listener.local_addr() {
        info!("HTTP server listening on http://{}", local);
    }

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AnomalyType, Severity, SystemHealth};
    use crate::publisher::{Category, PublishedMessage};
    use std::io::Write;
    use std::net::SocketAddr;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::sync::oneshot;

    fn app_state(dashboard_path: PathBuf) -> AppState {
        AppState {
            state: StateHandle::new(),
            subscribers: SubscriberRegistry::new(),
            monitor: PipelineMonitor::new(),
            dashboard_path,
            static_dir: PathBuf::from("/nonexistent/static"),
        }
    }

    async fn spawn_server(app: AppState) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            serve_listener(listener, app, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        (addr, shutdown_tx)
    }

    fn sample_state() -> PublishedState {
        PublishedState {
            alerts: vec![Alert {
                machine_id: "M2".to_string(),
                anomaly_type: AnomalyType::HighVibration,
                current_temperature: Some(72.5),
                avg_temperature: 70.0,
                current_vibration: Some(0.92),
                alert_time: "2024-01-01T00:00:00.000000Z".to_string(),
                severity: Severity::Medium,
            }],
            emissions: vec![EmissionRecord {
                machine_id: "M2".to_string(),
                cumulative_co2_kg: 9.5,
            }],
            status: StatusSnapshot {
                system_health: SystemHealth::Critical,
                total_records_processed: 2,
                active_machines: 1,
                total_anomalies_detected: 1,
                avg_co2_per_machine: 9.5,
            },
            last_update: Some("2024-01-01T00:00:01.000000Z".to_string()),
        }
    }

    #[tokio::test]
    async fn test_pull_endpoints() {
        let app = app_state(PathBuf::from("/nonexistent/dashboard.html"));
        app.state.replace(sample_state());
        let (addr, shutdown) = spawn_server(app).await;

        let alerts: serde_json::Value = reqwest::get(format!("http://{}/api/v1/alerts", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(alerts[0]["machine_id"], "M2");
        assert_eq!(alerts[0]["anomaly_type"], "HIGH_VIBRATION");
        assert_eq!(alerts[0]["severity"], "MEDIUM");

        let emissions: serde_json::Value =
            reqwest::get(format!("http://{}/api/v1/emissions", addr))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(emissions[0]["cumulative_co2_kg"], 9.5);

        let status: serde_json::Value = reqwest::get(format!("http://{}/api/v1/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["system_health"], "CRITICAL");
        assert_eq!(status["active_machines"], 1);

        let snapshot: serde_json::Value =
            reqwest::get(format!("http://{}/api/v1/snapshot", addr))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(snapshot["last_update"], "2024-01-01T00:00:01.000000Z");
        assert_eq!(snapshot["alerts"].as_array().unwrap().len(), 1);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_status_before_first_tick() {
        let (addr, shutdown) = spawn_server(app_state(PathBuf::from("missing.html"))).await;

        let status: serde_json::Value = reqwest::get(format!("http://{}/api/v1/status", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["system_health"], "HEALTHY");
        assert_eq!(status["total_records_processed"], 0);

        let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert!(health["last_update"].is_null());
        assert_eq!(health["pipeline"]["ticks_completed"], 0);

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_dashboard_served_or_404() {
        let mut page = NamedTempFile::new().unwrap();
        write!(page, "<html><body>EcoSync</body></html>").unwrap();

        let (addr, shutdown) = spawn_server(app_state(page.path().to_path_buf())).await;
        let response = reqwest::get(format!("http://{}/", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains("EcoSync"));
        let _ = shutdown.send(());

        let (addr, shutdown) =
            spawn_server(app_state(PathBuf::from("/nonexistent/dashboard.html"))).await;
        let response = reqwest::get(format!("http://{}/", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "dashboard.html not found");
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_stream_delivers_published_messages() {
        let app = app_state(PathBuf::from("missing.html"));
        let subscribers = app.subscribers.clone();
        let (addr, shutdown) = spawn_server(app).await;

        let mut response = reqwest::get(format!("http://{}/api/v1/stream", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(subscribers.subscriber_count(), 1);

        subscribers.broadcast(&PublishedMessage {
            kind: Category::Alerts,
            data: serde_json::json!([]),
            last_update: "2024-01-01T00:00:00.000000Z".to_string(),
        });

        let mut received = String::new();
        while !received.contains("\n\n") {
            let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }

        let payload = received
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(message["type"], "alerts");
        assert_eq!(message["last_update"], "2024-01-01T00:00:00.000000Z");

        drop(response);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_static_dir_mounted_when_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("chart.js"), "console.log('ecosync');").unwrap();

        let app = AppState {
            static_dir: dir.path().to_path_buf(),
            ..app_state(PathBuf::from("missing.html"))
        };
        let (addr, shutdown) = spawn_server(app).await;

        let response = reqwest::get(format!("http://{}/static/chart.js", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "console.log('ecosync');");

        let response = reqwest::get(format!("http://{}/static/missing.js", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let _ = shutdown.send(());

        // without the directory the prefix is not routed
        let (addr, shutdown) = spawn_server(app_state(PathBuf::from("missing.html"))).await;
        let response = reqwest::get(format!("http://{}/static/chart.js", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_closing_subscribers_ends_stream_response() {
        let app = app_state(PathBuf::from("missing.html"));
        let subscribers = app.subscribers.clone();
        let (addr, shutdown) = spawn_server(app).await;

        let mut response = reqwest::get(format!("http://{}/api/v1/stream", addr))
            .await
            .unwrap();
        assert_eq!(subscribers.close_all(), 1);

        let end = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(_chunk) = response.chunk().await.unwrap() {}
        })
        .await;
        assert!(end.is_ok());
        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let result = serve(&addr, app_state(PathBuf::from("missing.html")), async {}).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
