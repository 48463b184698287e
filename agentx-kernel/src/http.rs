/**
 * API HTTP AGENTX - WebSockets du pipeline + surface de requêtes REST
 *
 * RÔLE :
 * Point d'entrée réseau du kernel. Les WebSockets portent le pipeline temps
 * réel, les routes REST ne sont que des passe-plats vers les collaborateurs.
 *
 * ROUTES :
 * - /ws/vehicle/{vehicle_id} : flux télémétrie d'un véhicule (1 tâche par connexion)
 * - /ws/dashboard : abonnement aux alertes diffusées
 * - /health, /api/health, /system/health : sondes
 * - /api/stats, /api/alerts, /api/book-service, /ports : requêtes
 *
 * TRANSPORT :
 * Chaque socket est scindée ; un writer dédié vide la file sortante bornée de
 * la session, les handlers ne touchent jamais la socket directement.
 */

use crate::models::{AppointmentRequest, AppointmentStatus};
use crate::pipeline::Pipeline;
use crate::ports::PortInfo;
use crate::registry::Outbound;
use crate::session::{DashboardSession, Inbound, TransportError, VehicleSession};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/health", get(api_health))
        .route("/system/health", get(get_system_health))
        .route("/api/stats", get(get_stats))
        .route("/api/alerts", get(get_alerts))
        .route("/api/book-service", post(book_service))
        .route("/ports", get(list_ports))
        .route("/ws/vehicle/{vehicle_id}", get(vehicle_ws))
        .route("/ws/dashboard", get(dashboard_ws))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// GET /ws/vehicle/{vehicle_id}
async fn vehicle_ws(ws: WebSocketUpgrade, State(app): State<AppState>, Path(vehicle_id): Path<String>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (ws_tx, ws_rx) = socket.split();
        let (tx, rx) = app.pipeline.outbound_channel();
        let writer = tokio::spawn(write_outbound(ws_tx, rx));
        let session = VehicleSession::accept(&app.pipeline, &vehicle_id, tx);
        session.run(inbound(ws_rx)).await;
        drain_writer(writer).await;
    })
}

// GET /ws/dashboard
async fn dashboard_ws(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (ws_tx, ws_rx) = socket.split();
        let (tx, rx) = app.pipeline.outbound_channel();
        let writer = tokio::spawn(write_outbound(ws_tx, rx));
        let session = DashboardSession::accept(&app.pipeline, tx);
        session.run(inbound(ws_rx)).await;
        drain_writer(writer).await;
    })
}

fn inbound(ws_rx: SplitStream<WebSocket>) -> impl Stream<Item = Result<Inbound, TransportError>> + Unpin {
    ws_rx.map(|msg| match msg {
        Ok(Message::Text(text)) => Ok(Inbound::Text(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Ok(Inbound::Binary(bytes.to_vec())),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(Inbound::Keepalive),
        Ok(Message::Close(_)) => Ok(Inbound::Close),
        Err(e) => Err(TransportError(e.to_string())),
    })
}

async fn write_outbound(mut ws_tx: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let msg = match item {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Close => break,
        };
        if ws_tx.send(msg).await.is_err() {
            debug!("websocket send failed, peer gone");
            return;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

/// Laisse le writer vider les réponses en attente, puis le coupe
async fn drain_writer(mut writer: JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
}

// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "AgentX Kernel",
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    }))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::KernelHealth> {
    Json(app.pipeline.health.get_health(&app.pipeline.registry))
}

// GET /api/stats
async fn get_stats(State(app): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let ports = &app.pipeline.ports;
    let alerts = ports.store.alert_counts().await.map_err(internal)?;
    let bookings = ports.booking.booking_counts().await.map_err(internal)?;
    let recent_alerts = ports.store.recent_alerts(5).await.map_err(internal)?;
    let recent_appointments = ports.booking.recent_appointments(5).await.map_err(internal)?;

    Ok(Json(serde_json::json!({
        "total_vehicles": app.pipeline.registry.vehicle_count(),
        "alerts_today": alerts.alerts,
        "critical_alerts": alerts.critical,
        "appointments_booked": bookings.appointments,
        "manufacturing_issues": bookings.manufacturing_signals,
        "recent_alerts": recent_alerts,
        "recent_appointments": recent_appointments,
    })))
}

#[derive(Debug, Deserialize)]
struct AlertsParams {
    limit: Option<usize>,
}

// GET /api/alerts?limit=N
async fn get_alerts(
    State(app): State<AppState>,
    Query(params): Query<AlertsParams>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let alerts = app
        .pipeline
        .ports
        .store
        .recent_alerts(params.limit.unwrap_or(10))
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "alerts": alerts })))
}

#[derive(Debug, Deserialize)]
struct BookServiceRequest {
    vehicle_id: String,
    customer_name: String,
    slot_time: String,
}

// POST /api/book-service (réservation manuelle)
async fn book_service(
    State(app): State<AppState>,
    Json(req): Json<BookServiceRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let request = AppointmentRequest {
        vehicle_id: req.vehicle_id,
        customer_id: None,
        customer_name: Some(req.customer_name),
        slot_time: req.slot_time,
        issue_type: None,
        risk_score: None,
        status: AppointmentStatus::Confirmed,
    };
    let appointment_id = app
        .pipeline
        .ports
        .booking
        .record_appointment(request)
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({ "success": true, "appointment_id": appointment_id })))
}

// GET /ports (collaborateurs câblés)
async fn list_ports(State(app): State<AppState>) -> Json<Vec<PortInfo>> {
    Json(app.pipeline.ports.list_port_info())
}

fn internal(e: crate::ports::PortError) -> StatusCode {
    error!("collaborator query failed: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::ports::create_default_ports;

    fn app() -> AppState {
        let cfg = KernelConfig::default();
        AppState { pipeline: Pipeline::new(create_default_ports(&cfg), &cfg) }
    }

    #[tokio::test]
    async fn test_manual_booking_then_stats() {
        let state = app();
        let Json(booked) = book_service(
            State(state.clone()),
            Json(BookServiceRequest {
                vehicle_id: "V1".into(),
                customer_name: "Bhaskar".into(),
                slot_time: "Friday 9:00 AM".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(booked["success"], true);

        let Json(stats) = get_stats(State(state)).await.unwrap();
        assert_eq!(stats["appointments_booked"], 1);
        assert_eq!(stats["recent_appointments"][0]["status"], "CONFIRMED");
        assert_eq!(stats["recent_appointments"][0]["appointment_id"], booked["appointment_id"]);
        assert_eq!(stats["total_vehicles"], 0);
    }

    #[tokio::test]
    async fn test_alerts_default_empty() {
        let Json(alerts) = get_alerts(State(app()), Query(AlertsParams { limit: None })).await.unwrap();
        assert_eq!(alerts["alerts"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_ports_listing() {
        let Json(ports) = list_ports(State(app())).await;
        let roles: Vec<_> = ports.iter().map(|p| p.role.as_str()).collect();
        assert_eq!(roles, ["diagnosis", "notification", "booking", "directory", "telemetry_store"]);
    }

    #[test]
    fn test_router_builds() {
        let _router = build_router(app());
    }
}
