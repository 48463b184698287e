//! AgentX Vehicle Simulator - véhicule de démo pour le kernel AgentX
//!
//! Ouvre une session WebSocket véhicule et envoie des trames capteurs :
//! - Quelques trames saines (ACK `OK` attendu)
//! - Puis une surchauffe moteur jusqu'à réception d'une `ALERT`

mod telemetry;

use agentx_kernel::models::VehicleReply;
use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use telemetry::{Phase, TelemetryGenerator};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for agentx-vehicle-sim
#[derive(Parser, Debug)]
#[command(name = "agentx-vehicle-sim")]
#[command(about = "Simulated vehicle streaming telemetry to the AgentX kernel")]
#[command(version)]
struct Args {
    /// Base WebSocket URL of the kernel
    #[arg(long, default_value = "ws://localhost:8000", env = "AGENTX_KERNEL_URL")]
    url: String,

    /// Vehicle identifier used in the session route
    #[arg(long, default_value = "VH-2024-DEMO")]
    vehicle_id: String,

    /// Healthy frames sent before the overheating phase
    #[arg(long, default_value_t = 5)]
    normal_frames: u64,

    /// Delay between frames
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stop after this many frames even without an alert
    #[arg(long)]
    max_frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentx_vehicle_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let endpoint = format!("{}/ws/vehicle/{}", args.url.trim_end_matches('/'), args.vehicle_id);

    info!("connecting to {endpoint}");
    let (ws, _) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .with_context(|| format!("cannot reach kernel at {endpoint}"))?;
    let (mut tx, mut rx) = ws.split();
    info!(vehicle_id = %args.vehicle_id, "vehicle session open");

    let interval = Duration::from_millis(args.interval_ms);
    // une réponse par trame ; absente si le kernel a abandonné le traitement
    let reply_wait = interval.max(Duration::from_secs(5));
    let mut generator = TelemetryGenerator::new(StdRng::from_entropy(), args.normal_frames);

    loop {
        if args.max_frames.is_some_and(|max| generator.sent() >= max) {
            info!("frame budget reached without alert");
            break;
        }

        let phase = generator.phase();
        let frame = generator.next_frame();
        if phase == Phase::Critical {
            warn!(frame = %serde_json::Value::Object(frame.clone()), "sending critical frame");
        } else {
            info!(frame = %serde_json::Value::Object(frame.clone()), "sending frame");
        }
        tx.send(Message::Text(serde_json::Value::Object(frame).to_string().into()))
            .await
            .context("kernel closed the session")?;

        match tokio::time::timeout(reply_wait, next_reply(&mut rx)).await {
            Ok(Ok(Some(VehicleReply::Ok { status, temp }))) => {
                info!(?status, temp = ?temp, "ack");
            }
            Ok(Ok(Some(VehicleReply::Alert { diagnosis, message, appointment_booked }))) => {
                warn!(
                    severity = ?diagnosis.severity,
                    risk_score = diagnosis.risk_score,
                    appointment_booked,
                    "ALERT received: {message}"
                );
                for issue in &diagnosis.issues {
                    warn!(severity = ?issue.severity, "issue: {}", issue.description);
                }
                break;
            }
            Ok(Ok(None)) => {
                info!("session closed by kernel");
                return Ok(());
            }
            Ok(Err(e)) => {
                error!("transport failed: {e}");
                return Err(e);
            }
            Err(_) => warn!("no reply for this frame"),
        }

        tokio::time::sleep(interval).await;
    }

    let _ = tx.send(Message::Close(None)).await;
    Ok(())
}

/// Prochaine réponse applicative ; None si le kernel ferme la session
async fn next_reply<S>(rx: &mut S) -> Result<Option<VehicleReply>>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = rx.next().await {
        match msg? {
            Message::Text(text) => match serde_json::from_str::<VehicleReply>(text.as_str()) {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) => warn!("unreadable reply ignored: {e}"),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}
