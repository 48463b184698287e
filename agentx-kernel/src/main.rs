/**
 * AGENTX KERNEL - Point d'entrée du serveur de maintenance prédictive
 *
 * RÔLE : Bootstrap : config, collaborateurs, pipeline temps réel, HTTP/WebSocket.
 *
 * ARCHITECTURE : Une tâche par connexion + registre partagé + diffusion dashboards.
 * UTILITÉ : Reçoit la télémétrie des véhicules, déclenche alertes et rendez-vous.
 */

use agentx_kernel::config::load_config;
use agentx_kernel::http::{self, AppState};
use agentx_kernel::pipeline::Pipeline;
use agentx_kernel::ports::create_default_ports;
use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentx_kernel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = load_config().await;

    // collaborateurs par défaut (mémoire + règles)
    let ports = create_default_ports(&cfg);
    for port in ports.list_port_info() {
        info!(role = %port.role, implementation = %port.implementation, "port wired");
    }

    let pipeline = Pipeline::new(ports, &cfg);
    let app = http::build_router(AppState { pipeline });

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("cannot bind {}", cfg.listen))?;
    info!("listening on http://{}", cfg.listen);
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
