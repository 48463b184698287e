//! Handlers de session : une tâche par connexion, indépendante du transport.
//!
//! Le transport (WebSocket axum en production, canaux en test) est réduit à un
//! flux d'événements `Inbound` et une file sortante `Outbound`.

pub mod dashboard;
pub mod vehicle;

pub use dashboard::{DashboardSession, DashboardState};
pub use vehicle::{VehicleSession, VehicleState};

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// ping/pong ou tout message de contrôle sans contenu applicatif
    Keepalive,
    Close,
}

#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);
