//! Kernel AgentX : ingestion de télémétrie véhicule, diagnostic et workflow d'alerte.
//!
//! Le binaire `agentx-kernel` ne fait que câbler ces modules ; la devkit et les
//! tests d'intégration les pilotent directement, sans socket.

pub mod config;
pub mod fanout;
pub mod health;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod session;
pub mod state;
pub mod workflow;
