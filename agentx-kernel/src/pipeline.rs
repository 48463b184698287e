use crate::config::KernelConfig;
use crate::fanout::Broadcaster;
use crate::health::HealthTracker;
use crate::ports::Ports;
use crate::registry::{ConnectionRegistry, Outbound};
use crate::workflow::AlertWorkflow;
use std::time::Duration;
use tokio::sync::mpsc;

/// Contexte partagé cloné dans chaque tâche de connexion
#[derive(Clone)]
pub struct Pipeline {
    pub registry: ConnectionRegistry,
    pub ports: Ports,
    pub health: HealthTracker,
    pub broadcaster: Broadcaster,
    pub workflow: AlertWorkflow,
    pub diagnosis_timeout: Option<Duration>,
    pub vehicle_send_timeout: Duration,
    outbound_buffer: usize,
}

impl Pipeline {
    pub fn new(ports: Ports, cfg: &KernelConfig) -> Self {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone(), cfg.pipeline.dashboard_send_timeout());
        let workflow = AlertWorkflow::new(
            ports.clone(),
            broadcaster.clone(),
            cfg.alerts.clone(),
            cfg.pipeline.vehicle_send_timeout(),
        );
        Self {
            registry,
            ports,
            health: HealthTracker::new(),
            broadcaster,
            workflow,
            diagnosis_timeout: cfg.pipeline.diagnosis_timeout(),
            vehicle_send_timeout: cfg.pipeline.vehicle_send_timeout(),
            outbound_buffer: cfg.pipeline.outbound_buffer.max(1),
        }
    }

    /// File sortante bornée d'une connexion (drainée par son writer)
    pub fn outbound_channel(&self) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(self.outbound_buffer)
    }
}
