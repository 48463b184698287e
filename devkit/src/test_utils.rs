/*!
Test Harness pour le pipeline AgentX

Monte un Pipeline complet sur des collaborateurs scriptés et connecte des
véhicules / dashboards via des canaux en mémoire (aucune socket) :
- Une tâche de session par client, comme en production
- Lecture des réponses avec délai borné
- Assertions sur l'absence de message
*/

use crate::frame_builder::FrameBuilder;
use crate::port_stubs::StubPorts;
use agentx_kernel::config::KernelConfig;
use agentx_kernel::pipeline::Pipeline;
use agentx_kernel::registry::{Outbound, SessionId};
use agentx_kernel::session::{DashboardSession, DashboardState, Inbound, TransportError, VehicleSession, VehicleState};
use anyhow::{bail, Context, Result};
use futures::channel::mpsc as inbound_mpsc;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Délai par défaut d'attente d'un message sortant
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

type InboundTx = inbound_mpsc::UnboundedSender<Result<Inbound, TransportError>>;

/// Harness de test complet : pipeline + stubs
pub struct TestHarness {
    pub stubs: StubPorts,
    pub pipeline: Pipeline,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(cfg: KernelConfig) -> Self {
        // Init logging pour tests
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init()
            .ok();

        let stubs = StubPorts::new();
        let pipeline = Pipeline::new(stubs.ports(), &cfg);
        Self { stubs, pipeline }
    }

    /// Connecte un véhicule : la session est enregistrée au retour
    pub fn connect_vehicle(&self, vehicle_id: &str) -> VehicleClient {
        let (out_tx, out_rx) = self.pipeline.outbound_channel();
        let (in_tx, in_rx) = inbound_mpsc::unbounded();
        let session = VehicleSession::accept(&self.pipeline, vehicle_id, out_tx);
        let session_id = session.id();
        let task = tokio::spawn(session.run(in_rx));
        VehicleClient { session_id, inbound: in_tx, outbound: out_rx, task }
    }

    pub fn connect_dashboard(&self) -> DashboardClient {
        let (out_tx, out_rx) = self.pipeline.outbound_channel();
        let (in_tx, in_rx) = inbound_mpsc::unbounded();
        let session = DashboardSession::accept(&self.pipeline, out_tx);
        let session_id = session.id();
        let task = tokio::spawn(session.run(in_rx));
        DashboardClient { session_id, inbound: in_tx, outbound: Some(out_rx), task }
    }

    pub fn vehicles_connected(&self) -> usize {
        self.pipeline.registry.vehicle_count()
    }

    pub fn dashboards_connected(&self) -> usize {
        self.pipeline.registry.dashboard_count()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

async fn recv_json(rx: &mut mpsc::Receiver<Outbound>, wait: Duration) -> Result<Value> {
    match timeout(wait, rx.recv()).await.context("timed out waiting for outbound message")? {
        Some(Outbound::Text(text)) => Ok(serde_json::from_str(&text)?),
        Some(Outbound::Close) => bail!("session closed by the kernel"),
        None => bail!("outbound queue closed"),
    }
}

async fn stays_silent(rx: &mut mpsc::Receiver<Outbound>, wait: Duration) -> Result<()> {
    match timeout(wait, rx.recv()).await {
        Err(_) | Ok(None) => Ok(()),
        Ok(Some(item)) => bail!("unexpected outbound message: {item:?}"),
    }
}

/// Côté véhicule d'une connexion simulée
pub struct VehicleClient {
    pub session_id: SessionId,
    inbound: InboundTx,
    outbound: mpsc::Receiver<Outbound>,
    task: JoinHandle<VehicleState>,
}

impl VehicleClient {
    pub fn send_frame(&self, frame: &FrameBuilder) -> Result<()> {
        self.send_raw(&frame.to_json())
    }

    pub fn send_raw(&self, text: &str) -> Result<()> {
        self.inbound
            .unbounded_send(Ok(Inbound::Text(text.to_string())))
            .map_err(|e| anyhow::anyhow!("vehicle session gone: {e}"))
    }

    pub async fn next_reply(&mut self) -> Result<Value> {
        recv_json(&mut self.outbound, RECV_TIMEOUT).await
    }

    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        stays_silent(&mut self.outbound, wait).await
    }

    /// Prochain élément brut (y compris Close), None si rien dans le délai
    pub async fn next_outbound(&mut self, wait: Duration) -> Option<Outbound> {
        timeout(wait, self.outbound.recv()).await.ok().flatten()
    }

    /// Fermeture propre, retourne l'état final de la session
    pub async fn disconnect(self) -> Result<VehicleState> {
        let _ = self.inbound.unbounded_send(Ok(Inbound::Close));
        self.join().await
    }

    /// Simule une erreur de transport
    pub async fn fail(self, reason: &str) -> Result<VehicleState> {
        let _ = self.inbound.unbounded_send(Err(TransportError(reason.to_string())));
        self.join().await
    }

    /// Attend la fin de la session sans rien envoyer (ex: éviction)
    pub async fn join(self) -> Result<VehicleState> {
        Ok(timeout(RECV_TIMEOUT, self.task).await.context("vehicle session did not end")??)
    }
}

/// Côté dashboard d'une connexion simulée
pub struct DashboardClient {
    pub session_id: SessionId,
    inbound: InboundTx,
    outbound: Option<mpsc::Receiver<Outbound>>,
    task: JoinHandle<DashboardState>,
}

impl DashboardClient {
    pub async fn next_event(&mut self) -> Result<Value> {
        match self.outbound.as_mut() {
            Some(rx) => recv_json(rx, RECV_TIMEOUT).await,
            None => bail!("outbound already dropped"),
        }
    }

    pub async fn expect_silence(&mut self, wait: Duration) -> Result<()> {
        match self.outbound.as_mut() {
            Some(rx) => stays_silent(rx, wait).await,
            None => Ok(()),
        }
    }

    /// Le pair disparaît sans fermeture : la session reste enregistrée
    /// mais plus rien ne lit sa file sortante
    pub fn drop_outbound(&mut self) {
        self.outbound = None;
    }

    pub async fn disconnect(self) -> Result<DashboardState> {
        let _ = self.inbound.unbounded_send(Ok(Inbound::Close));
        Ok(timeout(RECV_TIMEOUT, self.task).await.context("dashboard session did not end")??)
    }
}
