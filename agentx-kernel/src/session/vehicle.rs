/**
 * VEHICLE SESSION - Cycle de vie d'une connexion véhicule
 *
 * ÉTATS : CONNECTED -> STREAMING -> (CLOSED | FAILED)
 *
 * FONCTIONNEMENT :
 * - accept() enregistre la session (rôle VEHICLE) et passe en STREAMING
 * - Une trame à la fois : parse, persistance, diagnostic, puis ACK ou workflow
 *   d'alerte complet avant de lire la trame suivante (ordre d'arrivée strict)
 * - Trame illisible = ignorée, la session continue
 * - Réponse bornée par vehicle_send_timeout : un véhicule qui ne lit plus perd
 *   ses réponses au lieu de figer la session
 * - Éviction (reconnexion du même véhicule) vérifiée uniquement entre deux trames
 * - Le retrait du registre est porté par la garde Registration (tous chemins)
 */

use super::{Inbound, TransportError};
use crate::models::{SensorFrame, Severity, VehicleReply, Verdict};
use crate::pipeline::Pipeline;
use crate::registry::{Outbound, Registration, Session, SessionId};
use futures::{Stream, StreamExt};
use time::OffsetDateTime;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Connected,
    Streaming,
    Closed,
    Failed,
}

pub struct VehicleSession {
    pipeline: Pipeline,
    session: Session,
    registration: Registration,
    state: VehicleState,
}

impl VehicleSession {
    pub fn accept(pipeline: &Pipeline, vehicle_id: &str, outbound: tokio::sync::mpsc::Sender<Outbound>) -> Self {
        let session = Session::vehicle(vehicle_id, outbound);
        let mut this = Self {
            pipeline: pipeline.clone(),
            registration: pipeline.registry.register(session.clone()),
            session,
            state: VehicleState::Connected,
        };
        info!(vehicle_id, session_id = %this.registration.id(), "vehicle connected");
        this.state = VehicleState::Streaming;
        this
    }

    pub fn id(&self) -> SessionId {
        self.registration.id()
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    fn vehicle_id(&self) -> &str {
        self.session.vehicle_id.as_deref().unwrap_or_default()
    }

    pub async fn run<S>(mut self, mut inbound: S) -> VehicleState
    where
        S: Stream<Item = Result<Inbound, TransportError>> + Unpin,
    {
        let session = self.session.clone();
        loop {
            let next = tokio::select! {
                biased;
                _ = session.evicted() => {
                    info!(vehicle_id = self.vehicle_id(), "session superseded by a newer connection");
                    let _ = session.outbound().try_send(Outbound::Close);
                    self.state = VehicleState::Closed;
                    break;
                }
                next = inbound.next() => next,
            };

            match next {
                Some(Ok(Inbound::Text(raw))) => self.handle_frame(&raw).await,
                Some(Ok(Inbound::Binary(_))) => {
                    self.pipeline.health.frame_received();
                    self.pipeline.health.frame_skipped();
                    warn!(vehicle_id = self.vehicle_id(), "binary frame skipped");
                }
                Some(Ok(Inbound::Keepalive)) => {}
                Some(Ok(Inbound::Close)) | None => {
                    self.state = VehicleState::Closed;
                    break;
                }
                Some(Err(e)) => {
                    warn!(vehicle_id = self.vehicle_id(), "vehicle transport failed: {e}");
                    self.state = VehicleState::Failed;
                    break;
                }
            }
        }

        info!(vehicle_id = self.vehicle_id(), state = ?self.state, "vehicle disconnected");
        self.state
    }

    async fn handle_frame(&self, raw: &str) {
        let health = &self.pipeline.health;
        health.frame_received();

        let frame = match SensorFrame::parse(self.vehicle_id(), raw, OffsetDateTime::now_utc()) {
            Ok(frame) => frame,
            Err(e) => {
                health.frame_skipped();
                warn!(vehicle_id = self.vehicle_id(), "skipping malformed frame: {e}");
                return;
            }
        };

        if let Err(e) = self.pipeline.ports.store.persist_frame(&frame).await {
            warn!(vehicle_id = self.vehicle_id(), "frame not persisted: {e}");
        }

        let verdict = self.diagnose(&frame).await;
        if !verdict.severity.is_alert_worthy() {
            let ack = VehicleReply::Ok { status: Severity::Normal, temp: frame.field("engine_temp").cloned() };
            self.reply(&ack).await;
            return;
        }

        warn!(
            vehicle_id = self.vehicle_id(),
            severity = ?verdict.severity,
            risk_score = verdict.risk_score,
            "anomaly detected"
        );
        match self.pipeline.workflow.run(self.vehicle_id(), verdict, self.session.outbound()).await {
            Ok(outcome) => {
                health.alert_processed();
                debug!(vehicle_id = self.vehicle_id(), ?outcome, "alert processed");
            }
            Err(e) => {
                health.alert_failed();
                error!(vehicle_id = self.vehicle_id(), "alert processing failed for this frame: {e}");
            }
        }
    }

    /// Appel au port de diagnostic, borné si configuré ; échec ou délai => verdict de repli
    async fn diagnose(&self, frame: &SensorFrame) -> Verdict {
        let call = self.pipeline.ports.diagnosis.evaluate(frame);
        let result = match self.pipeline.diagnosis_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(vehicle_id = self.vehicle_id(), ?limit, "diagnosis timed out, using fallback verdict");
                    return Verdict::fallback();
                }
            },
            None => call.await,
        };

        match result {
            Ok(verdict) => verdict.normalized(),
            Err(e) => {
                warn!(vehicle_id = self.vehicle_id(), "diagnosis failed, using fallback verdict: {e}");
                Verdict::fallback()
            }
        }
    }

    async fn reply(&self, reply: &VehicleReply) {
        match serde_json::to_string(reply) {
            Ok(text) => {
                let limit = self.pipeline.vehicle_send_timeout;
                match self.session.outbound().send_timeout(Outbound::Text(text), limit).await {
                    Ok(()) => {}
                    Err(SendTimeoutError::Closed(_)) => {
                        debug!(vehicle_id = self.vehicle_id(), "vehicle gone before ack");
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!(vehicle_id = self.vehicle_id(), ?limit, "vehicle too slow, ack dropped");
                    }
                }
            }
            Err(e) => error!("ack not serializable: {e}"),
        }
    }
}
