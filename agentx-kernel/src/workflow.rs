/**
 * ALERT WORKFLOW - Séquencement d'une alerte sur les collaborateurs
 *
 * RÔLE :
 * Exécuté une fois par verdict WARNING/CRITICAL, sur la tâche du véhicule.
 * Aucune I/O propre en dehors des appels aux ports, de la réponse au
 * véhicule et de la diffusion aux dashboards.
 *
 * SÉQUENCE :
 * 1. AlertRecord persisté (échec toléré)
 * 2. Client résolu via l'annuaire (échec => contexte client nul)
 * 3. Message composé (échec => workflow abandonné)
 * 4. Si CRITICAL : RDV (échec => abandon), signal fabrication si risque > seuil
 *    (best-effort), synthèse vocale (best-effort, échec = pas d'audio)
 * 5. Réponse ALERT au véhicule (perdue si la socket est fermée ou la file
 *    pleine au-delà du délai d'envoi)
 * 6. Diffusion NEW_ALERT à tous les dashboards
 */

use crate::config::AlertConf;
use crate::fanout::{BroadcastReport, Broadcaster};
use crate::models::{
    AlertRecord, AppointmentRequest, AppointmentStatus, CustomerRecord, DashboardEvent, ManufacturingSignal,
    Severity, VehicleReply, Verdict,
};
use crate::ports::{PortError, Ports};
use crate::registry::Outbound;
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("message composition failed: {0}")]
    Compose(#[source] PortError),
    #[error("appointment booking failed: {0}")]
    Booking(#[source] PortError),
    #[error("reply serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ce qui a effectivement été fait pour une alerte
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertOutcome {
    pub customer_resolved: bool,
    pub appointment_id: Option<String>,
    pub manufacturing_signal: bool,
    pub audio_attached: bool,
    pub reply_delivered: bool,
    pub broadcast: BroadcastReport,
}

#[derive(Clone)]
pub struct AlertWorkflow {
    ports: Ports,
    broadcaster: Broadcaster,
    policy: AlertConf,
    reply_timeout: Duration,
}

impl AlertWorkflow {
    pub fn new(ports: Ports, broadcaster: Broadcaster, policy: AlertConf, reply_timeout: Duration) -> Self {
        Self { ports, broadcaster, policy, reply_timeout }
    }

    pub async fn run(
        &self,
        vehicle_id: &str,
        verdict: Verdict,
        reply: &mpsc::Sender<Outbound>,
    ) -> Result<AlertOutcome, WorkflowError> {
        let mut outcome = AlertOutcome::default();
        let timestamp = OffsetDateTime::now_utc();

        let record = AlertRecord::new(vehicle_id, verdict.clone(), timestamp);
        if let Err(e) = self.ports.store.persist_diagnosis(&record).await {
            warn!(vehicle_id, "alert record not persisted: {e}");
        }

        let customer = match self.ports.directory.resolve_customer(vehicle_id).await {
            Ok(customer) => Some(customer),
            Err(e) => {
                warn!(vehicle_id, "customer unresolved, continuing without: {e}");
                None
            }
        };
        outcome.customer_resolved = customer.is_some();

        let message = self
            .ports
            .notifier
            .compose_message(customer.as_ref(), &verdict.issues)
            .await
            .map_err(WorkflowError::Compose)?;

        let mut audio = String::new();
        if verdict.severity == Severity::Critical {
            let issue_type = verdict.first_issue().map(|i| i.description.clone());
            let appointment_id = self
                .ports
                .booking
                .record_appointment(self.appointment_request(vehicle_id, customer.as_ref(), &verdict, issue_type.clone()))
                .await
                .map_err(WorkflowError::Booking)?;
            info!(vehicle_id, %appointment_id, "appointment booked");
            if let Err(e) = self.ports.store.link_appointment(vehicle_id, timestamp, &appointment_id).await {
                warn!(vehicle_id, %appointment_id, "appointment not linked to alert record: {e}");
            }
            outcome.appointment_id = Some(appointment_id);

            if verdict.risk_score > self.policy.manufacturing_risk_threshold {
                outcome.manufacturing_signal = self.signal_manufacturing(customer.as_ref(), issue_type).await;
            }

            audio = self.synthesize(&message).await;
            outcome.audio_attached = !audio.is_empty();
        }

        let reply_text = serde_json::to_string(&VehicleReply::Alert {
            diagnosis: verdict.clone(),
            message,
            appointment_booked: outcome.appointment_id.is_some(),
        })?;
        outcome.reply_delivered = match reply.send_timeout(Outbound::Text(reply_text), self.reply_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Closed(_)) => {
                debug!(vehicle_id, "vehicle gone before alert reply");
                false
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(vehicle_id, "vehicle too slow, alert reply dropped");
                false
            }
        };

        let event = DashboardEvent::NewAlert {
            vehicle_id: vehicle_id.to_string(),
            diagnosis: verdict,
            timestamp,
            audio,
            appointment_id: outcome.appointment_id.clone(),
        };
        outcome.broadcast = self.broadcaster.broadcast(&event).await;

        Ok(outcome)
    }

    fn appointment_request(
        &self,
        vehicle_id: &str,
        customer: Option<&CustomerRecord>,
        verdict: &Verdict,
        issue_type: Option<String>,
    ) -> AppointmentRequest {
        AppointmentRequest {
            vehicle_id: vehicle_id.to_string(),
            customer_id: customer.map(|c| c.customer_id.clone()),
            customer_name: customer.map(|c| c.name.clone()),
            slot_time: self.policy.default_slot.clone(),
            issue_type,
            risk_score: Some(verdict.risk_score),
            status: AppointmentStatus::PendingConfirmation,
        }
    }

    async fn signal_manufacturing(&self, customer: Option<&CustomerRecord>, issue_type: Option<String>) -> bool {
        let signal = ManufacturingSignal {
            vehicle_model: customer.map_or_else(|| "unknown".to_string(), |c| c.vehicle_model.clone()),
            issue_type: issue_type.unwrap_or_default(),
            frequency: self.policy.manufacturing_frequency,
        };
        match self.ports.booking.record_manufacturing_signal(signal).await {
            Ok(()) => true,
            Err(e) => {
                warn!("manufacturing signal skipped: {e}");
                false
            }
        }
    }

    async fn synthesize(&self, message: &str) -> String {
        match self.ports.notifier.synthesize_voice(message).await {
            Ok(Some(bytes)) => general_purpose::STANDARD.encode(bytes),
            Ok(None) => String::new(),
            Err(e) => {
                warn!("voice synthesis failed, sending without audio: {e}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Issue, IssueSeverity};
    use crate::ports::{
        BookingPort, DirectoryPort, InMemoryStore, NotificationPort, RuleDiagnosis, StaticDirectory, TelemetryStore,
        TemplateNotifier,
    };
    use crate::registry::{ConnectionRegistry, Session};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        workflow: AlertWorkflow,
        store: Arc<InMemoryStore>,
        registry: ConnectionRegistry,
    }

    fn customer() -> crate::models::CustomerRecord {
        crate::models::CustomerRecord {
            customer_id: "CUST_001".into(),
            name: "Rajesh Kumar".into(),
            preferred_language: "Hindi".into(),
            vehicle_model: "Hero XPulse 200".into(),
        }
    }

    fn fixture_with(directory: Arc<dyn DirectoryPort>, notifier: Arc<dyn NotificationPort>) -> Fixture {
        let store = Arc::new(InMemoryStore::default());
        let registry = ConnectionRegistry::new();
        let ports = Ports {
            diagnosis: Arc::new(RuleDiagnosis::new(Default::default())),
            notifier,
            booking: store.clone(),
            directory,
            store: store.clone(),
        };
        let broadcaster = Broadcaster::new(registry.clone(), Duration::from_millis(50));
        Fixture {
            workflow: AlertWorkflow::new(ports, broadcaster, AlertConf::default(), Duration::from_millis(50)),
            store,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(StaticDirectory::new().with_default(customer())),
            Arc::new(TemplateNotifier::new()),
        )
    }

    fn critical(risk: u8) -> Verdict {
        Verdict::alert(Severity::Critical, risk, vec![Issue::new("Engine Overheating", IssueSeverity::High)])
    }

    fn dashboard(registry: &ConnectionRegistry) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(8);
        registry.add(Session::dashboard(tx));
        rx
    }

    fn text(item: Option<Outbound>) -> serde_json::Value {
        match item {
            Some(Outbound::Text(t)) => serde_json::from_str(&t).unwrap(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_critical_high_risk_runs_every_step() {
        let f = fixture();
        let mut dash = dashboard(&f.registry);
        let (reply_tx, mut reply_rx) = mpsc::channel(4);

        let outcome = f.workflow.run("V1", critical(85), &reply_tx).await.unwrap();
        assert!(outcome.customer_resolved);
        assert!(outcome.appointment_id.is_some());
        assert!(outcome.manufacturing_signal);
        assert!(!outcome.audio_attached);
        assert_eq!(outcome.broadcast.delivered, 1);

        let reply = text(reply_rx.recv().await);
        assert_eq!(reply["type"], "ALERT");
        assert_eq!(reply["appointment_booked"], true);
        assert!(reply["message"].as_str().unwrap().contains("Rajesh Kumar"));

        let event = text(dash.recv().await);
        assert_eq!(event["type"], "NEW_ALERT");
        assert_eq!(event["vehicle_id"], "V1");
        assert_eq!(event["audio"], "");
        assert_eq!(event["appointment_id"], serde_json::json!(outcome.appointment_id));

        let appointments = f.store.recent_appointments(5).await.unwrap();
        assert_eq!(appointments[0].request.issue_type.as_deref(), Some("Engine Overheating"));
        assert_eq!(appointments[0].request.risk_score, Some(85));
        assert_eq!(appointments[0].request.slot_time, "Tomorrow 10:00 AM");
        assert_eq!(f.store.manufacturing_signals()[0].vehicle_model, "Hero XPulse 200");
        let alerts = f.store.recent_alerts(5).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].appointment_id, outcome.appointment_id);
    }

    #[tokio::test]
    async fn test_risk_at_threshold_skips_manufacturing_signal() {
        let f = fixture();
        let (reply_tx, _reply_rx) = mpsc::channel(4);
        let outcome = f.workflow.run("V1", critical(60), &reply_tx).await.unwrap();
        assert!(outcome.appointment_id.is_some());
        assert!(!outcome.manufacturing_signal);
        assert!(f.store.manufacturing_signals().is_empty());
    }

    #[tokio::test]
    async fn test_warning_never_books() {
        let f = fixture();
        let mut dash = dashboard(&f.registry);
        let (reply_tx, mut reply_rx) = mpsc::channel(4);
        let verdict = Verdict::alert(Severity::Warning, 35, vec![Issue::new("Engine Running Hot", IssueSeverity::Medium)]);

        let outcome = f.workflow.run("V1", verdict, &reply_tx).await.unwrap();
        assert_eq!(outcome.appointment_id, None);
        assert_eq!(text(reply_rx.recv().await)["appointment_booked"], false);
        assert_eq!(text(dash.recv().await)["diagnosis"]["severity"], "WARNING");
        assert_eq!(f.store.booking_counts().await.unwrap().appointments, 0);
    }

    #[tokio::test]
    async fn test_unresolved_customer_degrades() {
        let f = fixture_with(Arc::new(StaticDirectory::new()), Arc::new(TemplateNotifier::new()));
        let mut dash = dashboard(&f.registry);
        let (reply_tx, _reply_rx) = mpsc::channel(4);

        let outcome = f.workflow.run("V2", critical(85), &reply_tx).await.unwrap();
        assert!(!outcome.customer_resolved);
        assert_eq!(f.store.recent_alerts(5).await.unwrap()[0].vehicle_id, "V2");
        assert_eq!(f.store.recent_appointments(5).await.unwrap()[0].request.customer_id, None);
        assert_eq!(f.store.manufacturing_signals()[0].vehicle_model, "unknown");
        assert_eq!(text(dash.recv().await)["vehicle_id"], "V2");
    }

    #[tokio::test]
    async fn test_closed_reply_channel_still_broadcasts() {
        let f = fixture();
        let mut dash = dashboard(&f.registry);
        let (reply_tx, reply_rx) = mpsc::channel(4);
        drop(reply_rx);

        let outcome = f.workflow.run("V1", critical(85), &reply_tx).await.unwrap();
        assert!(!outcome.reply_delivered);
        assert_eq!(text(dash.recv().await)["type"], "NEW_ALERT");
    }

    #[tokio::test]
    async fn test_full_reply_queue_does_not_block_broadcast() {
        let f = fixture();
        let mut dash = dashboard(&f.registry);
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        reply_tx.try_send(Outbound::Text("queued".into())).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), f.workflow.run("V1", critical(85), &reply_tx))
            .await
            .expect("workflow stuck on a full reply queue")
            .unwrap();
        assert!(!outcome.reply_delivered);
        assert_eq!(outcome.broadcast.delivered, 1);
        assert_eq!(text(dash.recv().await)["type"], "NEW_ALERT");
        assert_eq!(reply_rx.recv().await, Some(Outbound::Text("queued".into())));
        assert!(reply_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_warning_alert_record_has_no_appointment() {
        let f = fixture();
        let (reply_tx, _reply_rx) = mpsc::channel(4);
        let verdict = Verdict::alert(Severity::Warning, 35, vec![Issue::new("Engine Running Hot", IssueSeverity::Medium)]);
        f.workflow.run("V1", verdict, &reply_tx).await.unwrap();
        assert_eq!(f.store.recent_alerts(1).await.unwrap()[0].appointment_id, None);
    }

    struct VoiceNotifier {
        compose_fails: bool,
        voice: Result<Option<Vec<u8>>, ()>,
    }

    #[async_trait]
    impl NotificationPort for VoiceNotifier {
        async fn compose_message(
            &self,
            _customer: Option<&crate::models::CustomerRecord>,
            _issues: &[Issue],
        ) -> Result<String, PortError> {
            if self.compose_fails {
                return Err(PortError::Unavailable("script service down".into()));
            }
            Ok("script".into())
        }

        async fn synthesize_voice(&self, _text: &str) -> Result<Option<Vec<u8>>, PortError> {
            self.voice.clone().map_err(|_| PortError::Unavailable("tts down".into()))
        }

        fn name(&self) -> &'static str {
            "voice-test"
        }
    }

    #[tokio::test]
    async fn test_audio_is_base64_encoded() {
        let notifier = VoiceNotifier { compose_fails: false, voice: Ok(Some(b"RIFF".to_vec())) };
        let f = fixture_with(Arc::new(StaticDirectory::new().with_default(customer())), Arc::new(notifier));
        let mut dash = dashboard(&f.registry);
        let (reply_tx, _reply_rx) = mpsc::channel(4);

        let outcome = f.workflow.run("V1", critical(85), &reply_tx).await.unwrap();
        assert!(outcome.audio_attached);
        assert_eq!(text(dash.recv().await)["audio"], "UklGRg==");
    }

    #[tokio::test]
    async fn test_voice_failure_is_not_fatal() {
        let notifier = VoiceNotifier { compose_fails: false, voice: Err(()) };
        let f = fixture_with(Arc::new(StaticDirectory::new().with_default(customer())), Arc::new(notifier));
        let mut dash = dashboard(&f.registry);
        let (reply_tx, _reply_rx) = mpsc::channel(4);

        let outcome = f.workflow.run("V1", critical(85), &reply_tx).await.unwrap();
        assert!(!outcome.audio_attached);
        assert_eq!(text(dash.recv().await)["audio"], "");
    }

    #[tokio::test]
    async fn test_compose_failure_abandons_before_reply() {
        let notifier = VoiceNotifier { compose_fails: true, voice: Ok(None) };
        let f = fixture_with(Arc::new(StaticDirectory::new().with_default(customer())), Arc::new(notifier));
        let mut dash = dashboard(&f.registry);
        let (reply_tx, mut reply_rx) = mpsc::channel(4);

        let err = f.workflow.run("V1", critical(85), &reply_tx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Compose(_)));
        // l'AlertRecord a déjà été persisté, rien n'a été envoyé
        assert_eq!(f.store.recent_alerts(5).await.unwrap().len(), 1);
        assert!(reply_rx.try_recv().is_err());
        assert!(dash.try_recv().is_err());
    }
}
