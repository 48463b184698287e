/**
 * PORTS - Contrats des collaborateurs externes du pipeline AgentX
 *
 * RÔLE :
 * Ce module définit les interfaces que le cœur consomme sans dépendre de leur
 * implémentation : diagnostic, notification, prise de RDV, annuaire client,
 * stockage télémétrie.
 *
 * FONCTIONNEMENT :
 * - Chaque port = trait async, object-safe (Arc<dyn ...>)
 * - PortError = erreur typée commune, jamais un "mode sans échec" implicite
 * - Ports = bundle clonable des 5 collaborateurs injecté dans le pipeline
 * - Implémentations par défaut en mémoire : rules, notify, directory, memory
 *
 * UTILITÉ POUR AGENTX :
 * ✅ Remplaçables : moteur de règles aujourd'hui, modèle demain
 * ✅ Testables : le devkit fournit des stubs scriptés/défaillants
 * ✅ Découverte : GET /ports liste les implémentations câblées
 */

use crate::models::{
    AlertRecord, Appointment, AppointmentRequest, CustomerRecord, Issue, ManufacturingSignal, SensorFrame, Verdict,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

pub mod directory;
pub mod memory;
pub mod notify;
pub mod rules;

pub use directory::StaticDirectory;
pub use memory::InMemoryStore;
pub use notify::TemplateNotifier;
pub use rules::RuleDiagnosis;

/// Erreurs possibles lors des appels aux collaborateurs
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic d'une trame : `evaluate(frame) -> Verdict`
#[async_trait]
pub trait DiagnosisPort: Send + Sync {
    async fn evaluate(&self, frame: &SensorFrame) -> Result<Verdict, PortError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Compose le script ; `customer` vaut None quand l'annuaire a échoué
    async fn compose_message(&self, customer: Option<&CustomerRecord>, issues: &[Issue]) -> Result<String, PortError>;

    /// Ok(None) = pas d'audio produit
    async fn synthesize_voice(&self, text: &str) -> Result<Option<Vec<u8>>, PortError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait BookingPort: Send + Sync {
    /// Retourne l'identifiant du RDV créé
    async fn record_appointment(&self, request: AppointmentRequest) -> Result<String, PortError>;

    async fn record_manufacturing_signal(&self, signal: ManufacturingSignal) -> Result<(), PortError>;

    async fn recent_appointments(&self, limit: usize) -> Result<Vec<Appointment>, PortError>;

    async fn booking_counts(&self) -> Result<BookingCounts, PortError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn resolve_customer(&self, vehicle_id: &str) -> Result<CustomerRecord, PortError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn persist_frame(&self, frame: &SensorFrame) -> Result<(), PortError>;

    async fn persist_diagnosis(&self, record: &AlertRecord) -> Result<(), PortError>;

    /// Rattache un RDV à l'alerte déjà persistée (vehicle_id, timestamp)
    async fn link_appointment(
        &self,
        _vehicle_id: &str,
        _timestamp: OffsetDateTime,
        _appointment_id: &str,
    ) -> Result<(), PortError> {
        Ok(())
    }

    /// Alertes les plus récentes d'abord
    async fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, PortError>;

    async fn alert_counts(&self) -> Result<AlertCounts, PortError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub frames: u64,
    pub alerts: u64,
    pub critical: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCounts {
    pub appointments: u64,
    pub manufacturing_signals: u64,
}

/// Informations descriptives d'un collaborateur câblé
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub role: String,
    pub implementation: String,
}

/// Bundle des collaborateurs consommés par le pipeline
#[derive(Clone)]
pub struct Ports {
    pub diagnosis: Arc<dyn DiagnosisPort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub booking: Arc<dyn BookingPort>,
    pub directory: Arc<dyn DirectoryPort>,
    pub store: Arc<dyn TelemetryStore>,
}

impl Ports {
    pub fn list_port_info(&self) -> Vec<PortInfo> {
        [
            ("diagnosis", self.diagnosis.name()),
            ("notification", self.notifier.name()),
            ("booking", self.booking.name()),
            ("directory", self.directory.name()),
            ("telemetry_store", self.store.name()),
        ]
        .into_iter()
        .map(|(role, implementation)| PortInfo { role: role.to_string(), implementation: implementation.to_string() })
        .collect()
    }
}

/// Helper pour initialiser les collaborateurs en mémoire depuis la config
pub fn create_default_ports(cfg: &crate::config::KernelConfig) -> Ports {
    let store = Arc::new(InMemoryStore::new(cfg.store.telemetry_retention, cfg.store.alert_retention));
    Ports {
        diagnosis: Arc::new(RuleDiagnosis::new(cfg.rules.clone())),
        notifier: Arc::new(TemplateNotifier::new()),
        booking: store.clone(),
        directory: Arc::new(StaticDirectory::from_config(&cfg.directory)),
        store,
    }
}
