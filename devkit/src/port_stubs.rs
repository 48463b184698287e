/*!
Collaborateurs scriptés pour tester le pipeline sans dépendances externes

Chaque stub enregistre les appels reçus et peut être basculé en échec,
ce qui permet d'asserter le séquencement du workflow d'alerte.
*/

use agentx_kernel::models::{
    AlertRecord, Appointment, AppointmentRequest, CustomerRecord, Issue, ManufacturingSignal, SensorFrame, Severity,
    Verdict,
};
use agentx_kernel::ports::{
    AlertCounts, BookingCounts, BookingPort, DiagnosisPort, DirectoryPort, NotificationPort, PortError, Ports,
    TelemetryStore,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Diagnostic scripté : file de réponses, puis verdict par défaut
pub struct ScriptedDiagnosis {
    script: Mutex<VecDeque<Result<Verdict, String>>>,
    default: Mutex<Verdict>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicU64,
}

impl ScriptedDiagnosis {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Verdict::fallback()),
            delay: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Verdict rendu quand la file est vide
    pub fn always(&self, verdict: Verdict) {
        *self.default.lock() = verdict;
    }

    pub fn push_verdict(&self, verdict: Verdict) {
        self.script.lock().push_back(Ok(verdict));
    }

    pub fn push_failure(&self, reason: &str) {
        self.script.lock().push_back(Err(reason.to_string()));
    }

    /// Retarde chaque évaluation (tests de timeout)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedDiagnosis {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagnosisPort for ScriptedDiagnosis {
    async fn evaluate(&self, _frame: &SensorFrame) -> Result<Verdict, PortError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(verdict)) => Ok(verdict),
            Some(Err(reason)) => Err(PortError::Unavailable(reason)),
            None => Ok(self.default.lock().clone()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted-diagnosis"
    }
}

/// Store qui garde tout en mémoire, sans rétention
#[derive(Default)]
pub struct RecordingStore {
    frames: Mutex<Vec<SensorFrame>>,
    diagnoses: Mutex<Vec<AlertRecord>>,
    failing: AtomicBool,
}

impl RecordingStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn frames(&self) -> Vec<SensorFrame> {
        self.frames.lock().clone()
    }

    pub fn diagnoses(&self) -> Vec<AlertRecord> {
        self.diagnoses.lock().clone()
    }

    fn check(&self) -> Result<(), PortError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PortError::Unavailable("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for RecordingStore {
    async fn persist_frame(&self, frame: &SensorFrame) -> Result<(), PortError> {
        self.check()?;
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    async fn persist_diagnosis(&self, record: &AlertRecord) -> Result<(), PortError> {
        self.check()?;
        self.diagnoses.lock().push(record.clone());
        Ok(())
    }

    async fn link_appointment(
        &self,
        vehicle_id: &str,
        timestamp: OffsetDateTime,
        appointment_id: &str,
    ) -> Result<(), PortError> {
        self.check()?;
        let mut diagnoses = self.diagnoses.lock();
        let record = diagnoses
            .iter_mut()
            .rev()
            .find(|d| d.vehicle_id == vehicle_id && d.timestamp == timestamp)
            .ok_or_else(|| PortError::NotFound(format!("alert {vehicle_id}")))?;
        record.appointment_id = Some(appointment_id.to_string());
        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, PortError> {
        Ok(self.diagnoses.lock().iter().rev().take(limit).cloned().collect())
    }

    async fn alert_counts(&self) -> Result<AlertCounts, PortError> {
        let diagnoses = self.diagnoses.lock();
        Ok(AlertCounts {
            frames: self.frames.lock().len() as u64,
            alerts: diagnoses.len() as u64,
            critical: diagnoses.iter().filter(|d| d.diagnosis.severity == Severity::Critical).count() as u64,
        })
    }

    fn name(&self) -> &'static str {
        "recording-store"
    }
}

/// Booking qui numérote les RDV APT-1, APT-2, ...
#[derive(Default)]
pub struct RecordingBooking {
    appointments: Mutex<Vec<Appointment>>,
    signals: Mutex<Vec<ManufacturingSignal>>,
    failing: AtomicBool,
}

impl RecordingBooking {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn requests(&self) -> Vec<AppointmentRequest> {
        self.appointments.lock().iter().map(|a| a.request.clone()).collect()
    }

    pub fn signals(&self) -> Vec<ManufacturingSignal> {
        self.signals.lock().clone()
    }
}

#[async_trait]
impl BookingPort for RecordingBooking {
    async fn record_appointment(&self, request: AppointmentRequest) -> Result<String, PortError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PortError::Rejected("no slot available".into()));
        }
        let mut appointments = self.appointments.lock();
        let appointment_id = format!("APT-{}", appointments.len() + 1);
        appointments.push(Appointment {
            appointment_id: appointment_id.clone(),
            request,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(appointment_id)
    }

    async fn record_manufacturing_signal(&self, signal: ManufacturingSignal) -> Result<(), PortError> {
        self.signals.lock().push(signal);
        Ok(())
    }

    async fn recent_appointments(&self, limit: usize) -> Result<Vec<Appointment>, PortError> {
        Ok(self.appointments.lock().iter().rev().take(limit).cloned().collect())
    }

    async fn booking_counts(&self) -> Result<BookingCounts, PortError> {
        Ok(BookingCounts {
            appointments: self.appointments.lock().len() as u64,
            manufacturing_signals: self.signals.lock().len() as u64,
        })
    }

    fn name(&self) -> &'static str {
        "recording-booking"
    }
}

/// Annuaire : véhicules connus, ou panne totale
#[derive(Default)]
pub struct StubDirectory {
    customers: Mutex<HashMap<String, CustomerRecord>>,
    failing: AtomicBool,
}

impl StubDirectory {
    pub fn insert(&self, vehicle_id: &str, customer: CustomerRecord) {
        self.customers.lock().insert(vehicle_id.to_string(), customer);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl DirectoryPort for StubDirectory {
    async fn resolve_customer(&self, vehicle_id: &str) -> Result<CustomerRecord, PortError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PortError::Unavailable("directory offline".into()));
        }
        self.customers
            .lock()
            .get(vehicle_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(vehicle_id.to_string()))
    }

    fn name(&self) -> &'static str {
        "stub-directory"
    }
}

/// Appel de composition tel que reçu par le notifier
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeCall {
    pub customer: Option<CustomerRecord>,
    pub issues: Vec<Issue>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    composed: Mutex<Vec<ComposeCall>>,
    spoken: Mutex<Vec<String>>,
    audio: Mutex<Option<Vec<u8>>>,
    fail_compose: AtomicBool,
    fail_voice: AtomicBool,
}

impl RecordingNotifier {
    /// Audio rendu par synthesize_voice (None = pas d'audio)
    pub fn set_audio(&self, audio: Option<Vec<u8>>) {
        *self.audio.lock() = audio;
    }

    pub fn set_compose_failing(&self, failing: bool) {
        self.fail_compose.store(failing, Ordering::Relaxed);
    }

    pub fn set_voice_failing(&self, failing: bool) {
        self.fail_voice.store(failing, Ordering::Relaxed);
    }

    pub fn composed(&self) -> Vec<ComposeCall> {
        self.composed.lock().clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn compose_message(&self, customer: Option<&CustomerRecord>, issues: &[Issue]) -> Result<String, PortError> {
        self.composed.lock().push(ComposeCall { customer: customer.cloned(), issues: issues.to_vec() });
        if self.fail_compose.load(Ordering::Relaxed) {
            return Err(PortError::Unavailable("composer offline".into()));
        }
        let who = customer.map(|c| c.name.as_str()).unwrap_or("customer");
        let what: Vec<_> = issues.iter().map(|i| i.description.as_str()).collect();
        Ok(format!("{who}: {}", what.join(", ")))
    }

    async fn synthesize_voice(&self, text: &str) -> Result<Option<Vec<u8>>, PortError> {
        self.spoken.lock().push(text.to_string());
        if self.fail_voice.load(Ordering::Relaxed) {
            return Err(PortError::Unavailable("voice offline".into()));
        }
        Ok(self.audio.lock().clone())
    }

    fn name(&self) -> &'static str {
        "recording-notifier"
    }
}

/// Jeu complet de stubs, garde un handle typé sur chacun pour les assertions
#[derive(Clone, Default)]
pub struct StubPorts {
    pub diagnosis: Arc<ScriptedDiagnosis>,
    pub notifier: Arc<RecordingNotifier>,
    pub booking: Arc<RecordingBooking>,
    pub directory: Arc<StubDirectory>,
    pub store: Arc<RecordingStore>,
}

impl StubPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&self) -> Ports {
        Ports {
            diagnosis: self.diagnosis.clone(),
            notifier: self.notifier.clone(),
            booking: self.booking.clone(),
            directory: self.directory.clone(),
            store: self.store.clone(),
        }
    }
}
