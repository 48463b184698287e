/**
 * STORE MÉMOIRE - Stockage télémétrie, diagnostics et RDV en mémoire
 *
 * RÔLE :
 * Implémentation par défaut des ports TelemetryStore et BookingPort.
 * Aucune durabilité : le contenu disparaît avec le process.
 *
 * FONCTIONNEMENT :
 * - Télémétrie brute bornée (les plus anciennes trames sont évincées)
 * - Journaux des alertes, RDV et signaux fabrication bornés eux aussi,
 *   le plus récent en tête
 * - Compteurs cumulés indépendants de l'éviction
 * - IDs de RDV = 8 premiers caractères d'un UUID v4
 */

use super::{AlertCounts, BookingCounts, BookingPort, PortError, TelemetryStore};
use crate::models::{AlertRecord, Appointment, AppointmentRequest, ManufacturingSignal, SensorFrame, Severity};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Default)]
struct Journal {
    telemetry: VecDeque<SensorFrame>,
    frames_total: u64,
    alerts: VecDeque<AlertRecord>,
    alerts_total: u64,
    critical_total: u64,
    appointments: VecDeque<Appointment>,
    appointments_total: u64,
    signals: VecDeque<ManufacturingSignal>,
    signals_total: u64,
}

pub struct InMemoryStore {
    retention: usize,
    alert_retention: usize,
    journal: Mutex<Journal>,
}

impl InMemoryStore {
    pub fn new(retention: usize, alert_retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            alert_retention: alert_retention.max(1),
            journal: Mutex::new(Journal::default()),
        }
    }

    /// Trames conservées, de la plus ancienne à la plus récente
    pub fn telemetry(&self) -> Vec<SensorFrame> {
        self.journal.lock().telemetry.iter().cloned().collect()
    }

    pub fn manufacturing_signals(&self) -> Vec<ManufacturingSignal> {
        self.journal.lock().signals.iter().cloned().collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(10_000, 1_000)
    }
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn persist_frame(&self, frame: &SensorFrame) -> Result<(), PortError> {
        let mut journal = self.journal.lock();
        if journal.telemetry.len() >= self.retention {
            journal.telemetry.pop_front();
        }
        journal.telemetry.push_back(frame.clone());
        journal.frames_total += 1;
        Ok(())
    }

    async fn persist_diagnosis(&self, record: &AlertRecord) -> Result<(), PortError> {
        let mut journal = self.journal.lock();
        journal.alerts.push_front(record.clone());
        journal.alerts.truncate(self.alert_retention);
        journal.alerts_total += 1;
        if record.diagnosis.severity == Severity::Critical {
            journal.critical_total += 1;
        }
        Ok(())
    }

    async fn link_appointment(
        &self,
        vehicle_id: &str,
        timestamp: OffsetDateTime,
        appointment_id: &str,
    ) -> Result<(), PortError> {
        let mut journal = self.journal.lock();
        let record = journal
            .alerts
            .iter_mut()
            .find(|a| a.vehicle_id == vehicle_id && a.timestamp == timestamp)
            .ok_or_else(|| PortError::NotFound(format!("alert {vehicle_id}@{timestamp}")))?;
        record.appointment_id = Some(appointment_id.to_string());
        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, PortError> {
        Ok(self.journal.lock().alerts.iter().take(limit).cloned().collect())
    }

    async fn alert_counts(&self) -> Result<AlertCounts, PortError> {
        let journal = self.journal.lock();
        Ok(AlertCounts {
            frames: journal.frames_total,
            alerts: journal.alerts_total,
            critical: journal.critical_total,
        })
    }

    fn name(&self) -> &'static str {
        "in-memory-store"
    }
}

#[async_trait]
impl BookingPort for InMemoryStore {
    async fn record_appointment(&self, request: AppointmentRequest) -> Result<String, PortError> {
        let mut appointment_id = Uuid::new_v4().simple().to_string();
        appointment_id.truncate(8);
        let appointment = Appointment {
            appointment_id: appointment_id.clone(),
            request,
            created_at: OffsetDateTime::now_utc(),
        };
        let mut journal = self.journal.lock();
        journal.appointments.push_front(appointment);
        journal.appointments.truncate(self.alert_retention);
        journal.appointments_total += 1;
        Ok(appointment_id)
    }

    async fn record_manufacturing_signal(&self, signal: ManufacturingSignal) -> Result<(), PortError> {
        let mut journal = self.journal.lock();
        if journal.signals.len() >= self.alert_retention {
            journal.signals.pop_front();
        }
        journal.signals.push_back(signal);
        journal.signals_total += 1;
        Ok(())
    }

    async fn recent_appointments(&self, limit: usize) -> Result<Vec<Appointment>, PortError> {
        Ok(self.journal.lock().appointments.iter().take(limit).cloned().collect())
    }

    async fn booking_counts(&self) -> Result<BookingCounts, PortError> {
        let journal = self.journal.lock();
        Ok(BookingCounts {
            appointments: journal.appointments_total,
            manufacturing_signals: journal.signals_total,
        })
    }

    fn name(&self) -> &'static str {
        "in-memory-store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, Verdict};

    fn frame(temp: u32) -> SensorFrame {
        SensorFrame::parse("V1", &format!(r#"{{"engine_temp":{temp}}}"#), OffsetDateTime::now_utc()).unwrap()
    }

    #[tokio::test]
    async fn test_telemetry_retention_evicts_oldest() {
        let store = InMemoryStore::new(2, 10);
        for temp in [80, 90, 100] {
            store.persist_frame(&frame(temp)).await.unwrap();
        }
        let kept: Vec<_> = store.telemetry().iter().map(|f| f.number("engine_temp").unwrap()).collect();
        assert_eq!(kept, [90.0, 100.0]);
        assert_eq!(store.alert_counts().await.unwrap().frames, 3);
    }

    #[tokio::test]
    async fn test_alerts_newest_first_and_counted() {
        let store = InMemoryStore::default();
        let now = OffsetDateTime::now_utc();
        store
            .persist_diagnosis(&AlertRecord::new("V1", Verdict::alert(Severity::Warning, 20, vec![]), now))
            .await
            .unwrap();
        store
            .persist_diagnosis(&AlertRecord::new("V2", Verdict::alert(Severity::Critical, 90, vec![]), now))
            .await
            .unwrap();

        let recent = store.recent_alerts(1).await.unwrap();
        assert_eq!(recent[0].vehicle_id, "V2");
        let counts = store.alert_counts().await.unwrap();
        assert_eq!((counts.alerts, counts.critical), (2, 1));
    }

    #[tokio::test]
    async fn test_appointment_ids_are_short_and_listed() {
        let store = InMemoryStore::default();
        let id = store
            .record_appointment(AppointmentRequest {
                vehicle_id: "V1".into(),
                customer_id: None,
                customer_name: Some("Bhaskar".into()),
                slot_time: "Tomorrow 10:00 AM".into(),
                issue_type: None,
                risk_score: None,
                status: AppointmentStatus::Confirmed,
            })
            .await
            .unwrap();
        assert_eq!(id.len(), 8);

        let listed = store.recent_appointments(5).await.unwrap();
        assert_eq!(listed[0].appointment_id, id);
        assert_eq!(store.booking_counts().await.unwrap().appointments, 1);
    }

    fn request(vehicle_id: &str) -> AppointmentRequest {
        AppointmentRequest {
            vehicle_id: vehicle_id.into(),
            customer_id: None,
            customer_name: None,
            slot_time: "Tomorrow 10:00 AM".into(),
            issue_type: Some("Engine Overheating".into()),
            risk_score: Some(85),
            status: AppointmentStatus::PendingConfirmation,
        }
    }

    #[tokio::test]
    async fn test_alert_and_booking_logs_are_bounded() {
        let store = InMemoryStore::new(10, 2);
        let now = OffsetDateTime::now_utc();
        for (i, severity) in [Severity::Critical, Severity::Warning, Severity::Critical].into_iter().enumerate() {
            let vehicle_id = format!("V{i}");
            store
                .persist_diagnosis(&AlertRecord::new(&vehicle_id, Verdict::alert(severity, 50, vec![]), now))
                .await
                .unwrap();
            store.record_appointment(request(&vehicle_id)).await.unwrap();
            store
                .record_manufacturing_signal(ManufacturingSignal {
                    vehicle_model: vehicle_id,
                    issue_type: "Engine Overheating".into(),
                    frequency: 0.15,
                })
                .await
                .unwrap();
        }

        let alerts: Vec<_> = store.recent_alerts(10).await.unwrap().into_iter().map(|a| a.vehicle_id).collect();
        assert_eq!(alerts, ["V2", "V1"]);
        let appointments: Vec<_> = store
            .recent_appointments(10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.request.vehicle_id)
            .collect();
        assert_eq!(appointments, ["V2", "V1"]);
        let models: Vec<_> = store.manufacturing_signals().into_iter().map(|s| s.vehicle_model).collect();
        assert_eq!(models, ["V1", "V2"]);

        // les compteurs restent cumulés malgré l'éviction
        let counts = store.alert_counts().await.unwrap();
        assert_eq!((counts.alerts, counts.critical), (3, 2));
        let bookings = store.booking_counts().await.unwrap();
        assert_eq!((bookings.appointments, bookings.manufacturing_signals), (3, 3));
    }

    #[tokio::test]
    async fn test_link_appointment_updates_the_persisted_alert() {
        let store = InMemoryStore::default();
        let now = OffsetDateTime::now_utc();
        let record = AlertRecord::new("V1", Verdict::alert(Severity::Critical, 90, vec![]), now);
        store.persist_diagnosis(&record).await.unwrap();

        store.link_appointment("V1", now, "a1b2c3d4").await.unwrap();
        assert_eq!(store.recent_alerts(1).await.unwrap()[0].appointment_id.as_deref(), Some("a1b2c3d4"));

        let err = store.link_appointment("V9", now, "a1b2c3d4").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
