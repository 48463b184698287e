/**
 * CONNECTION REGISTRY - Ensemble des sessions vivantes (véhicules + dashboards)
 *
 * RÔLE :
 * Seul état partagé muté par plusieurs tâches. Une entrée existe exactement
 * entre l'acceptation de la connexion et son démontage.
 *
 * FONCTIONNEMENT :
 * - Deux maps SessionId -> Session, une par rôle, sous un seul Mutex court
 * - Snapshots = copies ponctuelles : la diffusion itère sans tenir le lock
 * - Une seule session active par véhicule : la plus récente évince l'ancienne
 * - Registration = garde RAII, le retrait a lieu sur tous les chemins de sortie
 */

use crate::state::{new_state, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Vehicle,
    Dashboard,
}

/// Unité poussée vers le writer d'une connexion
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub role: Role,
    pub vehicle_id: Option<String>,
    outbound: mpsc::Sender<Outbound>,
    evicted: Arc<Notify>,
}

impl Session {
    pub fn vehicle(vehicle_id: impl Into<String>, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: SessionId::new(),
            role: Role::Vehicle,
            vehicle_id: Some(vehicle_id.into()),
            outbound,
            evicted: Arc::new(Notify::new()),
        }
    }

    pub fn dashboard(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: SessionId::new(),
            role: Role::Dashboard,
            vehicle_id: None,
            outbound,
            evicted: Arc::new(Notify::new()),
        }
    }

    pub fn outbound(&self) -> &mpsc::Sender<Outbound> {
        &self.outbound
    }

    /// Signale au handler de cette session qu'il doit s'arrêter
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Se résout quand la session a été évincée (permis conservé si déjà signalé)
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

#[derive(Default)]
struct Live {
    vehicles: HashMap<SessionId, Session>,
    dashboards: HashMap<SessionId, Session>,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    live: Shared<Live>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { live: new_state(Live::default()) }
    }

    /// Ajoute une session ; retourne la session véhicule supplantée s'il y en avait une
    pub fn add(&self, session: Session) -> Option<Session> {
        let mut live = self.live.lock();
        match session.role {
            Role::Dashboard => {
                live.dashboards.insert(session.id, session);
                None
            }
            Role::Vehicle => {
                let displaced_id = live
                    .vehicles
                    .values()
                    .find(|s| s.vehicle_id == session.vehicle_id)
                    .map(|s| s.id);
                let displaced = displaced_id.and_then(|id| live.vehicles.remove(&id));
                live.vehicles.insert(session.id, session);
                displaced
            }
        }
    }

    /// Retrait par id ; id inconnu = no-op
    pub fn remove(&self, id: SessionId) -> bool {
        let mut live = self.live.lock();
        live.vehicles.remove(&id).is_some() || live.dashboards.remove(&id).is_some()
    }

    pub fn snapshot_dashboards(&self) -> Vec<Session> {
        self.live.lock().dashboards.values().cloned().collect()
    }

    pub fn snapshot_vehicles(&self) -> Vec<Session> {
        self.live.lock().vehicles.values().cloned().collect()
    }

    pub fn vehicle_count(&self) -> usize {
        self.live.lock().vehicles.len()
    }

    pub fn dashboard_count(&self) -> usize {
        self.live.lock().dashboards.len()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        let live = self.live.lock();
        live.vehicles.contains_key(&id) || live.dashboards.contains_key(&id)
    }

    /// Enregistre la session et retourne la garde qui la retirera au drop
    pub fn register(&self, session: Session) -> Registration {
        let id = session.id;
        let role = session.role;
        if let Some(displaced) = self.add(session) {
            info!(
                vehicle_id = displaced.vehicle_id.as_deref().unwrap_or_default(),
                old_session = %displaced.id,
                new_session = %id,
                "vehicle reconnected, evicting previous session"
            );
            displaced.evict();
        }
        debug!(session_id = %id, ?role, "session registered");
        Registration { registry: self.clone(), id }
    }
}

/// Garde RAII : la session quitte le registre quand la garde est détruite
pub struct Registration {
    registry: ConnectionRegistry,
    id: SessionId,
}

impl Registration {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!(session_id = %self.id, "session deregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channel() -> mpsc::Sender<Outbound> {
        mpsc::channel(1).0
    }

    #[test]
    fn test_add_remove_and_snapshots() {
        let registry = ConnectionRegistry::new();
        let dash = Session::dashboard(channel());
        let car = Session::vehicle("V1", channel());
        let (dash_id, car_id) = (dash.id, car.id);

        assert!(registry.add(dash).is_none());
        assert!(registry.add(car).is_none());
        assert_eq!(registry.snapshot_dashboards().len(), 1);
        assert_eq!(registry.snapshot_vehicles()[0].vehicle_id.as_deref(), Some("V1"));

        assert!(registry.remove(dash_id));
        assert!(!registry.remove(dash_id));
        assert!(registry.remove(car_id));
        assert_eq!(registry.dashboard_count() + registry.vehicle_count(), 0);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add(Session::dashboard(channel()));
        assert!(!registry.remove(SessionId::new()));
        assert_eq!(registry.dashboard_count(), 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = ConnectionRegistry::new();
        registry.add(Session::dashboard(channel()));
        let snapshot = registry.snapshot_dashboards();
        registry.add(Session::dashboard(channel()));
        registry.remove(snapshot[0].id);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.dashboard_count(), 1);
    }

    #[test]
    fn test_registration_guard_deregisters_on_drop() {
        let registry = ConnectionRegistry::new();
        let guard = registry.register(Session::dashboard(channel()));
        assert!(registry.contains(guard.id()));
        drop(guard);
        assert_eq!(registry.dashboard_count(), 0);
    }

    #[tokio::test]
    async fn test_second_vehicle_session_evicts_first() {
        let registry = ConnectionRegistry::new();
        let first = Session::vehicle("V1", channel());
        let first_handle = first.clone();
        let first_guard = registry.register(first);
        let second_guard = registry.register(Session::vehicle("V1", channel()));

        assert_eq!(registry.vehicle_count(), 1);
        assert!(registry.contains(second_guard.id()));
        tokio::time::timeout(Duration::from_secs(1), first_handle.evicted())
            .await
            .unwrap();

        // le démontage de l'ancienne session ne retire pas la nouvelle
        drop(first_guard);
        assert!(registry.contains(second_guard.id()));
    }

    #[test]
    fn test_concurrent_registrations() {
        let registry = ConnectionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let guard = registry.register(Session::vehicle(format!("V{i}-{j}"), channel()));
                        let _ = registry.snapshot_vehicles();
                        drop(guard);
                    }
                    registry.add(Session::dashboard(channel()));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.vehicle_count(), 0);
        assert_eq!(registry.dashboard_count(), 8);
    }
}
