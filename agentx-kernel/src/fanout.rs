//! Diffusion d'un payload vers tous les dashboards enregistrés.
//!
//! Chaque destinataire est servi indépendamment : file pleine au-delà du délai,
//! socket fermée ou erreur de sérialisation sont absorbées ici et ne remontent
//! jamais vers l'appelant.

use crate::registry::{ConnectionRegistry, Outbound};
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, send_timeout: Duration) -> Self {
        Self { registry, send_timeout }
    }

    pub async fn broadcast<T: Serialize>(&self, payload: &T) -> BroadcastReport {
        let recipients = self.registry.snapshot_dashboards();
        if recipients.is_empty() {
            return BroadcastReport::default();
        }

        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("broadcast payload not serializable: {e}");
                return BroadcastReport { delivered: 0, failed: recipients.len() };
            }
        };

        let deliveries = recipients.iter().map(|session| {
            let item = Outbound::Text(text.clone());
            async move {
                match session.outbound().send_timeout(item, self.send_timeout).await {
                    Ok(()) => true,
                    Err(SendTimeoutError::Closed(_)) => {
                        debug!(session_id = %session.id, "dashboard gone, skipping");
                        false
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!(session_id = %session.id, "dashboard too slow, dropping payload");
                        false
                    }
                }
            }
        });

        let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();
        let report = BroadcastReport { delivered, failed: recipients.len() - delivered };
        debug!(delivered = report.delivered, failed = report.failed, "broadcast done");
        report
    }
}
