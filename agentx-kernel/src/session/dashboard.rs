use super::{Inbound, TransportError};
use crate::pipeline::Pipeline;
use crate::registry::{Outbound, Registration, Session, SessionId};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardState {
    Connected,
    Listening,
    Closed,
}

/// Session dashboard : passive, tout le contenu arrive par la diffusion
pub struct DashboardSession {
    registration: Registration,
    state: DashboardState,
}

impl DashboardSession {
    pub fn accept(pipeline: &Pipeline, outbound: mpsc::Sender<Outbound>) -> Self {
        let mut this = Self {
            registration: pipeline.registry.register(Session::dashboard(outbound)),
            state: DashboardState::Connected,
        };
        info!(session_id = %this.registration.id(), "dashboard connected");
        this.state = DashboardState::Listening;
        this
    }

    pub fn id(&self) -> SessionId {
        self.registration.id()
    }

    pub fn state(&self) -> DashboardState {
        self.state
    }

    pub async fn run<S>(mut self, mut inbound: S) -> DashboardState
    where
        S: Stream<Item = Result<Inbound, TransportError>> + Unpin,
    {
        while let Some(item) = inbound.next().await {
            match item {
                Ok(Inbound::Close) => break,
                // keepalive / contrôle : lu puis ignoré
                Ok(_) => {}
                Err(e) => {
                    debug!(session_id = %self.id(), "dashboard transport ended: {e}");
                    break;
                }
            }
        }
        self.state = DashboardState::Closed;
        info!(session_id = %self.id(), "dashboard disconnected");
        self.state
    }
}
