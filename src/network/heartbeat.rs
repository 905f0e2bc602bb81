use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::network::Session;
use crate::utils::TimeWheel;
use crate::Shutdown;

/// Wheel tracking the liveness of every session of one server.
pub type HeartTimeWheel = TimeWheel<Session>;

impl TimeWheel<Session> {
    /// Spawns the driver advancing the wheel once per `tick`.
    ///
    /// Swept sessions are only closed here. Each read loop observes the close
    /// and fires `on_close` on its own task. The driver exits on server
    /// shutdown.
    pub fn start(self: Arc<Self>, tick: Duration, mut shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick, tick);
            debug!(
                "heart wheel started, {} slots, tick {:?}",
                self.size(),
                tick
            );
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.recv() => {
                        debug!("heart wheel driver received shutdown signal");
                        break;
                    }
                }
                let expired = self.tick();
                if !expired.is_empty() {
                    expire(expired);
                }
            }
        })
    }
}

fn expire(sessions: Vec<Arc<Session>>) {
    info!("heart wheel expired {} sessions", sessions.len());
    for session in sessions {
        if session.close() {
            debug!("session {} heartbeat timeout", session.id());
        }
    }
}
