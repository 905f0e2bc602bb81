use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::network::{
    parse_listen_address, CodecFactory, Connection, HeartTimeWheel, PlainCodecFactory, Session,
};
use crate::AppError;
use crate::AppResult;

use super::{codec_factory, CodecConfig, ServerConfig, Shutdown};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Interval between two heart wheel ticks unless configured otherwise.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Called on the accept loop for every new session, before its first frame
/// is read. The place to install a [`crate::SessionHandler`].
pub type OnConnect = Arc<dyn Fn(&Arc<Session>) + Send + Sync>;

/// Live sessions of one server, by id.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<u64, Arc<Session>>>,
}

impl SessionRegistry {
    fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id(), session);
    }

    fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

pub struct ServerBuilder {
    codec_factory: Option<Arc<dyn CodecFactory>>,
    codec_config: CodecConfig,
    on_connect: Option<OnConnect>,
    heart_time: Option<u64>,
    tick_interval: Duration,
    max_connections: usize,
    sessions: SessionRegistry,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        ServerBuilder {
            codec_factory: None,
            codec_config: CodecConfig::default(),
            on_connect: None,
            heart_time: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            sessions: SessionRegistry::default(),
        }
    }
}

impl ServerBuilder {
    pub fn codec_factory<F: CodecFactory + 'static>(self, factory: F) -> Self {
        self.shared_codec_factory(Arc::new(factory))
    }

    pub fn shared_codec_factory(mut self, factory: Arc<dyn CodecFactory>) -> Self {
        self.codec_factory = Some(factory);
        self
    }

    /// Limits used by the default codec factory. A custom factory carries its
    /// own.
    pub fn codec_config(mut self, config: CodecConfig) -> Self {
        self.codec_config = config;
        self
    }

    pub fn on_connect<F>(mut self, on_connect: F) -> Self
    where
        F: Fn(&Arc<Session>) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(on_connect));
        self
    }

    /// Heartbeat window in ticks (seconds with the default tick). Sessions
    /// that do not call [`Session::heart`] within it are closed. Without this
    /// call no timeout is enforced.
    pub fn heart_time(mut self, secs: u64) -> Self {
        self.heart_time = Some(secs);
        self
    }

    pub fn tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Shares a registry created up front, so handlers built before the
    /// server can look up other sessions.
    pub fn sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = sessions;
        self
    }

    fn validate(&self) -> AppResult<()> {
        if self.max_connections == 0 {
            return Err(AppError::InvalidConfig(
                "max connections must be greater than 0".into(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(AppError::InvalidConfig(
                "heart wheel tick interval must be greater than 0".into(),
            ));
        }
        if self.codec_factory.is_none() {
            self.codec_config.validate()?;
        }
        Ok(())
    }

    /// Binds the listening socket. Sessions are accepted once
    /// [`Server::run`] is called.
    pub async fn bind(self, addr: &str) -> AppResult<Server> {
        let socket_addr = parse_listen_address(addr)?;
        self.validate()?;
        let heart_wheel = match self.heart_time {
            Some(secs) => Some(Arc::new(HeartTimeWheel::new(secs as usize)?)),
            None => None,
        };

        let listener = match TcpListener::bind(socket_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("Failed to bind server to address: {} - Error: {}", addr, err);
                return Err(err.into());
            }
        };
        let local_addr = listener.local_addr()?;
        info!("tcp server binding to {} for listening", local_addr);

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        let wheel_driver = heart_wheel.as_ref().map(|wheel| {
            wheel.clone().start(
                self.tick_interval,
                Shutdown::subscribe(&notify_shutdown),
            )
        });

        let codec_config = self.codec_config;
        let codec_factory = self
            .codec_factory
            .unwrap_or_else(|| -> Arc<dyn CodecFactory> {
                Arc::new(PlainCodecFactory::new(codec_config))
            });

        Ok(Server {
            listener,
            local_addr,
            codec_factory,
            on_connect: self.on_connect,
            heart_wheel,
            wheel_driver: parking_lot::Mutex::new(wheel_driver),
            sessions: self.sessions,
            limit_connections: Arc::new(Semaphore::new(self.max_connections)),
            notify_shutdown,
            shutdown_complete_tx: parking_lot::Mutex::new(Some(shutdown_complete_tx)),
            shutdown_complete_rx: tokio::sync::Mutex::new(shutdown_complete_rx),
        })
    }

    /// Binds and runs the accept loop until it fails or the server shuts down.
    pub async fn listen(self, addr: &str) -> AppResult<()> {
        let server = self.bind(addr).await?;
        server.run().await
    }
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    codec_factory: Arc<dyn CodecFactory>,
    on_connect: Option<OnConnect>,
    heart_wheel: Option<Arc<HeartTimeWheel>>,
    wheel_driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
    sessions: SessionRegistry,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: parking_lot::Mutex<Option<mpsc::Sender<()>>>,
    shutdown_complete_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Builder preset from a loaded configuration file; the listen address
    /// stays with the caller.
    pub fn from_config(config: &ServerConfig) -> ServerBuilder {
        let builder = Server::builder()
            .codec_config(config.codec)
            .shared_codec_factory(codec_factory(&config.codec))
            .max_connections(config.network.max_connection);
        if config.heartbeat.enabled() {
            builder.heart_time(config.heartbeat.timeout_secs)
        } else {
            builder
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn heart_wheel(&self) -> Option<&Arc<HeartTimeWheel>> {
        self.heart_wheel.as_ref()
    }

    /// Accepts connections until the server shuts down.
    ///
    /// Each connection takes a permit, at most `max_connections` sessions
    /// are open at once. Every session gets a fresh codec from the factory,
    /// is registered in the heart wheel and the session registry, is handed
    /// to the on-connect callback, and then runs its read loop on its own
    /// task.
    ///
    /// # Returns
    /// `Ok(())` after a shutdown, the accept error otherwise.
    pub async fn run(&self) -> AppResult<()> {
        let shutdown_complete_tx = self.shutdown_complete_tx.lock().clone();
        let Some(shutdown_complete_tx) = shutdown_complete_tx else {
            return Err(AppError::Shutdown("server already shut down".into()));
        };
        let mut shutdown = Shutdown::subscribe(&self.notify_shutdown);

        loop {
            let permit = tokio::select! {
                permit = self.limit_connections.clone().acquire_owned() => {
                    permit.map_err(|e| AppError::Shutdown(e.to_string()))?
                }
                _ = shutdown.recv() => break,
            };

            // subscribed before the accept so a shutdown racing it still
            // reaches the new session
            let session_shutdown = Shutdown::subscribe(&self.notify_shutdown);
            let (socket, peer_addr) = tokio::select! {
                res = self.listener.accept() => res.map_err(|err| {
                    error!(cause = %err, "failed to accept");
                    err
                })?,
                _ = shutdown.recv() => break,
            };

            self.spawn_session(
                socket,
                peer_addr,
                permit,
                session_shutdown,
                shutdown_complete_tx.clone(),
            );
        }
        debug!("accept loop received shutdown signal");
        Ok(())
    }

    fn spawn_session(
        &self,
        socket: TcpStream,
        peer_addr: SocketAddr,
        permit: OwnedSemaphorePermit,
        shutdown: Shutdown,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) {
        if let Err(err) = socket.set_nodelay(true) {
            warn!("set nodelay for {} failed: {}", peer_addr, err);
        }
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let codec = self.codec_factory.create();
        let (reader, writer) = socket.into_split();

        let session = Session::new(
            id,
            peer_addr,
            Box::new(writer),
            codec.clone(),
            self.heart_wheel.clone(),
        );
        let connection = Connection::new(reader, codec);
        session.heart();
        self.sessions.insert(session.clone());
        if let Some(on_connect) = &self.on_connect {
            on_connect(&session);
        }
        debug!("accept session {} from {}", id, peer_addr);

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            session.clone().read_loop(connection, shutdown).await;
            sessions.remove(session.id());
            // whether gracefully or unexpectedly closed, release connection
            drop(permit);
            drop(shutdown_complete_tx);
        });
    }

    /// Signals every task of this server to stop and waits until all read
    /// loops and the heart wheel driver have exited. Open sessions get their
    /// close hook.
    pub async fn shutdown(&self) {
        info!("tcp server shutting down, {} sessions open", self.sessions.len());
        let _ = self.notify_shutdown.send(());

        let driver = self.wheel_driver.lock().take();
        if let Some(driver) = driver {
            if let Err(err) = driver.await {
                error!("heart wheel driver failed: {}", err);
            }
        }

        drop(self.shutdown_complete_tx.lock().take());
        // resolves once every sender held by a session task is dropped
        let _ = self.shutdown_complete_rx.lock().await.recv().await;
        info!("tcp server shutdown complete");
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("sessions", &self.sessions.len())
            .field("heart_wheel", &self.heart_wheel.as_ref().map(|w| w.size()))
            .field(
                "available_permits",
                &self.limit_connections.available_permits(),
            )
            .finish()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
