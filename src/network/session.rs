use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::network::codec::{FrameCodec, WriteParams};
use crate::network::{Attributes, Connection, HeartTimeWheel};
use crate::utils::WheelEntry;
use crate::{AppError, AppResult, Shutdown};

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Application callbacks of one session.
///
/// All hooks run on the session's read task, one at a time. `on_data` sees
/// frames in arrival order. `on_close` fires exactly once when the read loop
/// ends, whoever closed the session (peer, read error, heart wheel,
/// application or server shutdown), right after `on_error` when the session
/// died on an error. Nothing fires after it.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn on_data(&self, _session: &Arc<Session>, _frame: Bytes) {}

    async fn on_close(&self, _session: &Arc<Session>) {}

    async fn on_error(&self, _session: &Arc<Session>, _err: &AppError) {}
}

struct NoopHandler;

impl SessionHandler for NoopHandler {}

/// One accepted connection.
///
/// The read half is driven by [`Session::read_loop`]; the write half, the
/// handler and the attributes are shared with application code and with the
/// heart wheel.
pub struct Session {
    id: u64,
    peer_addr: SocketAddr,
    closed: AtomicBool,
    cancel: CancellationToken,
    writer: Mutex<Option<BoxedWriter>>,
    codec: Arc<dyn FrameCodec>,
    handler: RwLock<Arc<dyn SessionHandler>>,
    attributes: Attributes,
    heart_wheel: Option<Arc<HeartTimeWheel>>,
}

impl Session {
    pub fn new(
        id: u64,
        peer_addr: SocketAddr,
        writer: BoxedWriter,
        codec: Arc<dyn FrameCodec>,
        heart_wheel: Option<Arc<HeartTimeWheel>>,
    ) -> Arc<Session> {
        let handler: Arc<dyn SessionHandler> = Arc::new(NoopHandler);
        Arc::new(Session {
            id,
            peer_addr,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            writer: Mutex::new(Some(writer)),
            codec,
            handler: RwLock::new(handler),
            attributes: Attributes::new(),
            heart_wheel,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn codec(&self) -> &Arc<dyn FrameCodec> {
        &self.codec
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Installs the hooks, normally from the server's on-connect callback
    /// before the first frame is read.
    pub fn set_handler<H: SessionHandler + 'static>(&self, handler: H) {
        self.set_shared_handler(Arc::new(handler));
    }

    pub fn set_shared_handler(&self, handler: Arc<dyn SessionHandler>) {
        *self.handler.write() = handler;
    }

    fn handler(&self) -> Arc<dyn SessionHandler> {
        self.handler.read().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the session closed and wakes its read loop, which then releases
    /// the socket.
    ///
    /// Only the first call returns `true`. No hook is invoked from here, the
    /// read loop fires `on_close` once it has observed the close.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(wheel) = &self.heart_wheel {
            wheel.unregister(self);
        }
        self.cancel.cancel();
        debug!("session {} from {} closed", self.id, self.peer_addr);
        true
    }

    /// Liveness signal, pushes the heartbeat timeout a full window ahead.
    /// Does nothing when the server runs without heartbeat.
    pub fn heart(self: &Arc<Self>) {
        if let Some(wheel) = &self.heart_wheel {
            wheel.refresh(self);
        }
    }

    /// Encodes `payload` with the session's codec and sends header and payload
    /// in one write.
    pub async fn write(&self, payload: Option<&[u8]>, params: &WriteParams) -> AppResult<usize> {
        if self.is_closed() {
            return Err(AppError::SessionClosed(self.id));
        }
        let data = self.codec.encode(payload, params)?;
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(AppError::SessionClosed(self.id))?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(data.len())
    }

    /// Drives the read side until the session ends, then fires the close
    /// hooks.
    ///
    /// - peer closed: `on_close`
    /// - read or frame error: `on_error` + `on_close`
    /// - closed elsewhere (heart wheel, application) or server shutdown:
    ///   `on_close` once the running `on_data` returned
    pub async fn read_loop<R>(self: Arc<Self>, mut connection: Connection<R>, mut shutdown: Shutdown)
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut failure = None;
        loop {
            let result = tokio::select! {
                res = connection.read_frame() => res,
                _ = self.cancel.cancelled() => {
                    trace!("session {} read loop cancelled", self.id);
                    break;
                }
                _ = shutdown.recv() => {
                    self.close();
                    break;
                }
            };

            match result {
                Ok(Some(frame)) => {
                    if self.is_closed() {
                        break;
                    }
                    self.handler().on_data(&self, frame).await;
                }
                Ok(None) => {
                    if self.close() {
                        debug!("session {} closed by peer", self.id);
                    }
                    break;
                }
                Err(err) => {
                    if self.close() {
                        warn!("session {} read error: {}", self.id, err);
                        failure = Some(err);
                    }
                    break;
                }
            }
        }

        let handler = self.handler();
        if let Some(err) = failure {
            handler.on_error(&self, &err).await;
        }
        handler.on_close(&self).await;
        self.release_writer().await;
    }

    async fn release_writer(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                trace!("session {} shutdown write half: {}", self.id, e);
            }
        }
    }
}

impl WheelEntry for Session {
    fn entry_id(&self) -> u64 {
        self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn is_active(&self) -> bool {
        !self.is_closed()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .field("codec", &self.codec.name())
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::sync::{broadcast, mpsc};

    use super::*;
    use crate::network::codec::{PlainFrameCodec, TargetedFrameCodec};
    use crate::service::CodecConfig;
    use crate::utils::TimeWheel;

    struct Recorder {
        frames: parking_lot::Mutex<Vec<Bytes>>,
        closes: AtomicUsize,
        errors: AtomicUsize,
        events: mpsc::UnboundedSender<&'static str>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<&'static str>) {
            let (events, rx) = mpsc::unbounded_channel();
            let recorder = Recorder {
                events,
                frames: Default::default(),
                closes: Default::default(),
                errors: Default::default(),
            };
            (Arc::new(recorder), rx)
        }
    }

    #[async_trait]
    impl SessionHandler for Recorder {
        async fn on_data(&self, _session: &Arc<Session>, frame: Bytes) {
            self.frames.lock().push(frame);
            let _ = self.events.send("data");
        }

        async fn on_close(&self, _session: &Arc<Session>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send("close");
        }

        async fn on_error(&self, _session: &Arc<Session>, _err: &AppError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send("error");
        }
    }

    struct Harness {
        session: Arc<Session>,
        peer: DuplexStream,
        notify_shutdown: broadcast::Sender<()>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(
        codec: Arc<dyn FrameCodec>,
        handler: Arc<dyn SessionHandler>,
        heart_wheel: Option<Arc<HeartTimeWheel>>,
    ) -> Harness {
        let (local, peer) = duplex(4096);
        let (reader, writer) = tokio::io::split(local);
        let session = Session::new(
            1,
            "127.0.0.1:5000".parse().unwrap(),
            Box::new(writer),
            codec.clone(),
            heart_wheel,
        );
        session.set_shared_handler(handler);
        let connection = Connection::new(reader, codec);
        let (notify_shutdown, _) = broadcast::channel(1);
        let shutdown = Shutdown::subscribe(&notify_shutdown);
        let handle = tokio::spawn(session.clone().read_loop(connection, shutdown));
        Harness {
            session,
            peer,
            notify_shutdown,
            handle,
        }
    }

    fn plain() -> Arc<dyn FrameCodec> {
        Arc::new(PlainFrameCodec::new(CodecConfig {
            max_frame_size: 64,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_frames_then_clean_close() {
        let (recorder, mut events) = Recorder::new();
        let mut harness = start(plain(), recorder.clone(), None);

        harness
            .peer
            .write_all(&[1, 0, 0, 0, 2, b'X', b'Y', 1, 0, 0, 0, 1, b'Z'])
            .await
            .unwrap();
        drop(harness.peer);
        harness.handle.await.unwrap();

        assert_eq!(
            *recorder.frames.lock(),
            vec![Bytes::from_static(b"XY"), Bytes::from_static(b"Z")]
        );
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
        assert!(harness.session.is_closed());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, vec!["data", "data", "close"]);
    }

    #[tokio::test]
    async fn test_frame_too_large_fires_error_then_close() {
        let (recorder, mut events) = Recorder::new();
        let mut harness = start(plain(), recorder.clone(), None);

        // one good frame, then a header declaring 65 bytes
        harness
            .peer
            .write_all(&[1, 0, 0, 0, 1, b'A', 1, 0, 0, 0, 65])
            .await
            .unwrap();
        harness.handle.await.unwrap();

        assert_eq!(*recorder.frames.lock(), vec![Bytes::from_static(b"A")]);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, vec!["data", "error", "close"]);

        // the socket was released, the peer sees end of stream
        let mut rest = Vec::new();
        harness.peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_close_from_outside_fires_close_on_read_task() {
        let (recorder, mut events) = Recorder::new();
        let harness = start(plain(), recorder.clone(), None);

        assert!(harness.session.close());
        assert!(!harness.session.close());
        harness.handle.await.unwrap();

        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
        assert_eq!(events.try_recv(), Ok("close"));
        assert!(events.try_recv().is_err());
        assert!(matches!(
            harness.session.write(Some(&b"late"[..]), &WriteParams::default()).await,
            Err(AppError::SessionClosed(1))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let (recorder, _events) = Recorder::new();
        let harness = start(plain(), recorder.clone(), None);

        harness.notify_shutdown.send(()).unwrap();
        harness.handle.await.unwrap();

        assert!(harness.session.is_closed());
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_single_frame() {
        let codec: Arc<dyn FrameCodec> = Arc::new(TargetedFrameCodec::new(CodecConfig::default()));
        let (recorder, _events) = Recorder::new();
        let mut harness = start(codec, recorder, None);

        let written = harness
            .session
            .write(Some(&b"ABC"[..]), &WriteParams::msg_type(5).with_target(42))
            .await
            .unwrap();
        assert_eq!(written, 15);

        let mut received = [0u8; 15];
        harness.peer.read_exact(&mut received).await.unwrap();
        assert_eq!(
            received,
            [0x01, 0x05, 0x00, 0x03, 0, 0, 0, 0, 0, 0, 0, 0x2A, 0x41, 0x42, 0x43]
        );

        assert!(matches!(
            harness.session.write(Some(&b"x"[..]), &WriteParams::default()).await,
            Err(AppError::MissingParameter(_))
        ));
        harness.session.close();
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_heart_and_close_keep_wheel_consistent() {
        let wheel: Arc<HeartTimeWheel> = Arc::new(TimeWheel::new(3).unwrap());
        let (recorder, _events) = Recorder::new();
        let harness = start(plain(), recorder, Some(wheel.clone()));

        harness.session.heart();
        assert!(wheel.contains(&harness.session));
        harness.session.heart();
        assert_eq!(wheel.len(), 1);

        harness.session.close();
        assert!(wheel.is_empty());
        // a closed session is never put back
        harness.session.heart();
        assert!(wheel.is_empty());
        harness.handle.await.unwrap();
    }
}
