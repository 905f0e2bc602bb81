pub use app_error::{AppError, AppResult};
pub use config::{
    CodecConfig, CodecKind, HeartbeatConfig, NetworkConfig, ServerConfig,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MIN_FREE_SPACE, DEFAULT_RECV_BUFFER_SIZE,
};
pub use server::{
    OnConnect, Server, ServerBuilder, SessionRegistry, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_TICK_INTERVAL,
};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

pub(crate) use crate::network::codec_factory;

mod app_error;
mod config;
mod server;
mod shutdown;
mod tracing_config;
