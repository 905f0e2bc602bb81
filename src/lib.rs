mod network;
pub mod service;
mod utils;

pub use network::codec;
pub use network::{
    parse_listen_address, Attributes, BoxedWriter, Connection, HeartTimeWheel, RecvBuffer,
    Session, SessionHandler,
};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, Server, ServerBuilder, ServerConfig,
    SessionRegistry, Shutdown,
};
pub use utils::{TimeWheel, WheelEntry, HEART_WHEEL_POS};
