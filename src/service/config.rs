use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub const DEFAULT_RECV_BUFFER_SIZE: usize = 100 * 1024;
pub const DEFAULT_MIN_FREE_SPACE: usize = 10 * 1024;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    /// listen address, `ip:port`, ip may be empty or `*`
    pub listen: String,
    pub max_connection: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            listen: ":8888".to_string(),
            max_connection: 10_000,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// 12 byte header carrying msg type and target id
    Targeted,
    /// 5 byte header, payload only is delivered
    #[default]
    Plain,
}

/// Buffer and frame limits shared by every codec variant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    pub kind: CodecKind,
    /// initial size of the per-session receive buffer
    pub recv_buffer_size: usize,
    /// low-water mark of free tail space that triggers compaction
    pub min_free_space: usize,
    /// ceiling for pending bytes and declared frame lengths
    pub max_frame_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            kind: CodecKind::default(),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.min_free_space == 0 {
            return Err(AppError::InvalidConfig(
                "codec.min_free_space must be greater than 0".into(),
            ));
        }
        if self.min_free_space >= self.recv_buffer_size {
            return Err(AppError::InvalidConfig(format!(
                "codec.min_free_space {} must be less than codec.recv_buffer_size {}",
                self.min_free_space, self.recv_buffer_size
            )));
        }
        if self.max_frame_size == 0 {
            return Err(AppError::InvalidConfig(
                "codec.max_frame_size must be greater than 0".into(),
            ));
        }
        if u32::try_from(self.max_frame_size).is_err() {
            return Err(AppError::InvalidConfig(format!(
                "codec.max_frame_size {} does not fit the 32 bit length field",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// heartbeat window in seconds, 0 disables timeout enforcement
    pub timeout_secs: u64,
}

impl HeartbeatConfig {
    pub fn enabled(&self) -> bool {
        self.timeout_secs > 0
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub codec: CodecConfig,
    pub heartbeat: HeartbeatConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidConfig(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(config::Environment::with_prefix("STONETCP").separator("__"))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.max_connection == 0 {
            return Err(AppError::InvalidConfig(
                "network.max_connection must be greater than 0".into(),
            ));
        }
        self.codec.validate()
    }
}
