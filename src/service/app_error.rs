// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// connection level errors, fatal to one session only
    #[error("frame too large: {0} bytes pending")]
    FrameTooLarge(usize),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("send nil payload")]
    EmptyPayload,

    #[error("missing write parameter: {0}")]
    MissingParameter(&'static str),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session {0} is closed")]
    SessionClosed(u64),

    /// setup errors, reported to the caller of listen/configure
    #[error("address format error, expected ip:port, got: {0}")]
    AddressFormat(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl AppError {
    /// Errors raised while configuring or binding the server, before any
    /// session exists.
    pub fn is_fatal_to_setup(&self) -> bool {
        matches!(
            self,
            AppError::AddressFormat(_) | AppError::InvalidConfig(_) | AppError::ConfigFileError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors() {
        assert!(AppError::AddressFormat("80".into()).is_fatal_to_setup());
        assert!(AppError::InvalidConfig("zero window".into()).is_fatal_to_setup());
        assert!(!AppError::FrameTooLarge(11).is_fatal_to_setup());
        assert!(!AppError::SessionClosed(1).is_fatal_to_setup());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, AppError::Io(_)));
        assert_eq!(err.to_string(), "io error: pipe");
    }
}
