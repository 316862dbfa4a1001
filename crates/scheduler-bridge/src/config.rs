//! Process configuration from environment variables

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Path of the host scheduler's Unix socket (required)
pub const ENV_SOCKET: &str = "SCHEDULER_SOCKET";
/// Shared secret sent with every request (required)
pub const ENV_TOKEN: &str = "SCHEDULER_TOKEN";
/// Numeric id of the conversation this bridge serves (required)
pub const ENV_CONVERSATION_ID: &str = "SCHEDULER_CONVERSATION_ID";
/// Optional log file; stderr only when unset
pub const ENV_LOG_FILE: &str = "SCHEDULER_LOG_FILE";

/// Fixed connect timeout for the scheduler socket
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Startup configuration errors. All of them are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required variables are unset or empty
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// The conversation id is not an integer
    #[error("SCHEDULER_CONVERSATION_ID must be numeric, got '{0}'")]
    InvalidConversationId(String),
}

/// Runtime configuration for one bridge process
#[derive(Clone)]
pub struct BridgeConfig {
    pub socket_path: PathBuf,
    pub token: String,
    pub conversation_id: i64,
    pub log_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl BridgeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup.
    ///
    /// Every required variable is checked before returning, so the error
    /// lists all missing names at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let socket = get(ENV_SOCKET);
        let token = get(ENV_TOKEN);
        let conversation = get(ENV_CONVERSATION_ID);

        let missing: Vec<&'static str> = [
            (ENV_SOCKET, socket.is_none()),
            (ENV_TOKEN, token.is_none()),
            (ENV_CONVERSATION_ID, conversation.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(socket), Some(token), Some(conversation)) = (socket, token, conversation) else {
            return Err(ConfigError::Missing(missing));
        };

        let conversation_id = conversation
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidConversationId(conversation.clone()))?;

        Ok(Self {
            socket_path: PathBuf::from(socket),
            token,
            conversation_id,
            log_file: log_file_from_lookup(&lookup),
            connect_timeout: CONNECT_TIMEOUT,
        })
    }
}

/// Log file location, readable before the rest of the configuration is valid
pub fn log_file_from_env() -> Option<PathBuf> {
    log_file_from_lookup(&|key: &str| std::env::var(key).ok())
}

fn log_file_from_lookup<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_LOG_FILE)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("socket_path", &self.socket_path)
            .field("token", &"<redacted>")
            .field("conversation_id", &self.conversation_id)
            .field("log_file", &self.log_file)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
