//! # Scheduler Bridge
//!
//! A small stdio MCP server that lets an agent schedule prompts to run later
//! in its own conversation. Tool calls are relayed as `scheduler.*` RPCs to
//! the host process over a Unix domain socket.
//!
//! ```text
//! agent runtime ──stdin/stdout (MCP)──▶ McpAdapter ──▶ tools ──▶ BridgeClient ──unix socket──▶ host
//! ```
//!
//! ## Tools
//!
//! - `schedule_task`: one-off (`delay_minutes`) or recurring
//!   (`interval_value` + `interval_unit`) tasks
//! - `list_scheduled_tasks`
//! - `cancel_scheduled_task`
//!
//! ## Configuration
//!
//! | variable | meaning |
//! |---|---|
//! | `SCHEDULER_SOCKET` | host socket path (required) |
//! | `SCHEDULER_TOKEN` | shared secret (required) |
//! | `SCHEDULER_CONVERSATION_ID` | numeric conversation id (required) |
//! | `SCHEDULER_LOG_FILE` | optional log file, appended to |
//! | `RUST_LOG` | tracing filter, `info` by default |

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod supervisor;
pub mod tools;

pub use adapter::McpAdapter;
pub use client::{BridgeClient, BridgeClientBuilder, Connector, UnixConnector};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult, ToolError};
pub use tools::{call_tool, catalog, SchedulerRpc, ToolName};
