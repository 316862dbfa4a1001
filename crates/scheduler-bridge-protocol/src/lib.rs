//! # Scheduler Bridge Protocol
//!
//! Wire types shared by the two surfaces of the scheduler bridge:
//!
//! - **Agent side**: MCP envelopes exchanged with the agent runtime over
//!   stdin/stdout ([`mcp`])
//! - **Host side**: `scheduler.*` RPC messages exchanged with the host
//!   process over a Unix domain socket ([`scheduler`])
//!
//! Both sides use the same newline-delimited JSON framing ([`codec`]): one
//! compact JSON object per line, never a `Content-Length` header.
//!
//! ```
//! use scheduler_bridge_protocol::codec::{encode_line, LineFramer};
//! use scheduler_bridge_protocol::mcp::McpRequest;
//!
//! let mut framer = LineFramer::new();
//! framer.push(br#"{"id":1,"method":"tools/list"}"#);
//! framer.push(b"\n");
//!
//! let line = framer.next_line().unwrap();
//! let request: McpRequest = serde_json::from_str(&line).unwrap();
//! assert_eq!(request.method, "tools/list");
//!
//! let encoded = encode_line(&request).unwrap();
//! assert!(encoded.ends_with(b"\n"));
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod error;
#[allow(missing_docs)]
pub mod mcp;
#[allow(missing_docs)]
pub mod scheduler;

pub use codec::{encode_line, read_lines, LineFramer, LineReader};
pub use error::{CodecError, CodecResult};
pub use mcp::{McpMethod, McpRequest, McpResponse, JSONRPC_VERSION};
pub use scheduler::{
    BridgeRequest, BridgeResponse, CreateTaskParams, IntervalUnit, SchedulerMethod,
    CONVERSATION_ID_KEY,
};
