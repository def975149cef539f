//! Sidecar Core Library
//!
//! This crate provides the core functionality for Sidecar, including:
//! - Newline-delimited JSON transport over stdio
//! - JSON-RPC 2.0 connection with concurrent dispatch
//! - ACP (Agent Client Protocol) agent server and session management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     sidecar-core                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rpc/          - Line transport, JSON-RPC connection        │
//! │  agent/        - ACP server, sessions, reply source         │
//! │  types/        - Wire-level type definitions                │
//! │  stdio.rs      - Stdin/stdout server entry point            │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod error;
pub mod rpc;
pub mod stdio;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result, RpcError};
pub use types::*;

// Re-export protocol plumbing
pub use rpc::{stdio_transport, LineReader, LineWriter, MethodHandler, RpcConnection};

// Re-export agent components
pub use agent::{AgentServer, CannedReplies, PromptTurn, ReplySource, Session, TurnGuard};

pub use stdio::run_stdio_server;
