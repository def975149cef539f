//! JSON-RPC plumbing: line transport and connection layer

mod connection;
mod transport;

pub use connection::{MethodHandler, RpcConnection};
pub use transport::{stdio_transport, LineReader, LineWriter};
