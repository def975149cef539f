//! ACP agent: session state machine and reply generation

mod reply;
mod server;
mod session;

pub use reply::{CannedReplies, ReplySource};
pub use server::AgentServer;
pub use session::{PromptTurn, Session, TurnGuard};
