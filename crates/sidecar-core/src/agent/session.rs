//! Session records and prompt-turn lifecycle
//!
//! A session holds at most one live prompt turn. Starting a new turn
//! hands the caller the predecessor's handle so it can cancel it and
//! wait for it to wind down before streaming anything itself.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Handle to a prompt turn that may still be running.
pub struct PromptTurn {
    pub cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl PromptTurn {
    /// Resolve once the turn's guard has been dropped.
    pub async fn wait_done(mut self) {
        // Closed-with-final-value still satisfies the predicate, so a
        // guard dropped before we subscribe cannot strand us here.
        let _ = self.done.wait_for(|done| *done).await;
    }
}

/// Marks the turn finished when dropped, whatever path the turn took
/// out of its handler.
pub struct TurnGuard {
    done: watch::Sender<bool>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let _ = self.done.send(true);
    }
}

/// One conversation with the client.
pub struct Session {
    id: String,
    turn: Option<PromptTurn>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turn: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Install a fresh turn, returning its token, its completion guard,
    /// and the superseded turn if one was still registered.
    pub fn begin_turn(&mut self) -> (CancellationToken, TurnGuard, Option<PromptTurn>) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let previous = self.turn.replace(PromptTurn {
            cancel: cancel.clone(),
            done: done_rx,
        });
        (cancel, TurnGuard { done: done_tx }, previous)
    }

    /// Cancel the registered turn. Returns whether one existed; firing
    /// a token of a turn that already finished is harmless.
    pub fn cancel_turn(&self) -> bool {
        match &self.turn {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
