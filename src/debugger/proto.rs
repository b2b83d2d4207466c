/// Ordered delivery of engine facts from an engine thread to a session
use crate::debugger::engine::EngineFact;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, thiserror::Error)]
#[error("fact channel closed, `{}` not delivered", .0.name())]
pub struct ChannelClosed(pub EngineFact);

/// Engine side of a fact channel, may be cloned between engine threads.
#[derive(Clone)]
pub struct FactSender {
    facts: Sender<EngineFact>,
}

impl FactSender {
    /// Send a fact to the session.
    /// Return [`ChannelClosed`] error with undelivered fact if the session no longer listens.
    pub fn send(&self, fact: EngineFact) -> Result<(), ChannelClosed> {
        self.facts.send(fact).map_err(|e| ChannelClosed(e.0))
    }
}

/// Session side of a fact channel.
pub struct FactReceiver {
    facts: Receiver<EngineFact>,
}

impl FactReceiver {
    /// Wait for the next fact. Return `None` when all senders are gone.
    pub fn next_fact(&self) -> Option<EngineFact> {
        self.facts.recv().ok()
    }

    /// Return already delivered fact or `None`.
    pub fn poll_fact(&self) -> Option<EngineFact> {
        self.facts.try_recv().ok()
    }
}

/// Create a fact channel.
///
/// [`FactSender`] is used at the engine side, every fact sent is delivered in order.
/// [`FactReceiver`] must be passed to [`crate::debugger::DebugSession::pump`],
/// dropping the last sender is treated as the loss of the attached runtime.
pub fn channel() -> (FactSender, FactReceiver) {
    let (tx, rx) = mpsc::channel::<EngineFact>();
    (FactSender { facts: tx }, FactReceiver { facts: rx })
}
