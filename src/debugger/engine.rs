//! Boundary between the session and the execution engine of the attached runtime.
//!
//! Outbound operations are expressed by the [`Engine`] trait, inbound facts by [`EngineFact`].
//! Both are transport agnostic, a concrete engine adapter decides how they travel.

use crate::debugger::address::Address;
use crate::debugger::mirror::{
    CallStackFrame, ModuleDescriptor, ThreadDescriptor, ThreadHandle, ThreadStateEntry,
};
use crate::debugger::state::ExecutionState;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("address {0} is not mapped")]
    UnmappedAddress(Address),
    #[error("operation `{0}` is not supported by engine")]
    Unsupported(&'static str),
    #[error("{0}")]
    Failed(String),
}

/// Engine answer to a step request.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAck {
    /// Step finished before the request returned, target is paused again.
    #[default]
    Completed,
    /// Step started, completion arrives later as `ExecutionStateChanged(Paused)`.
    InFlight,
}

/// Operations performed by the execution engine on behalf of a session.
///
/// Every call is synchronous: it returns once the engine acknowledged (or refused) the request.
/// Implementations must not call back into the owning session from inside these methods,
/// such calls are rejected with a reentrancy error.
pub trait Engine: Send + Sync {
    /// Arm an address, execution must trap when reaching it.
    fn arm_breakpoint(&self, addr: Address) -> Result<(), EngineError>;

    /// Disarm a previously armed address.
    fn disarm_breakpoint(&self, addr: Address) -> Result<(), EngineError>;

    fn pause(&self) -> Result<(), EngineError>;

    fn resume(&self) -> Result<(), EngineError>;

    fn step(&self) -> Result<StepAck, EngineError>;

    /// Ask the engine to produce a `ThreadStateUpdated` fact for a thread.
    fn request_thread_state(&self, _thread: ThreadHandle) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("request_thread_state"))
    }
}

/// Raw state change facts emitted by the engine, delivered to a session in order.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum EngineFact {
    ExecutionStateChanged {
        state: ExecutionState,
    },
    ModulesUpdated {
        #[serde(default)]
        entries: Vec<ModuleDescriptor>,
    },
    ThreadsUpdated {
        #[serde(default)]
        entries: Vec<ThreadDescriptor>,
    },
    ThreadStateUpdated {
        thread: ThreadHandle,
        state: ThreadStateEntry,
        #[serde(default)]
        frames: Vec<CallStackFrame>,
    },
    BreakpointHit {
        address: Address,
    },
}

impl EngineFact {
    pub fn name(&self) -> &'static str {
        match self {
            EngineFact::ExecutionStateChanged { .. } => "execution_state_changed",
            EngineFact::ModulesUpdated { .. } => "modules_updated",
            EngineFact::ThreadsUpdated { .. } => "threads_updated",
            EngineFact::ThreadStateUpdated { .. } => "thread_state_updated",
            EngineFact::BreakpointHit { .. } => "breakpoint_hit",
        }
    }
}
