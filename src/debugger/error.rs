use crate::debugger::address::Address;
use crate::debugger::breakpoint::BreakpointId;
use crate::debugger::engine::EngineError;
use crate::debugger::mirror::{ModuleHandle, ThreadHandle};
use crate::debugger::state::ExecutionState;
use strum_macros::Display;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- breakpoint errors -----------------------------------------
    #[error("code breakpoint already set at {0}")]
    DuplicateAddress(Address),

    // --------------------------------- entity not found ------------------------------------------
    #[error("breakpoint {0} not found")]
    BreakpointNotFound(BreakpointId),
    #[error("module {0} not found")]
    ModuleNotFound(ModuleHandle),
    #[error("thread {0} not found")]
    ThreadNotFound(ThreadHandle),

    // --------------------------------- execution state errors ------------------------------------
    #[error("`{op}` is not allowed while target is {state}")]
    InvalidState {
        op: &'static str,
        state: ExecutionState,
    },

    // --------------------------------- engine errors ---------------------------------------------
    #[error("engine rejected request: {0}")]
    EngineRejected(#[from] EngineError),

    // --------------------------------- session errors --------------------------------------------
    #[error("session state is already being mutated by this thread")]
    Reentrancy,
}

/// Coarse error classification, one value per failure class a caller may react to.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ErrorKind {
    DuplicateAddress,
    NotFound,
    InvalidState,
    EngineRejected,
    Reentrancy,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateAddress(_) => ErrorKind::DuplicateAddress,
            Error::BreakpointNotFound(_) => ErrorKind::NotFound,
            Error::ModuleNotFound(_) => ErrorKind::NotFound,
            Error::ThreadNotFound(_) => ErrorKind::NotFound,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::EngineRejected(_) => ErrorKind::EngineRejected,
            Error::Reentrancy => ErrorKind::Reentrancy,
        }
    }

    /// Return a hint to an interface - continue the session after error or stop it.
    /// Every session error is local to the request that produced it, losing the fact
    /// channel is reported as a transition into `Stopped` instead.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::DuplicateAddress(_) => false,
            Error::BreakpointNotFound(_) => false,
            Error::ModuleNotFound(_) => false,
            Error::ThreadNotFound(_) => false,
            Error::InvalidState { .. } => false,
            Error::EngineRejected(_) => false,
            Error::Reentrancy => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}
