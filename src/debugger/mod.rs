pub mod address;
pub mod breakpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod mirror;
pub mod proto;
mod session;
pub mod state;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointKind};
pub use config::SessionConfig;
pub use engine::{Engine, EngineError, EngineFact, StepAck};
pub use error::{Error, ErrorKind};
pub use session::{DebugSession, SessionBuilder};
pub use state::ExecutionState;
