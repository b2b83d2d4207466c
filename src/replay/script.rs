use crate::debugger::address::Address;
use crate::debugger::breakpoint::{BreakpointId, BreakpointKind};
use crate::debugger::engine::{EngineFact, StepAck};
use crate::debugger::mirror::{CallStackFrame, ThreadHandle};
use crate::debugger::state::ExecutionState;
use anyhow::Context;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use strum_macros::IntoStaticStr;

/// Replay script: attach state, engine behavior and an ordered list of steps.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub initial_state: ExecutionState,
    #[serde(default)]
    pub engine: EngineScript,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(data: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = read_to_string(path)
            .with_context(|| format!("read replay script {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse replay script {}", path.display()))
    }
}

/// How the scripted engine answers session requests.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineScript {
    /// Addresses the engine refuses to arm or disarm.
    #[serde(default)]
    pub unmapped: Vec<Address>,
    /// Answer to every step request.
    #[serde(default)]
    pub step: StepAck,
    /// Deep thread states produced on request.
    #[serde(default, rename = "thread_state")]
    pub thread_states: Vec<ScriptedThreadState>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScriptedThreadState {
    pub thread: ThreadHandle,
    pub pc: Address,
    #[serde(default)]
    pub stack_pointer: Address,
    #[serde(default)]
    pub frames: Vec<CallStackFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Request(Request),
    Fact(EngineFact),
}

/// Caller request issued against the session.
#[derive(Clone, Debug, Deserialize, IntoStaticStr)]
#[serde(tag = "request", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Request {
    AddBreakpoint {
        kind: BreakpointKind,
        address: Address,
    },
    RemoveBreakpoint {
        id: BreakpointId,
    },
    Pause,
    Resume,
    Step,
    RequestThreadState {
        thread: ThreadHandle,
    },
    Detach,
    Modules,
    Threads,
    Breakpoints,
}

impl Request {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}
