use crate::debugger::address::Address;
use crate::debugger::engine::{Engine, EngineError, EngineFact, StepAck};
use crate::debugger::mirror::{ThreadHandle, ThreadStateEntry};
use crate::debugger::proto::FactSender;
use crate::replay::script::{EngineScript, ScriptedThreadState};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered replay output shared between the engine, subscribers and the runner.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, line: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    /// Take all lines written since the last call.
    pub fn take(&self) -> Vec<String> {
        mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// In-memory engine that answers requests as the replay script says.
pub struct ScriptedEngine {
    unmapped: Vec<Address>,
    step_ack: StepAck,
    thread_states: Vec<ScriptedThreadState>,
    facts: FactSender,
    journal: Journal,
}

impl ScriptedEngine {
    /// Create an engine.
    ///
    /// # Arguments
    ///
    /// * `script`: engine behavior
    /// * `facts`: channel for facts produced on request (thread deep state)
    /// * `journal`: every accepted call is written here
    pub fn new(script: EngineScript, facts: FactSender, journal: Journal) -> Self {
        Self {
            unmapped: script.unmapped,
            step_ack: script.step,
            thread_states: script.thread_states,
            facts,
            journal,
        }
    }

    fn check_mapped(&self, addr: Address) -> Result<(), EngineError> {
        if self.unmapped.contains(&addr) {
            return Err(EngineError::UnmappedAddress(addr));
        }
        Ok(())
    }
}

impl Engine for ScriptedEngine {
    fn arm_breakpoint(&self, addr: Address) -> Result<(), EngineError> {
        self.check_mapped(addr)?;
        self.journal.push(format!("engine: arm {addr}"));
        Ok(())
    }

    fn disarm_breakpoint(&self, addr: Address) -> Result<(), EngineError> {
        self.check_mapped(addr)?;
        self.journal.push(format!("engine: disarm {addr}"));
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.journal.push("engine: pause".to_string());
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        self.journal.push("engine: resume".to_string());
        Ok(())
    }

    fn step(&self) -> Result<StepAck, EngineError> {
        self.journal.push("engine: step".to_string());
        Ok(self.step_ack)
    }

    fn request_thread_state(&self, thread: ThreadHandle) -> Result<(), EngineError> {
        let scripted = self
            .thread_states
            .iter()
            .find(|s| s.thread == thread)
            .ok_or_else(|| EngineError::Failed(format!("no state scripted for thread {thread}")))?;

        self.journal.push(format!("engine: thread state {thread}"));
        self.facts
            .send(EngineFact::ThreadStateUpdated {
                thread,
                state: ThreadStateEntry {
                    pc: scripted.pc,
                    stack_pointer: scripted.stack_pointer,
                },
                frames: scripted.frames.clone(),
            })
            .map_err(|e| EngineError::Failed(e.to_string()))
    }
}
