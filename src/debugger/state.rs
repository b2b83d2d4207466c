use crate::debugger::engine::StepAck;
use crate::debugger::error::Error;
use log::debug;
use serde::Deserialize;
use strum_macros::{Display, IntoStaticStr};

/// Run state of the whole attached target (not per thread).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Display, IntoStaticStr, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Stepping,
    Paused,
    Stopped,
}

impl ExecutionState {
    /// Transition table, `Stopped` is terminal.
    pub fn can_transition_to(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, to),
            (Running, Paused)
                | (Running, Stopped)
                | (Paused, Running)
                | (Paused, Stepping)
                | (Paused, Stopped)
                | (Stepping, Paused)
                | (Stepping, Stopped)
        )
    }
}

/// Caller intents governed by the state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Pause,
    Resume,
    Step,
}

/// Tracks the authoritative execution state and decides which commands are legal.
///
/// The machine counts transitions between two [`ExecutionStateMachine::take_changed`] calls,
/// so an owner may report a burst of transitions as a single change carrying the final state.
#[derive(Debug)]
pub struct ExecutionStateMachine {
    current: ExecutionState,
    pending_transitions: u32,
}

impl ExecutionStateMachine {
    /// Create a machine in the state reported by the engine at attach time.
    pub fn new(initial: ExecutionState) -> Self {
        Self {
            current: initial,
            pending_transitions: 0,
        }
    }

    pub fn current(&self) -> ExecutionState {
        self.current
    }

    pub fn is_stopped(&self) -> bool {
        self.current == ExecutionState::Stopped
    }

    /// Check a command against current state before asking the engine to execute it.
    /// Return `Ok(false)` if command is a legal no-op (pause while already paused).
    pub fn prepare(&self, cmd: Command) -> Result<bool, Error> {
        use ExecutionState::*;
        let proceed = match (cmd, self.current) {
            (Command::Pause, Running | Stepping) => true,
            (Command::Pause, Paused) => false,
            (Command::Resume, Paused) => true,
            (Command::Step, Paused) => true,
            (cmd, state) => {
                return Err(Error::InvalidState {
                    op: cmd.into(),
                    state,
                })
            }
        };
        Ok(proceed)
    }

    /// Apply a command the engine has acknowledged.
    pub fn acknowledge(&mut self, cmd: Command, step_ack: Option<StepAck>) {
        match cmd {
            Command::Pause => self.force(ExecutionState::Paused),
            Command::Resume => self.force(ExecutionState::Running),
            Command::Step => {
                self.force(ExecutionState::Stepping);
                if step_ack.unwrap_or_default() == StepAck::Completed {
                    self.force(ExecutionState::Paused);
                }
            }
        }
    }

    /// Apply an execution state reported by the engine.
    /// Return `Ok(false)` if the target already is in this state.
    pub fn engine_state(&mut self, state: ExecutionState) -> Result<bool, Error> {
        if self.current == state {
            return Ok(false);
        }
        if !self.current.can_transition_to(state) {
            return Err(Error::InvalidState {
                op: "execution_state_changed",
                state: self.current,
            });
        }
        self.force(state);
        Ok(true)
    }

    /// Breakpoint hit moves running or stepping target into `Paused` regardless of any
    /// not yet acknowledged command.
    pub fn breakpoint_hit(&mut self) -> bool {
        match self.current {
            ExecutionState::Running | ExecutionState::Stepping => {
                self.force(ExecutionState::Paused);
                true
            }
            ExecutionState::Paused | ExecutionState::Stopped => false,
        }
    }

    /// Move into the terminal state.
    pub fn stop(&mut self) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.force(ExecutionState::Stopped);
        true
    }

    /// Return final state if any transition happened since the last call.
    pub fn take_changed(&mut self) -> Option<ExecutionState> {
        if self.pending_transitions == 0 {
            return None;
        }
        self.pending_transitions = 0;
        Some(self.current)
    }

    fn force(&mut self, to: ExecutionState) {
        debug_assert!(self.current.can_transition_to(to));
        debug!(target: "debugger", "execution state: {} -> {to}", self.current);
        self.current = to;
        self.pending_transitions += 1;
    }
}
