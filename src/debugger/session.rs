use crate::debugger::address::Address;
use crate::debugger::breakpoint::{Breakpoint, BreakpointId, BreakpointKind, BreakpointManager};
use crate::debugger::config::SessionConfig;
use crate::debugger::engine::{Engine, EngineFact};
use crate::debugger::error::Error;
use crate::debugger::hub::{log_sink, ErrorSink, NotificationHub};
use crate::debugger::mirror::{MirrorSyncEngine, Module, ModuleHandle, Thread, ThreadHandle};
use crate::debugger::proto::FactReceiver;
use crate::debugger::state::{Command, ExecutionState, ExecutionStateMachine};
use crate::weak_error;
use log::{debug, info, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle, ThreadId};

/// Single mutual exclusion domain for all session mutations.
///
/// Owner thread is remembered while the domain is held, so an attempt to mutate the session
/// from inside a mutation (engine callback, notification subscriber) is rejected
/// instead of deadlocking.
#[derive(Default)]
struct MutationDomain {
    lock: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

struct DomainGuard<'a> {
    domain: &'a MutationDomain,
    _lock: MutexGuard<'a, ()>,
}

impl MutationDomain {
    fn enter(&self) -> Result<DomainGuard<'_>, Error> {
        let me = thread::current().id();
        if *lock(&self.owner) == Some(me) {
            return Err(Error::Reentrancy);
        }
        let guard = lock(&self.lock);
        *lock(&self.owner) = Some(me);
        Ok(DomainGuard {
            domain: self,
            _lock: guard,
        })
    }
}

impl Drop for DomainGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.domain.owner) = None;
    }
}

/// Configures and attaches a [`DebugSession`].
pub struct SessionBuilder {
    engine: Arc<dyn Engine>,
    config: SessionConfig,
    error_sink: ErrorSink,
}

impl SessionBuilder {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            config: SessionConfig::default(),
            error_sink: log_sink(),
        }
    }

    pub fn with_config(self, config: SessionConfig) -> Self {
        Self { config, ..self }
    }

    /// Set a receiver of notification subscriber failures, by default they are logged.
    pub fn with_error_sink(self, error_sink: ErrorSink) -> Self {
        Self { error_sink, ..self }
    }

    /// Attach to a runtime.
    ///
    /// # Arguments
    ///
    /// * `initial`: execution state reported by the engine at attach time
    pub fn attach(self, initial: ExecutionState) -> DebugSession {
        info!(target: "debugger", "session attached, target is {initial}");
        DebugSession {
            breakpoints: RwLock::new(BreakpointManager::new(self.engine.clone())),
            state: RwLock::new(ExecutionStateMachine::new(initial)),
            mirror: MirrorSyncEngine::new(self.config.call_stack_limit),
            hub: NotificationHub::new(self.error_sink),
            domain: MutationDomain::default(),
            engine: self.engine,
            config: self.config,
        }
    }
}

/// Debug session of a single attached runtime.
///
/// All mutations (caller requests and engine facts) are serialized, queries never wait
/// for a mutation to finish and always observe fully applied state.
/// Notifications are delivered synchronously on the thread that performs the mutation.
pub struct DebugSession {
    engine: Arc<dyn Engine>,
    config: SessionConfig,
    domain: MutationDomain,
    state: RwLock<ExecutionStateMachine>,
    breakpoints: RwLock<BreakpointManager>,
    mirror: MirrorSyncEngine,
    hub: NotificationHub,
}

impl DebugSession {
    /// Attach to a runtime with default configuration.
    pub fn attach(engine: Arc<dyn Engine>, initial: ExecutionState) -> Self {
        SessionBuilder::new(engine).attach(initial)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Notification topics of this session.
    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn execution_state(&self) -> ExecutionState {
        read(&self.state).current()
    }

    /// Set a breakpoint, the address is armed when this method returns.
    pub fn add_breakpoint(
        &self,
        kind: BreakpointKind,
        address: Address,
    ) -> Result<BreakpointId, Error> {
        let _domain = self.domain.enter()?;
        self.ensure_alive("add_breakpoint")?;
        debug!(target: "debugger", "request: add {kind} breakpoint at {address}");
        write(&self.breakpoints).add(kind, address)
    }

    /// Remove a breakpoint, the address is disarmed when no other breakpoint remains at it.
    pub fn remove_breakpoint(&self, id: BreakpointId) -> Result<Breakpoint, Error> {
        let _domain = self.domain.enter()?;
        self.ensure_alive("remove_breakpoint")?;
        debug!(target: "debugger", "request: remove breakpoint {id}");
        write(&self.breakpoints).remove(id)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Result<Breakpoint, Error> {
        read(&self.breakpoints)
            .get(id)
            .cloned()
            .ok_or(Error::BreakpointNotFound(id))
    }

    /// All breakpoints ordered by id.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        read(&self.breakpoints).breakpoints()
    }

    pub fn breakpoints_at(&self, address: Address) -> Vec<Breakpoint> {
        read(&self.breakpoints).breakpoints_at(address)
    }

    /// Pause the target, no-op if it is already paused.
    pub fn pause(&self) -> Result<(), Error> {
        self.command(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.command(Command::Resume)
    }

    /// Execute a single step. Target is in `Stepping` state until the engine reports
    /// step completion (or immediately `Paused` again if the engine completes the step in place).
    pub fn step(&self) -> Result<(), Error> {
        self.command(Command::Step)
    }

    fn command(&self, cmd: Command) -> Result<(), Error> {
        let _domain = self.domain.enter()?;
        debug!(target: "debugger", "request: {cmd}");

        if !read(&self.state).prepare(cmd)? {
            return Ok(());
        }

        let step_ack = match cmd {
            Command::Pause => {
                self.engine.pause()?;
                None
            }
            Command::Resume => {
                self.engine.resume()?;
                None
            }
            Command::Step => Some(self.engine.step()?),
        };

        write(&self.state).acknowledge(cmd, step_ack);
        self.notify_state_change();
        Ok(())
    }

    /// Ask the engine for register state and call stack of a thread.
    /// Result arrives later as a `thread_state_updated` notification.
    pub fn request_thread_state(&self, thread: ThreadHandle) -> Result<(), Error> {
        let _domain = self.domain.enter()?;
        self.ensure_alive("request_thread_state")?;
        if !self.mirror.has_thread(thread) {
            return Err(Error::ThreadNotFound(thread));
        }
        debug!(target: "debugger", "request: state of thread {thread}");
        Ok(self.engine.request_thread_state(thread)?)
    }

    /// Point-in-time copy of all known modules in registry order.
    pub fn modules(&self) -> Vec<Module> {
        self.mirror.modules()
    }

    /// Point-in-time copy of all known threads in registry order.
    pub fn threads(&self) -> Vec<Thread> {
        self.mirror.threads()
    }

    pub fn module_by_handle(&self, handle: ModuleHandle) -> Result<Module, Error> {
        self.mirror
            .module(handle)
            .ok_or(Error::ModuleNotFound(handle))
    }

    pub fn thread_by_handle(&self, handle: ThreadHandle) -> Result<Thread, Error> {
        self.mirror
            .thread(handle)
            .ok_or(Error::ThreadNotFound(handle))
    }

    /// Find a loaded module whose image contains an address.
    pub fn module_by_addr(&self, addr: Address) -> Option<Module> {
        self.mirror.module_by_addr(addr)
    }

    /// Apply a fact reported by the engine. Facts must be passed in order of arrival.
    ///
    /// Fact is rejected with `InvalidState` error after the session is stopped,
    /// or if it reports an execution state unreachable from the current one.
    pub fn handle_fact(&self, fact: EngineFact) -> Result<(), Error> {
        let _domain = self.domain.enter()?;
        let result = self.apply_fact(fact);
        self.notify_state_change();
        result
    }

    /// Apply a fact and all facts already queued behind it as a single mutation.
    /// Execution state change is published once, with the final state of the batch.
    fn handle_fact_batch(&self, first: EngineFact, facts: &FactReceiver) -> Result<(), Error> {
        let _domain = self.domain.enter()?;
        weak_error!(self.apply_fact(first), "fact rejected:");
        while !read(&self.state).is_stopped() {
            let Some(fact) = facts.poll_fact() else {
                break;
            };
            weak_error!(self.apply_fact(fact), "fact rejected:");
        }
        self.notify_state_change();
        Ok(())
    }

    /// Apply a fact without publishing execution state change, caller holds the domain.
    fn apply_fact(&self, fact: EngineFact) -> Result<(), Error> {
        if let Err(e) = self.ensure_alive(fact.name()) {
            warn!(target: "debugger", "fact `{}` after session stop ignored", fact.name());
            return Err(e);
        }
        debug!(target: "debugger", "fact: {}", fact.name());

        match fact {
            EngineFact::ExecutionStateChanged { state } => {
                write(&self.state).engine_state(state)?;
                if state == ExecutionState::Stopped {
                    info!(target: "debugger", "target stopped");
                }
            }
            EngineFact::ModulesUpdated { entries } => {
                let update = self.mirror.sync_modules(entries);
                self.hub.publish_modules(update);
            }
            EngineFact::ThreadsUpdated { entries } => {
                let update = self.mirror.sync_threads(entries);
                self.hub.publish_threads(update);
            }
            EngineFact::ThreadStateUpdated {
                thread,
                state,
                frames,
            } => {
                if let Some(thread) = self.mirror.sync_thread_state(thread, state, frames) {
                    self.hub.publish_thread_state(thread);
                }
            }
            EngineFact::BreakpointHit { address } => self.on_breakpoint_hit(address),
        }

        Ok(())
    }

    /// Temporary breakpoints are removed before the pause becomes observable.
    fn on_breakpoint_hit(&self, address: Address) {
        let report = write(&self.breakpoints).hit(address);
        if report.is_unknown() {
            warn!(target: "debugger", "hit at {address} without a breakpoint");
            if !self.config.pause_on_unknown_hit {
                return;
            }
        } else {
            debug!(
                target: "debugger",
                "hit at {address}: {} breakpoint(s), {} temporary removed",
                report.hit.len(),
                report.removed.len()
            );
        }

        write(&self.state).breakpoint_hit();
    }

    /// Detach from the runtime, session moves into terminal `Stopped` state.
    /// Repeated detach is a no-op.
    pub fn detach(&self) -> Result<(), Error> {
        let _domain = self.domain.enter()?;
        if write(&self.state).stop() {
            info!(target: "debugger", "session detached");
        }
        self.notify_state_change();
        Ok(())
    }

    /// Apply facts from channel in order of arrival until the target stops or the channel
    /// closes. Channel loss detaches the session.
    ///
    /// Facts queued while a previous one was being applied (or its subscribers notified)
    /// are applied together, so execution state subscribers observe only the final state.
    pub fn pump(&self, facts: FactReceiver) {
        while let Some(fact) = facts.next_fact() {
            weak_error!(self.handle_fact_batch(fact, &facts), "fact batch rejected:");
            if self.execution_state() == ExecutionState::Stopped {
                return;
            }
        }

        warn!(target: "debugger", "fact channel closed");
        weak_error!(self.detach(), "detach on channel loss:");
    }

    /// Run [`DebugSession::pump`] in a dedicated thread.
    pub fn spawn_pump(self: &Arc<Self>, facts: FactReceiver) -> io::Result<JoinHandle<()>> {
        let session = Arc::clone(self);
        thread::Builder::new()
            .name("rtm-fact-pump".to_string())
            .spawn(move || session.pump(facts))
    }

    fn ensure_alive(&self, op: &'static str) -> Result<(), Error> {
        let state = read(&self.state).current();
        if state == ExecutionState::Stopped {
            return Err(Error::InvalidState { op, state });
        }
        Ok(())
    }

    fn notify_state_change(&self) {
        let changed = write(&self.state).take_changed();
        if let Some(state) = changed {
            self.hub.publish_execution_state(state);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
