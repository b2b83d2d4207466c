use rtmirror::debugger::address::Address;
use rtmirror::debugger::mirror::{ListUpdate, ModuleHandle, ThreadHandle};
use rtmirror::debugger::{
    BreakpointKind, DebugSession, Engine, EngineError, ErrorKind, ExecutionState, SessionBuilder,
    SessionConfig, StepAck,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Arm(Address),
    Disarm(Address),
    Pause,
    Resume,
    Step,
    ThreadState(ThreadHandle),
}

/// Engine that records every accepted call.
#[derive(Default)]
pub struct TestEngine {
    calls: Mutex<Vec<Call>>,
    unmapped: Mutex<Vec<Address>>,
    step_ack: Mutex<StepAck>,
    refuse_commands: AtomicBool,
}

impl TestEngine {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub fn set_unmapped(&self, addr: Address) {
        self.unmapped.lock().unwrap().push(addr);
    }

    pub fn set_step_ack(&self, ack: StepAck) {
        *self.step_ack.lock().unwrap() = ack;
    }

    pub fn refuse_commands(&self, refuse: bool) {
        self.refuse_commands.store(refuse, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_mapped(&self, addr: Address) -> Result<(), EngineError> {
        if self.unmapped.lock().unwrap().contains(&addr) {
            return Err(EngineError::UnmappedAddress(addr));
        }
        Ok(())
    }

    fn check_command(&self) -> Result<(), EngineError> {
        if self.refuse_commands.load(Ordering::SeqCst) {
            return Err(EngineError::Failed("target is busy".to_string()));
        }
        Ok(())
    }
}

impl Engine for TestEngine {
    fn arm_breakpoint(&self, addr: Address) -> Result<(), EngineError> {
        self.check_mapped(addr)?;
        self.record(Call::Arm(addr));
        Ok(())
    }

    fn disarm_breakpoint(&self, addr: Address) -> Result<(), EngineError> {
        self.check_mapped(addr)?;
        self.record(Call::Disarm(addr));
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.check_command()?;
        self.record(Call::Pause);
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        self.check_command()?;
        self.record(Call::Resume);
        Ok(())
    }

    fn step(&self) -> Result<StepAck, EngineError> {
        self.check_command()?;
        self.record(Call::Step);
        Ok(*self.step_ack.lock().unwrap())
    }

    fn request_thread_state(&self, thread: ThreadHandle) -> Result<(), EngineError> {
        self.record(Call::ThreadState(thread));
        Ok(())
    }
}

/// Engine that calls back into its own session from every command.
#[derive(Default)]
pub struct ReentrantEngine {
    session: Mutex<Weak<DebugSession>>,
    errors: Mutex<Vec<ErrorKind>>,
}

impl ReentrantEngine {
    pub fn attach(initial: ExecutionState) -> (Arc<Self>, Arc<DebugSession>) {
        let engine = Arc::new(ReentrantEngine::default());
        let session = Arc::new(DebugSession::attach(engine.clone(), initial));
        *engine.session.lock().unwrap() = Arc::downgrade(&session);
        (engine, session)
    }

    /// Error kinds returned to the engine by the session.
    pub fn errors(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().clone()
    }

    fn call_session(&self, f: impl FnOnce(&DebugSession) -> Result<(), rtmirror::debugger::Error>) {
        let Some(session) = self.session.lock().unwrap().upgrade() else {
            return;
        };
        if let Err(e) = f(&session) {
            self.errors.lock().unwrap().push(e.kind());
        }
    }
}

impl Engine for ReentrantEngine {
    fn arm_breakpoint(&self, addr: Address) -> Result<(), EngineError> {
        self.call_session(|s| s.add_breakpoint(BreakpointKind::Code, addr).map(|_| ()));
        Ok(())
    }

    fn disarm_breakpoint(&self, _: Address) -> Result<(), EngineError> {
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.call_session(|s| s.resume());
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn step(&self) -> Result<StepAck, EngineError> {
        self.call_session(|s| s.detach());
        Ok(StepAck::Completed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Note {
    State(ExecutionState),
    Modules(ListUpdate<ModuleHandle>),
    ModulesPopulated(usize),
    Threads(ListUpdate<ThreadHandle>),
    ThreadsPopulated(usize),
    ThreadState(ThreadHandle),
}

/// Subscriber of every session topic.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Note>>>);

impl Recorder {
    pub fn subscribe(session: &DebugSession) -> Self {
        let recorder = Recorder::default();
        let hub = session.hub();

        let r = recorder.clone();
        hub.on_execution_state_changed(move |s| r.push(Note::State(*s)));
        let r = recorder.clone();
        hub.on_modules_updated(move |u| r.push(Note::Modules(u.clone())));
        let r = recorder.clone();
        hub.on_modules_populated(move |u| r.push(Note::ModulesPopulated(u.len)));
        let r = recorder.clone();
        hub.on_threads_updated(move |u| r.push(Note::Threads(u.clone())));
        let r = recorder.clone();
        hub.on_threads_populated(move |u| r.push(Note::ThreadsPopulated(u.len)));
        let r = recorder.clone();
        hub.on_thread_state_updated(None, move |t| r.push(Note::ThreadState(t.handle())));

        recorder
    }

    fn push(&self, note: Note) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(note);
        Ok(())
    }

    /// Take notes recorded since the last call.
    pub fn take(&self) -> Vec<Note> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    /// Take execution state notes only, others are dropped.
    pub fn take_states(&self) -> Vec<ExecutionState> {
        self.take()
            .into_iter()
            .filter_map(|n| match n {
                Note::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

pub struct TestSession {
    pub engine: Arc<TestEngine>,
    pub session: Arc<DebugSession>,
    pub notes: Recorder,
}

pub fn attach(initial: ExecutionState) -> TestSession {
    attach_with(initial, SessionConfig::default())
}

pub fn attach_with(initial: ExecutionState, config: SessionConfig) -> TestSession {
    let engine = Arc::new(TestEngine::default());
    let session = Arc::new(
        SessionBuilder::new(engine.clone())
            .with_config(config)
            .attach(initial),
    );
    let notes = Recorder::subscribe(&session);
    TestSession {
        engine,
        session,
        notes,
    }
}
