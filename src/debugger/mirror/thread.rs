use crate::debugger::address::Address;
use crate::debugger::mirror::Mirror;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Thread identity assigned by the runtime, stable for the thread lifetime.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadHandle(u32);

impl ThreadHandle {
    pub const fn new(raw: u32) -> Self {
        ThreadHandle(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ThreadHandle {
    fn from(raw: u32) -> Self {
        ThreadHandle(raw)
    }
}

impl Display for ThreadHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, strum_macros::Display, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ThreadRunState {
    #[default]
    Ready,
    Running,
    Waiting,
    Suspended,
    Exited,
}

/// Thread list entry as reported by the engine.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ThreadDescriptor {
    pub handle: ThreadHandle,
    #[serde(default)]
    pub thread_id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_host_thread: bool,
    #[serde(default)]
    pub state: ThreadRunState,
}

impl ThreadDescriptor {
    pub fn new(handle: u32, name: impl Into<String>) -> Self {
        Self {
            handle: ThreadHandle::new(handle),
            thread_id: 0,
            name: name.into(),
            is_host_thread: false,
            state: ThreadRunState::default(),
        }
    }

    pub fn with_state(mut self, state: ThreadRunState) -> Self {
        self.state = state;
        self
    }

    pub fn with_thread_id(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }
}

/// Register level state of a thread, produced on explicit request only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ThreadStateEntry {
    pub pc: Address,
    #[serde(default)]
    pub stack_pointer: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallStackFrame {
    pub host_pc: Address,
    #[serde(default)]
    pub guest_pc: Option<Address>,
    #[serde(default)]
    pub function: Option<String>,
}

impl CallStackFrame {
    pub fn new(host_pc: impl Into<Address>) -> Self {
        Self {
            host_pc: host_pc.into(),
            guest_pc: None,
            function: None,
        }
    }
}

/// Client side mirror of a runtime thread.
#[derive(Clone, Debug, PartialEq)]
pub struct Thread {
    handle: ThreadHandle,
    thread_id: u32,
    name: String,
    is_host_thread: bool,
    run_state: ThreadRunState,
    exited: bool,
    state: Option<ThreadStateEntry>,
    frames: Vec<CallStackFrame>,
    frames_truncated: bool,
}

impl Thread {
    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_host_thread(&self) -> bool {
        self.is_host_thread
    }

    pub fn run_state(&self) -> ThreadRunState {
        self.run_state
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Last requested register state, [`None`] until deep state was requested.
    pub fn state(&self) -> Option<&ThreadStateEntry> {
        self.state.as_ref()
    }

    pub fn frames(&self) -> &[CallStackFrame] {
        &self.frames
    }

    pub fn frames_truncated(&self) -> bool {
        self.frames_truncated
    }

    /// Store deep state, keeping at most `limit` innermost frames.
    pub(crate) fn apply_state(
        &mut self,
        state: ThreadStateEntry,
        mut frames: Vec<CallStackFrame>,
        limit: usize,
    ) {
        self.frames_truncated = frames.len() > limit;
        frames.truncate(limit);
        self.state = Some(state);
        self.frames = frames;
    }
}

impl Display for Thread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name: &str = if self.name.is_empty() {
            "<unnamed>"
        } else {
            &self.name
        };
        write!(f, "{name} ({:#X}) [{}]", self.thread_id, self.run_state)
    }
}

impl Mirror for Thread {
    type Handle = ThreadHandle;
    type Descriptor = ThreadDescriptor;

    fn descriptor_handle(desc: &ThreadDescriptor) -> ThreadHandle {
        desc.handle
    }

    fn from_descriptor(desc: ThreadDescriptor) -> Self {
        Self {
            handle: desc.handle,
            thread_id: desc.thread_id,
            name: desc.name,
            is_host_thread: desc.is_host_thread,
            run_state: desc.state,
            exited: desc.state == ThreadRunState::Exited,
            state: None,
            frames: vec![],
            frames_truncated: false,
        }
    }

    fn refresh(&mut self, desc: ThreadDescriptor) {
        debug_assert_eq!(self.handle, desc.handle);
        self.thread_id = desc.thread_id;
        self.name = desc.name;
        self.is_host_thread = desc.is_host_thread;
        // exit is final, late list entries must not revive a thread
        if !self.exited {
            self.run_state = desc.state;
            self.exited = desc.state == ThreadRunState::Exited;
        }
    }

    fn is_retired(&self) -> bool {
        self.exited
    }
}
