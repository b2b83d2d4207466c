//! Client side mirror of runtime modules and threads.

mod module;
mod registry;
mod thread;

pub use module::{Module, ModuleDescriptor, ModuleHandle};
pub use registry::{Registry, Upsert};
pub use thread::{
    CallStackFrame, Thread, ThreadDescriptor, ThreadHandle, ThreadRunState, ThreadStateEntry,
};

use crate::debugger::address::Address;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Entity that mirrors a runtime object described by list entries.
pub trait Mirror: Clone {
    type Handle: Copy + Eq + Hash + Debug;
    type Descriptor;

    fn descriptor_handle(desc: &Self::Descriptor) -> Self::Handle;

    fn from_descriptor(desc: Self::Descriptor) -> Self;

    /// Update volatile fields from a newer list entry. Handle never changes.
    fn refresh(&mut self, desc: Self::Descriptor);

    /// Entity was retired by the runtime (thread exited, module unloaded).
    fn is_retired(&self) -> bool;
}

/// Outcome of a single list reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListUpdate<H> {
    /// New handles, in registry (and engine) order.
    pub inserted: Vec<H>,
    /// Known handles updated in place.
    pub updated: Vec<H>,
    /// Handles retired by this update.
    pub retired: Vec<H>,
    /// Registry length after update.
    pub len: usize,
    /// Registry was empty before this update and is not empty now.
    pub first_population: bool,
}

impl<H> ListUpdate<H> {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.retired.is_empty()
    }
}

/// Reconcile incoming list entries into a registry.
///
/// Known handles are refreshed in place, new handles are appended in the order received.
/// Nothing is ever removed, retirement is reported in [`ListUpdate::retired`].
pub fn reconcile<E: Mirror>(
    registry: &mut Registry<E::Handle, E>,
    entries: Vec<E::Descriptor>,
) -> ListUpdate<E::Handle> {
    let was_empty = registry.is_empty();
    let mut update = ListUpdate {
        inserted: vec![],
        updated: vec![],
        retired: vec![],
        len: 0,
        first_population: false,
    };
    let mut seen = HashSet::with_capacity(entries.len());

    for desc in entries {
        let handle = E::descriptor_handle(&desc);
        match registry.get_mut(&handle) {
            Some(entity) => {
                let was_retired = entity.is_retired();
                entity.refresh(desc);
                if !was_retired && entity.is_retired() {
                    update.retired.push(handle);
                }
                if seen.insert(handle) {
                    update.updated.push(handle);
                }
            }
            None => {
                let entity = E::from_descriptor(desc);
                if entity.is_retired() {
                    update.retired.push(handle);
                }
                registry.upsert(handle, entity);
                seen.insert(handle);
                update.inserted.push(handle);
            }
        }
    }

    update.len = registry.len();
    update.first_population = was_empty && !registry.is_empty();
    update
}

/// Keeps module and thread registries in sync with the runtime.
///
/// Every reconciliation holds the registry write lock for its whole duration,
/// so readers observe either the state before or after an update, never a partial one.
#[derive(Debug)]
pub struct MirrorSyncEngine {
    modules: RwLock<Registry<ModuleHandle, Module>>,
    threads: RwLock<Registry<ThreadHandle, Thread>>,
    call_stack_limit: usize,
}

impl MirrorSyncEngine {
    pub fn new(call_stack_limit: usize) -> Self {
        Self {
            modules: RwLock::default(),
            threads: RwLock::default(),
            call_stack_limit,
        }
    }

    pub fn sync_modules(&self, entries: Vec<ModuleDescriptor>) -> ListUpdate<ModuleHandle> {
        let update = reconcile(&mut *write(&self.modules), entries);
        log_update("modules", &update);
        update
    }

    pub fn sync_threads(&self, entries: Vec<ThreadDescriptor>) -> ListUpdate<ThreadHandle> {
        let update = reconcile(&mut *write(&self.threads), entries);
        log_update("threads", &update);
        update
    }

    /// Store deep state of a known thread, return updated thread copy.
    pub fn sync_thread_state(
        &self,
        handle: ThreadHandle,
        state: ThreadStateEntry,
        frames: Vec<CallStackFrame>,
    ) -> Option<Thread> {
        let limit = self.call_stack_limit;
        let thread = write(&self.threads).update_with(&handle, |thread| {
            thread.apply_state(state, frames, limit);
            thread.clone()
        });
        if thread.is_none() {
            warn!(target: "debugger", "state for unknown thread {handle} ignored");
        }
        thread
    }

    pub fn modules(&self) -> Vec<Module> {
        read(&self.modules).snapshot()
    }

    pub fn threads(&self) -> Vec<Thread> {
        read(&self.threads).snapshot()
    }

    pub fn module(&self, handle: ModuleHandle) -> Option<Module> {
        read(&self.modules).get(&handle).cloned()
    }

    pub fn thread(&self, handle: ThreadHandle) -> Option<Thread> {
        read(&self.threads).get(&handle).cloned()
    }

    pub fn has_thread(&self, handle: ThreadHandle) -> bool {
        read(&self.threads).contains(&handle)
    }

    /// Find a loaded module whose image contains the address.
    pub fn module_by_addr(&self, addr: Address) -> Option<Module> {
        read(&self.modules)
            .iter()
            .find(|m| !m.is_unloaded() && m.contains(addr))
            .cloned()
    }
}

fn log_update<H: Debug>(list: &str, update: &ListUpdate<H>) {
    debug!(
        target: "debugger",
        "{list} synced: {} new, {} updated, {} retired, {} total",
        update.inserted.len(),
        update.updated.len(),
        update.retired.len(),
        update.len
    );
    if update.first_population {
        info!(target: "debugger", "{list} populated with {} entries", update.len);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
