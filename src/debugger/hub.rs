//! Typed publish/subscribe fan-out of session state changes.
//!
//! Delivery is synchronous, in subscription order, on the thread that publishes.
//! A failing (or panicking) subscriber never affects the publisher or other subscribers,
//! its failure goes to the hub error sink.

use crate::debugger::mirror::{ListUpdate, ModuleHandle, Thread, ThreadHandle};
use crate::debugger::state::ExecutionState;
use anyhow::anyhow;
use log::warn;
use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum_macros::Display;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TopicKind {
    ExecutionStateChanged,
    ModulesUpdated,
    ModulesPopulated,
    ThreadsUpdated,
    ThreadsPopulated,
    ThreadStateUpdated,
}

/// Subscription token, used to unsubscribe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Subscription {
    topic: TopicKind,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> TopicKind {
        self.topic
    }
}

#[derive(Debug, thiserror::Error)]
#[error("`{topic}` subscriber #{subscription} failed: {source:#}")]
pub struct SubscriberError {
    pub topic: TopicKind,
    pub subscription: u64,
    pub source: anyhow::Error,
}

pub type ErrorSink = Arc<dyn Fn(SubscriberError) + Send + Sync>;

type Callback<T> = dyn Fn(&T) -> anyhow::Result<()> + Send + Sync;

struct Subscriber<T> {
    id: u64,
    callback: Arc<Callback<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: self.callback.clone(),
        }
    }
}

struct TopicState<T> {
    subscribers: Vec<Subscriber<T>>,
    /// Number of dispatches in progress.
    dispatching: usize,
    /// Unsubscribed while dispatching, removed once dispatch completes.
    deferred: Vec<u64>,
    /// Latest value published during dispatch, coalescing topics only.
    pending: Option<T>,
}

/// Single topic subscriber list.
///
/// A coalescing topic is last-write-wins: values published while a dispatch is in progress
/// overwrite each other and only the latest one is delivered, after the current dispatch.
struct Topic<T> {
    kind: TopicKind,
    coalesce: bool,
    state: Mutex<TopicState<T>>,
}

impl<T> Topic<T> {
    fn new(kind: TopicKind, coalesce: bool) -> Self {
        Self {
            kind,
            coalesce,
            state: Mutex::new(TopicState {
                subscribers: vec![],
                dispatching: 0,
                deferred: vec![],
                pending: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, id: u64, callback: Arc<Callback<T>>) {
        self.lock().subscribers.push(Subscriber { id, callback });
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut state = self.lock();
        let known = state.subscribers.iter().any(|s| s.id == id) && !state.deferred.contains(&id);
        if !known {
            return false;
        }
        if state.dispatching > 0 {
            state.deferred.push(id);
        } else {
            state.subscribers.retain(|s| s.id != id);
        }
        true
    }

    fn len(&self) -> usize {
        let state = self.lock();
        state.subscribers.len() - state.deferred.len()
    }

    fn publish(&self, value: T, sink: &ErrorSink) {
        let mut state = self.lock();
        if self.coalesce && state.dispatching > 0 {
            state.pending = Some(value);
            return;
        }
        state.dispatching += 1;

        let mut value = value;
        loop {
            let subscribers: Vec<_> = state
                .subscribers
                .iter()
                .filter(|s| !state.deferred.contains(&s.id))
                .cloned()
                .collect();
            drop(state);

            for subscriber in &subscribers {
                self.deliver(subscriber, &value, sink);
            }

            state = self.lock();
            match state.pending.take() {
                Some(next) => value = next,
                None => break,
            }
        }

        state.dispatching -= 1;
        if state.dispatching == 0 && !state.deferred.is_empty() {
            let deferred = mem::take(&mut state.deferred);
            state.subscribers.retain(|s| !deferred.contains(&s.id));
        }
    }

    fn deliver(&self, subscriber: &Subscriber<T>, value: &T, sink: &ErrorSink) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(value)));
        let source = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => anyhow!("subscriber panicked: {}", panic_message(&*payload)),
        };
        sink(SubscriberError {
            topic: self.kind,
            subscription: subscriber.id,
            source,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Error sink that writes subscriber failures into the log.
pub fn log_sink() -> ErrorSink {
    Arc::new(|err: SubscriberError| warn!(target: "debugger", "{err}"))
}

/// Publish/subscribe hub, one topic per kind of state change.
pub struct NotificationHub {
    last_id: AtomicU64,
    sink: ErrorSink,
    execution_state_changed: Topic<ExecutionState>,
    modules_updated: Topic<ListUpdate<ModuleHandle>>,
    modules_populated: Topic<ListUpdate<ModuleHandle>>,
    threads_updated: Topic<ListUpdate<ThreadHandle>>,
    threads_populated: Topic<ListUpdate<ThreadHandle>>,
    thread_state_updated: Topic<Thread>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(log_sink())
    }
}

impl NotificationHub {
    pub fn new(sink: ErrorSink) -> Self {
        Self {
            last_id: AtomicU64::new(0),
            sink,
            execution_state_changed: Topic::new(TopicKind::ExecutionStateChanged, true),
            modules_updated: Topic::new(TopicKind::ModulesUpdated, false),
            modules_populated: Topic::new(TopicKind::ModulesPopulated, false),
            threads_updated: Topic::new(TopicKind::ThreadsUpdated, false),
            threads_populated: Topic::new(TopicKind::ThreadsPopulated, false),
            thread_state_updated: Topic::new(TopicKind::ThreadStateUpdated, false),
        }
    }

    fn next_subscription(&self, topic: TopicKind) -> Subscription {
        Subscription {
            topic,
            id: self.last_id.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    pub fn on_execution_state_changed(
        &self,
        f: impl Fn(&ExecutionState) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ExecutionStateChanged);
        self.execution_state_changed.subscribe(sub.id, Arc::new(f));
        sub
    }

    pub fn on_modules_updated(
        &self,
        f: impl Fn(&ListUpdate<ModuleHandle>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ModulesUpdated);
        self.modules_updated.subscribe(sub.id, Arc::new(f));
        sub
    }

    /// Subscribe to the first population of the module list (fired at most once per session).
    pub fn on_modules_populated(
        &self,
        f: impl Fn(&ListUpdate<ModuleHandle>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ModulesPopulated);
        self.modules_populated.subscribe(sub.id, Arc::new(f));
        sub
    }

    pub fn on_threads_updated(
        &self,
        f: impl Fn(&ListUpdate<ThreadHandle>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ThreadsUpdated);
        self.threads_updated.subscribe(sub.id, Arc::new(f));
        sub
    }

    /// Subscribe to the first population of the thread list (fired at most once per session).
    pub fn on_threads_populated(
        &self,
        f: impl Fn(&ListUpdate<ThreadHandle>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ThreadsPopulated);
        self.threads_populated.subscribe(sub.id, Arc::new(f));
        sub
    }

    /// Subscribe to thread deep state updates.
    ///
    /// # Arguments
    ///
    /// * `thread`: if set, only updates of this thread are delivered
    /// * `f`: callback
    pub fn on_thread_state_updated(
        &self,
        thread: Option<ThreadHandle>,
        f: impl Fn(&Thread) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self.next_subscription(TopicKind::ThreadStateUpdated);
        let callback = move |t: &Thread| match thread {
            Some(handle) if handle != t.handle() => Ok(()),
            _ => f(t),
        };
        self.thread_state_updated.subscribe(sub.id, Arc::new(callback));
        sub
    }

    /// Remove a subscription. Return `false` if it is already removed.
    ///
    /// Removing a subscription of the topic that is dispatching right now takes effect
    /// when that dispatch completes.
    pub fn unsubscribe(&self, sub: Subscription) -> bool {
        match sub.topic {
            TopicKind::ExecutionStateChanged => self.execution_state_changed.unsubscribe(sub.id),
            TopicKind::ModulesUpdated => self.modules_updated.unsubscribe(sub.id),
            TopicKind::ModulesPopulated => self.modules_populated.unsubscribe(sub.id),
            TopicKind::ThreadsUpdated => self.threads_updated.unsubscribe(sub.id),
            TopicKind::ThreadsPopulated => self.threads_populated.unsubscribe(sub.id),
            TopicKind::ThreadStateUpdated => self.thread_state_updated.unsubscribe(sub.id),
        }
    }

    pub fn subscriber_count(&self, topic: TopicKind) -> usize {
        match topic {
            TopicKind::ExecutionStateChanged => self.execution_state_changed.len(),
            TopicKind::ModulesUpdated => self.modules_updated.len(),
            TopicKind::ModulesPopulated => self.modules_populated.len(),
            TopicKind::ThreadsUpdated => self.threads_updated.len(),
            TopicKind::ThreadsPopulated => self.threads_populated.len(),
            TopicKind::ThreadStateUpdated => self.thread_state_updated.len(),
        }
    }

    pub fn publish_execution_state(&self, state: ExecutionState) {
        self.execution_state_changed.publish(state, &self.sink);
    }

    /// Publish module list update, followed by first population fact if any.
    pub fn publish_modules(&self, update: ListUpdate<ModuleHandle>) {
        if update.first_population {
            self.modules_updated.publish(update.clone(), &self.sink);
            self.modules_populated.publish(update, &self.sink);
        } else {
            self.modules_updated.publish(update, &self.sink);
        }
    }

    /// Publish thread list update, followed by first population fact if any.
    pub fn publish_threads(&self, update: ListUpdate<ThreadHandle>) {
        if update.first_population {
            self.threads_updated.publish(update.clone(), &self.sink);
            self.threads_populated.publish(update, &self.sink);
        } else {
            self.threads_updated.publish(update, &self.sink);
        }
    }

    pub fn publish_thread_state(&self, thread: Thread) {
        self.thread_state_updated.publish(thread, &self.sink);
    }
}
