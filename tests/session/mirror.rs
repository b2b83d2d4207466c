use crate::common::{attach, attach_with, Call, Note};
use rtmirror::debugger::address::Address;
use rtmirror::debugger::mirror::{
    CallStackFrame, ListUpdate, ModuleDescriptor, ModuleHandle, ThreadDescriptor, ThreadHandle,
    ThreadRunState, ThreadStateEntry,
};
use rtmirror::debugger::{EngineFact, ErrorKind, ExecutionState, SessionConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn modules(handles: impl IntoIterator<Item = u32>) -> EngineFact {
    EngineFact::ModulesUpdated {
        entries: handles
            .into_iter()
            .map(|h| {
                ModuleDescriptor::new(h, format!("module_{h}.xex"))
                    .with_range(0x8200_0000_u64 + h as u64 * 0x10_0000, 0x10_0000)
            })
            .collect(),
    }
}

fn module_handles(handles: impl IntoIterator<Item = u32>) -> Vec<ModuleHandle> {
    handles.into_iter().map(ModuleHandle::new).collect()
}

#[test]
fn test_first_population() {
    let ts = attach(ExecutionState::Running);

    ts.session.handle_fact(modules(1..=3)).unwrap();
    assert_eq!(
        ts.notes.take(),
        vec![
            Note::Modules(ListUpdate {
                inserted: module_handles(1..=3),
                updated: vec![],
                retired: vec![],
                len: 3,
                first_population: true,
            }),
            Note::ModulesPopulated(3),
        ]
    );

    ts.session.handle_fact(modules(1..=4)).unwrap();
    assert_eq!(
        ts.notes.take(),
        vec![Note::Modules(ListUpdate {
            inserted: module_handles([4]),
            updated: module_handles(1..=3),
            retired: vec![],
            len: 4,
            first_population: false,
        })]
    );
}

#[test]
fn test_empty_first_update_is_not_population() {
    let ts = attach(ExecutionState::Running);
    ts.session.handle_fact(modules([])).unwrap();
    ts.session.handle_fact(modules([5])).unwrap();

    let populated: Vec<_> = ts
        .notes
        .take()
        .into_iter()
        .filter(|n| matches!(n, Note::ModulesPopulated(_)))
        .collect();
    assert_eq!(populated, vec![Note::ModulesPopulated(1)]);
}

#[test]
fn test_superset_updates_keep_known_prefix() {
    let ts = attach(ExecutionState::Running);
    ts.session.handle_fact(modules([7, 3, 9])).unwrap();
    let first = ts.session.modules();

    ts.session.handle_fact(modules([9, 3, 7, 1])).unwrap();
    ts.session.handle_fact(modules([2, 1, 7])).unwrap();
    ts.session.handle_fact(modules([3, 9, 11, 12])).unwrap();

    let snapshot = ts.session.modules();
    assert_eq!(&snapshot[..first.len()], &first[..]);
    let handles: Vec<_> = snapshot.iter().map(|m| m.handle().as_u32()).collect();
    assert_eq!(handles, vec![7, 3, 9, 1, 2, 11, 12]);
}

#[test]
fn test_lookup_by_handle() {
    let ts = attach(ExecutionState::Running);
    ts.session.handle_fact(modules([1, 2])).unwrap();

    let module = ts.session.module_by_handle(ModuleHandle::new(2)).unwrap();
    assert_eq!(module.name(), "module_2.xex");
    assert_eq!(
        ts.session
            .module_by_addr(Address::new(0x8220_0010))
            .map(|m| m.handle()),
        Some(ModuleHandle::new(2))
    );

    let err = ts
        .session
        .module_by_handle(ModuleHandle::new(3))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = ts
        .session
        .thread_by_handle(ThreadHandle::new(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_thread_retirement() {
    let ts = attach(ExecutionState::Running);
    ts.session
        .handle_fact(EngineFact::ThreadsUpdated {
            entries: vec![
                ThreadDescriptor::new(1, "main").with_state(ThreadRunState::Running),
                ThreadDescriptor::new(2, "audio").with_state(ThreadRunState::Waiting),
            ],
        })
        .unwrap();
    ts.notes.take();

    ts.session
        .handle_fact(EngineFact::ThreadsUpdated {
            entries: vec![ThreadDescriptor::new(2, "audio").with_state(ThreadRunState::Exited)],
        })
        .unwrap();

    match ts.notes.take().as_slice() {
        [Note::Threads(update)] => {
            assert_eq!(update.retired, vec![ThreadHandle::new(2)]);
            assert_eq!(update.updated, vec![ThreadHandle::new(2)]);
            assert_eq!(update.len, 2);
        }
        notes => panic!("unexpected notes {notes:?}"),
    }

    let threads = ts.session.threads();
    assert_eq!(threads.len(), 2);
    assert!(threads[1].is_exited());
    assert!(!threads[0].is_exited());
}

#[test]
fn test_unloaded_module_kept_in_place() {
    let ts = attach(ExecutionState::Running);
    ts.session.handle_fact(modules([1, 2, 3])).unwrap();
    ts.session
        .handle_fact(EngineFact::ModulesUpdated {
            entries: vec![ModuleDescriptor::new(2, "module_2.xex").unloaded()],
        })
        .unwrap();

    let modules = ts.session.modules();
    assert_eq!(modules.len(), 3);
    assert!(modules[1].is_unloaded());
    assert_eq!(ts.session.module_by_addr(Address::new(0x8220_0010)), None);
}

#[test]
fn test_thread_deep_state() {
    let config = SessionConfig {
        call_stack_limit: 2,
        ..SessionConfig::default()
    };
    let ts = attach_with(ExecutionState::Paused, config);
    let main = ThreadHandle::new(1);

    assert_eq!(
        ts.session.request_thread_state(main).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    ts.session
        .handle_fact(EngineFact::ThreadsUpdated {
            entries: vec![
                ThreadDescriptor::new(1, "main"),
                ThreadDescriptor::new(2, "worker"),
            ],
        })
        .unwrap();
    ts.session.request_thread_state(main).unwrap();
    assert_eq!(ts.engine.calls(), vec![Call::ThreadState(main)]);
    assert!(ts.session.thread_by_handle(main).unwrap().state().is_none());

    let filtered = Arc::new(std::sync::Mutex::new(vec![]));
    ts.session.hub().on_thread_state_updated(Some(ThreadHandle::new(2)), {
        let filtered = filtered.clone();
        move |t| {
            filtered.lock().unwrap().push(t.handle());
            Ok(())
        }
    });
    ts.notes.take();

    let frames = (0..4_u64)
        .map(|i| CallStackFrame::new(0x8200_1000 + i * 4))
        .collect();
    ts.session
        .handle_fact(EngineFact::ThreadStateUpdated {
            thread: main,
            state: ThreadStateEntry {
                pc: Address::new(0x8200_1000),
                stack_pointer: Address::new(0x7000_0000),
            },
            frames,
        })
        .unwrap();

    assert_eq!(ts.notes.take(), vec![Note::ThreadState(main)]);
    assert!(filtered.lock().unwrap().is_empty());

    let thread = ts.session.thread_by_handle(main).unwrap();
    assert_eq!(thread.state().unwrap().pc, Address::new(0x8200_1000));
    assert_eq!(thread.frames().len(), 2);
    assert!(thread.frames_truncated());

    // unknown thread state is ignored
    ts.session
        .handle_fact(EngineFact::ThreadStateUpdated {
            thread: ThreadHandle::new(9),
            state: ThreadStateEntry::default(),
            frames: vec![],
        })
        .unwrap();
    assert!(ts.notes.take().is_empty());
}

#[test]
fn test_snapshots_during_concurrent_updates() {
    let ts = attach(ExecutionState::Running);
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let session = ts.session.clone();
        let done = done.clone();
        thread::spawn(move || {
            for n in 1..=200 {
                session.handle_fact(modules(0..n)).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        let snapshot = ts.session.modules();
        for (pos, module) in snapshot.iter().enumerate() {
            assert_eq!(module.handle().as_u32(), pos as u32);
        }
    }
    writer.join().unwrap();
    assert_eq!(ts.session.modules().len(), 200);
}
