use crate::common::{attach, Note};
use rtmirror::debugger::address::Address;
use rtmirror::debugger::mirror::{ModuleDescriptor, ThreadDescriptor};
use rtmirror::debugger::proto;
use rtmirror::debugger::{BreakpointKind, EngineFact, ErrorKind, ExecutionState};

#[test]
fn test_pump_applies_facts_in_order() {
    let ts = attach(ExecutionState::Running);
    let (facts, receiver) = proto::channel();
    let pump = ts.session.spawn_pump(receiver).unwrap();

    facts
        .send(EngineFact::ModulesUpdated {
            entries: vec![ModuleDescriptor::new(1, "xboxkrnl.exe")],
        })
        .unwrap();
    facts
        .send(EngineFact::ThreadsUpdated {
            entries: vec![ThreadDescriptor::new(1, "main")],
        })
        .unwrap();
    facts
        .send(EngineFact::ExecutionStateChanged {
            state: ExecutionState::Paused,
        })
        .unwrap();
    drop(facts);
    pump.join().unwrap();

    let notes: Vec<_> = ts
        .notes
        .take()
        .into_iter()
        .map(|n| match n {
            Note::State(s) => format!("state {s}"),
            Note::Modules(_) => "modules".to_string(),
            Note::ModulesPopulated(_) => "modules populated".to_string(),
            Note::Threads(_) => "threads".to_string(),
            Note::ThreadsPopulated(_) => "threads populated".to_string(),
            Note::ThreadState(_) => "thread state".to_string(),
        })
        .collect();
    assert_eq!(
        notes,
        vec![
            "modules",
            "modules populated",
            "threads",
            "threads populated",
            "state paused",
            "state stopped",
        ]
    );
}

#[test]
fn test_channel_loss_stops_session() {
    let ts = attach(ExecutionState::Paused);
    let id = ts
        .session
        .add_breakpoint(BreakpointKind::Code, Address::new(0x8200_0000))
        .unwrap();

    let (facts, receiver) = proto::channel();
    drop(facts);
    ts.session.pump(receiver);

    assert_eq!(ts.session.execution_state(), ExecutionState::Stopped);
    assert_eq!(ts.notes.take_states(), vec![ExecutionState::Stopped]);

    for result in [
        ts.session.resume(),
        ts.session.step(),
        ts.session.remove_breakpoint(id).map(|_| ()),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
    }
    // state is still readable
    assert_eq!(ts.session.breakpoints().len(), 1);
}

#[test]
fn test_pump_ends_on_stopped_fact() {
    let ts = attach(ExecutionState::Running);
    let (facts, receiver) = proto::channel();
    let pump = ts.session.spawn_pump(receiver).unwrap();

    facts
        .send(EngineFact::ExecutionStateChanged {
            state: ExecutionState::Stopped,
        })
        .unwrap();
    pump.join().unwrap();

    // session no longer listens
    let err = facts
        .send(EngineFact::BreakpointHit {
            address: Address::new(0x10),
        })
        .unwrap_err();
    assert_eq!(err.0.name(), "breakpoint_hit");
    assert_eq!(ts.notes.take_states(), vec![ExecutionState::Stopped]);
}

#[test]
fn test_requests_interleave_with_facts() {
    let ts = attach(ExecutionState::Running);
    let (facts, receiver) = proto::channel();
    let pump = ts.session.spawn_pump(receiver).unwrap();
    // channel stays open until all requests are done
    let keep_open = facts.clone();

    let producer = std::thread::spawn(move || {
        for n in 0..100_u32 {
            facts
                .send(EngineFact::ModulesUpdated {
                    entries: vec![ModuleDescriptor::new(n, format!("m{n}"))],
                })
                .unwrap();
        }
    });

    for n in 0..50_u64 {
        ts.session
            .add_breakpoint(BreakpointKind::Code, Address::new(0x8200_0000 + n * 4))
            .unwrap();
    }
    producer.join().unwrap();
    drop(keep_open);
    pump.join().unwrap();

    assert_eq!(ts.session.modules().len(), 100);
    assert_eq!(ts.session.breakpoints().len(), 50);
    assert_eq!(ts.session.execution_state(), ExecutionState::Stopped);
}

#[test]
fn test_facts_queued_during_slow_dispatch_are_collapsed() {
    let ts = attach(ExecutionState::Running);
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let started_tx = std::sync::Mutex::new(Some(started_tx));
    ts.session.hub().on_execution_state_changed(move |_| {
        if let Some(started) = started_tx.lock().unwrap().take() {
            started.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        Ok(())
    });

    let (facts, receiver) = proto::channel();
    let pump = ts.session.spawn_pump(receiver).unwrap();
    facts
        .send(EngineFact::ExecutionStateChanged {
            state: ExecutionState::Paused,
        })
        .unwrap();

    // first notification is still in progress
    started_rx.recv().unwrap();
    for state in [ExecutionState::Running, ExecutionState::Paused] {
        facts
            .send(EngineFact::ExecutionStateChanged { state })
            .unwrap();
    }
    drop(facts);
    pump.join().unwrap();

    assert_eq!(
        ts.notes.take_states(),
        vec![
            ExecutionState::Paused,
            ExecutionState::Paused,
            ExecutionState::Stopped
        ]
    );
}
