//! Replay automation: drive a [`DebugSession`] by a TOML script against an in-memory engine.
//!
//! Every notification and every request outcome becomes one output line, so a replay
//! output may be compared with a recorded one.

mod engine;
mod script;

pub use engine::{Journal, ScriptedEngine};
pub use script::{EngineScript, Request, Script, ScriptedThreadState, Step};

use crate::debugger::config::SessionConfig;
use crate::debugger::error::Error;
use crate::debugger::mirror::ListUpdate;
use crate::debugger::{proto, DebugSession, SessionBuilder};
use anyhow::Context;
use itertools::Itertools;
use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

/// Run a script, write output lines into `out`.
pub fn run(script: Script, config: SessionConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let journal = Journal::default();
    let (facts_tx, facts_rx) = proto::channel();
    let engine = ScriptedEngine::new(script.engine, facts_tx.clone(), journal.clone());
    let session = SessionBuilder::new(Arc::new(engine))
        .with_config(config)
        .attach(script.initial_state);
    subscribe(&session, &journal);

    writeln!(out, "attach: {}", script.initial_state)?;

    for (step, n) in script.steps.into_iter().zip(1..) {
        match step {
            Step::Request(request) => {
                let outcome = execute(&session, &request);
                journal.push(format!("#{n} {}: {outcome}", request.name()));
            }
            Step::Fact(fact) => facts_tx
                .send(fact)
                .with_context(|| format!("deliver fact of step #{n}"))?,
        }

        // script facts and facts produced by the engine on request, in order of arrival
        while let Some(fact) = facts_rx.poll_fact() {
            let name = fact.name();
            if let Err(e) = session.handle_fact(fact) {
                journal.push(format!("#{n} {name}: {}", describe_error(&e)));
            }
        }

        for line in journal.take() {
            writeln!(out, "{line}")?;
        }
    }

    Ok(())
}

fn subscribe(session: &DebugSession, journal: &Journal) {
    let hub = session.hub();

    let j = journal.clone();
    hub.on_execution_state_changed(move |state| {
        j.push(format!("notify execution_state_changed: {state}"));
        Ok(())
    });

    let j = journal.clone();
    hub.on_modules_updated(move |update| {
        j.push(format!("notify modules_updated: {}", describe_update(update)));
        Ok(())
    });

    let j = journal.clone();
    hub.on_modules_populated(move |update| {
        j.push(format!("notify modules_populated: {}", update.len));
        Ok(())
    });

    let j = journal.clone();
    hub.on_threads_updated(move |update| {
        j.push(format!("notify threads_updated: {}", describe_update(update)));
        Ok(())
    });

    let j = journal.clone();
    hub.on_threads_populated(move |update| {
        j.push(format!("notify threads_populated: {}", update.len));
        Ok(())
    });

    let j = journal.clone();
    hub.on_thread_state_updated(None, move |thread| {
        let pc = thread.state().map(|s| s.pc).unwrap_or_default();
        let mut line = format!(
            "notify thread_state_updated: {thread}, pc {pc}, {} frame(s)",
            thread.frames().len()
        );
        if thread.frames_truncated() {
            line.push_str(" (truncated)");
        }
        j.push(line);
        Ok(())
    });
}

fn execute(session: &DebugSession, request: &Request) -> String {
    let outcome = match request {
        Request::AddBreakpoint { kind, address } => session
            .add_breakpoint(*kind, *address)
            .map(|id| format!("breakpoint {id}")),
        Request::RemoveBreakpoint { id } => session
            .remove_breakpoint(*id)
            .map(|bp| format!("{bp} removed")),
        Request::Pause => session.pause().map(|_| String::new()),
        Request::Resume => session.resume().map(|_| String::new()),
        Request::Step => session.step().map(|_| String::new()),
        Request::RequestThreadState { thread } => {
            session.request_thread_state(*thread).map(|_| String::new())
        }
        Request::Detach => session.detach().map(|_| String::new()),
        Request::Modules => Ok(format!("[{}]", session.modules().iter().join(", "))),
        Request::Threads => Ok(format!("[{}]", session.threads().iter().join(", "))),
        Request::Breakpoints => Ok(format!(
            "[{}]",
            session
                .breakpoints()
                .iter()
                .map(|bp| format!("{bp} hits {}", bp.hit_count()))
                .join(", ")
        )),
    };

    match outcome {
        Ok(out) if out.is_empty() => "ok".to_string(),
        Ok(out) => format!("ok: {out}"),
        Err(e) => describe_error(&e),
    }
}

fn describe_error(e: &Error) -> String {
    format!("error[{}]: {e}", e.kind())
}

fn describe_update<H: Display>(update: &ListUpdate<H>) -> String {
    let mut parts = vec![];
    for (label, handles) in [
        ("inserted", &update.inserted),
        ("updated", &update.updated),
        ("retired", &update.retired),
    ] {
        if !handles.is_empty() {
            parts.push(format!("{label} [{}]", handles.iter().join(", ")));
        }
    }
    parts.push(format!("total {}", update.len));
    parts.join(", ")
}
