//! Shared helpers for midrive-mi integration tests

#![allow(dead_code)]

use midrive_mi::{CommandFactory, DialectKind, Session};
use midrive_testing::{fake_session, FakeDebugger, Responder, Script};
use std::sync::Arc;
use std::time::Duration;

/// Generous bound for things that should happen promptly
pub const PROMPT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    midrive_logging::init_test();
}

/// gdb answers used by most command tests
pub fn gdb_script() -> Script {
    Script::new()
        .on(
            "-thread-select",
            &[r#"^done,new-thread-id="2",frame={level="0",addr="0x401136",func="main"}"#],
        )
        .on("-stack-select-frame", &["^done"])
        .on("-data-evaluate-expression", &[r#"^done,value="42""#])
        .on(
            "-stack-list-frames",
            &[r#"^done,stack=[frame={level="0",func="f"},frame={level="1",func="main"}]"#],
        )
        .on(
            "-gdb-version",
            &[
                r#"~"GNU gdb (GDB) 12.1\n""#,
                r#"~"Copyright (C) 2022 Free Software Foundation, Inc.\n""#,
                "^done",
            ],
        )
}

pub fn factory(kind: DialectKind, responder: Responder) -> (CommandFactory, Arc<Session>, FakeDebugger) {
    init_logging();
    let (session, fake) = fake_session(responder);
    (CommandFactory::for_kind(session.clone(), kind), session, fake)
}

pub fn gdb() -> (CommandFactory, Arc<Session>, FakeDebugger) {
    factory(DialectKind::Gdb, gdb_script().into_responder())
}

/// Commands that change the debugger-side selection
pub fn selects(commands: &[String]) -> Vec<&str> {
    commands
        .iter()
        .map(String::as_str)
        .filter(|c| c.starts_with("-thread-select") || c.starts_with("-stack-select-frame"))
        .collect()
}
