//! Command factory scenarios against a scripted debugger

mod common;

use common::{factory, gdb, gdb_script, init_logging, selects, PROMPT};
use midrive_config::SessionConfig;
use midrive_mi::{
    AsyncClass, BreakLocation, BreakOptions, Checksum, CommandFactory, DialectKind, Error,
    ExceptionBreakState, ExceptionCategory, HashAlgorithm, PrintValues, SessionEvent,
    SessionOptions, TargetArchitecture, ValueError,
};
use midrive_testing::{fake_session_with, Script};
use std::sync::Arc;

async fn wait_for(events: &mut tokio::sync::mpsc::Receiver<SessionEvent>, class: AsyncClass) {
    loop {
        match tokio::time::timeout(PROMPT, events.recv()).await.unwrap() {
            Some(SessionEvent::Async(record)) if record.class == class => return,
            Some(_) => {}
            None => panic!("event stream ended before {}", class),
        }
    }
}

async fn wait_for_stop(events: &mut tokio::sync::mpsc::Receiver<SessionEvent>) {
    wait_for(events, AsyncClass::Stopped).await
}

#[tokio::test]
async fn test_second_evaluate_in_same_context_selects_nothing() {
    let (gdb, _session, fake) = gdb();

    assert_eq!(gdb.data_evaluate_expression("x", 2, 0).await.unwrap(), "42");
    assert_eq!(gdb.data_evaluate_expression("y", 2, 0).await.unwrap(), "42");

    assert_eq!(
        fake.commands(),
        vec![
            "-thread-select 2",
            r#"-data-evaluate-expression "x""#,
            r#"-data-evaluate-expression "y""#,
        ]
    );
}

#[tokio::test]
async fn test_frame_change_selects_only_the_frame() {
    let (gdb, _session, fake) = gdb();

    gdb.data_evaluate_expression("x", 2, 0).await.unwrap();
    gdb.data_evaluate_expression("x", 2, 3).await.unwrap();
    gdb.data_evaluate_expression("x", 2, 3).await.unwrap();

    assert_eq!(
        selects(&fake.commands()),
        vec!["-thread-select 2", "-stack-select-frame 3"]
    );
}

#[tokio::test]
async fn test_stop_event_forces_reselect() {
    let (gdb, session, fake) = gdb();
    let mut events = session.subscribe().await;

    gdb.data_evaluate_expression("x", 5, 0).await.unwrap();
    let before = session.context().generation();

    fake.emit(r#"*stopped,reason="breakpoint-hit",thread-id="5",frame={level="0",func="main"}"#)
        .await;
    wait_for_stop(&mut events).await;
    assert!(session.context().generation() > before);

    gdb.data_evaluate_expression("x", 5, 0).await.unwrap();
    assert_eq!(
        selects(&fake.commands()),
        vec!["-thread-select 5", "-thread-select 5"]
    );
}

#[tokio::test]
async fn test_thread_info_teaches_the_cache_its_thread() {
    let script = gdb_script().on(
        "-thread-info",
        &[r#"^done,threads=[{id="3",target-id="Thread 0x7f"}],current-thread-id="3""#],
    );
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());

    let info = gdb.thread_info().await.unwrap();
    assert_eq!(info.current_thread_id, Some(3));
    assert_eq!(info.threads.len(), 1);

    gdb.data_evaluate_expression("x", 3, 0).await.unwrap();
    // thread known, frame unknown
    assert_eq!(selects(&fake.commands()), vec!["-stack-select-frame 0"]);
}

#[tokio::test]
async fn test_flag_style_dialect_appends_context() {
    let script = Script::new().on("-data-evaluate-expression", &[r#"^done,value="7""#]);
    let (lldb, _session, fake) = factory(DialectKind::Lldb, script.into_responder());

    assert_eq!(lldb.data_evaluate_expression("n", 2, 1).await.unwrap(), "7");
    lldb.exec_step(2).await.unwrap_err();

    let commands = fake.commands();
    assert_eq!(
        commands[0],
        r#"-data-evaluate-expression "n" --thread 2 --frame 1"#
    );
    assert_eq!(commands[1], "-exec-step --thread 2");
    assert!(selects(&commands).is_empty());
}

#[tokio::test]
async fn test_capability_gate_sends_nothing() {
    let (lldb, _session, fake) = factory(DialectKind::Lldb, Script::new().into_responder());

    let err = lldb.break_watch(0x601040, 4).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotSupported {
            dialect: "LLDB",
            operation: "data breakpoints"
        }
    ));
    assert!(lldb
        .set_exception_breakpoints(ExceptionCategory::Clr, None, ExceptionBreakState::THROWN)
        .await
        .is_err());
    assert!(lldb.catch("throw", false).await.is_err());

    let location = BreakLocation::Line {
        file: "a.c".to_string(),
        line: 3,
    };
    let options = BreakOptions {
        checksums: vec![Checksum::new(HashAlgorithm::Md5, vec![0xab; 16])],
        ..BreakOptions::default()
    };
    assert!(matches!(
        lldb.break_insert(&location, &options).await,
        Err(Error::NotSupported { .. })
    ));

    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_version_probe_runs_once_for_concurrent_callers() {
    let (gdb, _session, fake) = gdb();
    let gdb = Arc::new(gdb);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let gdb = gdb.clone();
        tasks.push(tokio::spawn(async move { gdb.version().await }));
    }
    for task in tasks {
        let version = task.await.unwrap().unwrap();
        assert_eq!((version.major, version.minor), (12, 1));
    }

    gdb.enable_target_async().await.unwrap();

    let commands = fake.commands();
    assert_eq!(
        commands.iter().filter(|c| *c == "-gdb-version").count(),
        1
    );
    assert_eq!(commands.last().map(String::as_str), Some("-gdb-set mi-async on"));
}

#[tokio::test]
async fn test_old_gdb_uses_target_async() {
    let script = Script::new().on(
        "-gdb-version",
        &[r#"~"GNU gdb (GDB) 7.6.1\n""#, "^done"],
    );
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());
    gdb.enable_target_async().await.unwrap();
    assert_eq!(
        fake.commands(),
        vec!["-gdb-version", "-gdb-set target-async on"]
    );
}

#[tokio::test]
async fn test_clrdbg_has_no_version_probe() {
    let (clrdbg, _session, fake) = factory(DialectKind::Clrdbg, Script::new().into_responder());
    assert!(matches!(
        clrdbg.version().await,
        Err(Error::NotSupported { dialect: "clrdbg", .. })
    ));
    clrdbg.enable_target_async().await.unwrap();
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_stack_frames_projection() {
    let (gdb, _session, _fake) = gdb();
    let frames = gdb.stack_list_frames(2, 0, 1).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].func.as_deref(), Some("f"));
    assert_eq!(frames[1].level, 1);
}

#[tokio::test]
async fn test_stack_arguments_empty_list() {
    let script = gdb_script().on("-stack-list-arguments", &["^done,stack-args=[]"]);
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());
    let args = gdb
        .stack_list_arguments(PrintValues::SimpleValues, 2, 0, 5)
        .await
        .unwrap();
    assert!(args.is_empty());
    assert_eq!(fake.commands().last().map(String::as_str), Some("-stack-list-arguments 2 0 5"));
}

#[tokio::test]
async fn test_debugger_error_is_structured() {
    let script = gdb_script().on(
        "-data-evaluate-expression",
        &[r#"^error,msg="No symbol \"nope\" in current context.""#],
    );
    let (gdb, _session, _fake) = factory(DialectKind::Gdb, script.into_responder());
    match gdb.data_evaluate_expression("nope", 2, 0).await {
        Err(Error::Debugger { msg, .. }) => {
            assert_eq!(msg, "No symbol \"nope\" in current context.")
        }
        other => panic!("expected debugger error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_architecture_from_console() {
    let script = Script::new().on(
        r#"-interpreter-exec console "show architecture""#,
        &[
            r#"~"The target architecture is set to \"auto\" (currently \"i386:x86-64\").\n""#,
            "^done",
        ],
    );
    let (gdb, _session, _fake) = factory(DialectKind::Gdb, script.into_responder());
    assert_eq!(gdb.target_architecture().await.unwrap(), TargetArchitecture::X64);

    let (clrdbg, _session, fake) = factory(DialectKind::Clrdbg, Script::new().into_responder());
    assert_eq!(
        clrdbg.target_architecture().await.unwrap(),
        TargetArchitecture::X64
    );
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_start_addresses_for_line() {
    let script = Script::new().on(
        "-interpreter-exec console \"info line",
        &[
            r#"~"Line 12 of \"a.c\" starts at address 0x401126 <main+4> and ends at 0x40112d <main+11>.\n""#,
            "^done",
        ],
    );
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());
    assert_eq!(
        gdb.start_addresses_for_line("a.c", 12).await.unwrap(),
        Some(vec![0x401126])
    );
    assert_eq!(
        fake.commands(),
        vec![r#"-interpreter-exec console "info line a.c:12""#]
    );

    let (lldb, _session, fake) = factory(DialectKind::Lldb, Script::new().into_responder());
    assert_eq!(lldb.start_addresses_for_line("a.c", 12).await.unwrap(), None);
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_clrdbg_refuses_to_run_a_core_dump() {
    init_logging();
    let (session, fake) = fake_session_with(
        Script::new().into_responder(),
        SessionConfig::default(),
        SessionOptions {
            core_dump: true,
            ..SessionOptions::default()
        },
    );
    let clrdbg = CommandFactory::for_kind(session, DialectKind::Clrdbg);
    assert!(matches!(clrdbg.exec_run().await, Err(Error::InvalidState(_))));
    assert!(matches!(
        clrdbg.exec_continue().await,
        Err(Error::InvalidState(_))
    ));
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_clrdbg_exception_breakpoints() {
    let script = Script::new()
        .on(
            "-break-exception-insert",
            &[r#"^done,bkpt=[{number="11"},{number="12"}]"#],
        )
        .on("-break-exception-delete", &["^done"]);
    let (clrdbg, _session, fake) = factory(DialectKind::Clrdbg, script.into_responder());

    let names = vec!["System.Exception".to_string(), "System.IO.IOException".to_string()];
    let ids = clrdbg
        .set_exception_breakpoints(
            ExceptionCategory::Clr,
            Some(names.as_slice()),
            ExceptionBreakState::THROWN,
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![11, 12]);
    clrdbg.remove_exception_breakpoints(&ids).await.unwrap();

    assert_eq!(
        fake.commands(),
        vec![
            "-break-exception-insert throw System.Exception System.IO.IOException",
            "-break-exception-delete 11 12",
        ]
    );
}

#[tokio::test]
async fn test_gdb_terminate_and_watch() {
    let script = Script::new()
        .on("-break-watch", &[r#"^done,wpt={number="4",exp="*(int*)(0x601040)"}"#])
        .on("kill", &["^done"]);
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());

    let wpt = gdb.break_watch(0x601040, 4).await.unwrap();
    assert_eq!(midrive_mi::Lookup::find_str(&wpt, "number").unwrap(), "4");
    gdb.terminate().await.unwrap();

    assert_eq!(
        fake.commands(),
        vec!["-break-watch *(int*)(0x601040)", "kill"]
    );
}

#[tokio::test]
async fn test_gdb_refuses_context_commands_while_running() {
    let (gdb, session, fake) = gdb();
    let mut events = session.subscribe().await;

    fake.emit(r#"*running,thread-id="all""#).await;
    wait_for(&mut events, AsyncClass::Running).await;
    assert!(session.is_running());

    assert!(matches!(
        gdb.data_evaluate_expression("x", 2, 0).await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        gdb.target_architecture().await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        gdb.catch("throw", false).await,
        Err(Error::InvalidState(_))
    ));
    assert!(fake.commands().is_empty());

    fake.emit(r#"*stopped,reason="signal-received",signal-name="SIGINT",thread-id="2""#)
        .await;
    wait_for_stop(&mut events).await;
    assert!(!session.is_running());
    assert_eq!(gdb.data_evaluate_expression("x", 2, 0).await.unwrap(), "42");
}

#[tokio::test]
async fn test_running_result_marks_the_target_running() {
    let script = gdb_script().on("-exec-continue", &["^running"]);
    let (gdb, session, fake) = factory(DialectKind::Gdb, script.into_responder());

    gdb.exec_continue().await.unwrap();
    assert!(session.is_running());
    assert!(matches!(
        gdb.stack_list_frames(2, 0, 1).await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(fake.commands(), vec!["-exec-continue"]);
}

#[tokio::test]
async fn test_clrdbg_takes_commands_while_running() {
    let script = Script::new().on("-data-evaluate-expression", &[r#"^done,value="1""#]);
    let (clrdbg, session, fake) = factory(DialectKind::Clrdbg, script.into_responder());
    let mut events = session.subscribe().await;

    fake.emit(r#"*running,thread-id="all""#).await;
    wait_for(&mut events, AsyncClass::Running).await;
    assert_eq!(clrdbg.data_evaluate_expression("n", 1, 0).await.unwrap(), "1");
    assert_eq!(
        fake.commands(),
        vec![r#"-data-evaluate-expression "n" --thread 1 --frame 0"#]
    );
}

#[tokio::test]
async fn test_child_process_and_library_load_options() {
    let script = Script::new()
        .on("-gdb-set", &["^done"])
        .on("-interpreter-exec console", &["^done"]);
    let (gdb, _session, fake) = factory(DialectKind::Gdb, script.into_responder());
    gdb.enable_child_process_debugging().await.unwrap();
    gdb.set_stop_on_dynamic_lib_load(true).await.unwrap();
    assert_eq!(
        fake.commands(),
        vec![
            "-gdb-set detach-on-fork off",
            r#"-interpreter-exec console "catch fork""#,
            r#"-interpreter-exec console "catch vfork""#,
            "-gdb-set stop-on-solib-events 1",
        ]
    );

    let (clrdbg, _session, fake) = factory(DialectKind::Clrdbg, Script::new().into_responder());
    assert!(matches!(
        clrdbg.enable_child_process_debugging().await,
        Err(Error::NotSupported { .. })
    ));
    assert!(matches!(
        clrdbg.set_stop_on_dynamic_lib_load(false).await,
        Err(Error::NotSupported { .. })
    ));
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn test_misshapen_frame_entry_is_an_error() {
    let script = gdb_script().on("-stack-list-arguments", &[r#"^done,stack-args=[frame="oops"]"#]);
    let (gdb, _session, _fake) = factory(DialectKind::Gdb, script.into_responder());
    assert!(matches!(
        gdb.stack_list_arguments(PrintValues::NoValues, 2, 0, 0).await,
        Err(Error::Value(ValueError::WrongShape { .. }))
    ));
}

#[tokio::test]
async fn test_misshapen_register_entry_is_an_error() {
    let script = gdb_script().on(
        "-data-list-register-values",
        &[r#"^done,register-values=[{number="0",value="0x1"},"junk"]"#],
    );
    let (gdb, _session, _fake) = factory(DialectKind::Gdb, script.into_responder());
    assert!(matches!(
        gdb.data_list_register_values(2).await,
        Err(Error::Value(ValueError::WrongShape { .. }))
    ));
}
