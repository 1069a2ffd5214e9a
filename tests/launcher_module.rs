#![cfg(unix)]

use codex_subagent::backend::{BackendOptions, CodexBackend};
use codex_subagent::launcher::{launch_detached, LaunchCommand, LaunchOutcome};
use codex_subagent::state::{
    LaunchRegistry, LaunchStatus, NewLaunchAttempt, PathLayout, PermissionLevel,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn setup() -> (TempDir, PathLayout, LaunchRegistry) {
    let dir = tempdir().expect("tempdir");
    let layout = PathLayout::new(dir.path().join(".codex-subagent"));
    layout.ensure().expect("ensure");
    let registry = LaunchRegistry::for_layout(&layout);
    (dir, layout, registry)
}

#[test]
fn early_exit_marks_the_attempt_failed_with_stderr() {
    let (dir, layout, registry) = setup();
    let script = dir.path().join("worker.sh");
    write_script(&script, "#!/bin/sh\necho 'auth token rejected' >&2\nexit 3\n");
    let attempt = registry
        .create_attempt(NewLaunchAttempt::start("ctrl-A"))
        .expect("attempt");

    let outcome = launch_detached(
        &registry,
        &layout,
        &attempt,
        &LaunchCommand::new(script.display().to_string()),
        Duration::from_secs(5),
    )
    .expect("launch");
    assert!(matches!(outcome, LaunchOutcome::Failed { .. }));

    let stored = registry.get(&attempt.id).expect("get").expect("present");
    assert_eq!(stored.status, LaunchStatus::Failed);
    let diagnostic =
        fs::read_to_string(stored.log_path.expect("log path")).expect("read diagnostic");
    assert!(diagnostic.contains("auth token rejected"));
    assert!(!layout
        .launch_stderr_path(&attempt.id)
        .expect("stderr path")
        .exists());
}

#[test]
fn missing_binary_is_recorded_as_failure() {
    let (dir, layout, registry) = setup();
    let attempt = registry
        .create_attempt(NewLaunchAttempt::start("ctrl-A"))
        .expect("attempt");

    let outcome = launch_detached(
        &registry,
        &layout,
        &attempt,
        &LaunchCommand::new(dir.path().join("no-such-binary").display().to_string()),
        Duration::from_millis(200),
    )
    .expect("launch");
    match outcome {
        LaunchOutcome::Failed { message } => assert!(message.contains("failed to spawn")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let stored = registry.get(&attempt.id).expect("get").expect("present");
    assert_eq!(stored.status, LaunchStatus::Failed);
}

#[test]
fn long_running_worker_detaches_after_grace() {
    let (dir, layout, registry) = setup();
    let script = dir.path().join("worker.sh");
    write_script(&script, "#!/bin/sh\nsleep 10\n");
    let attempt = registry
        .create_attempt(NewLaunchAttempt::start("ctrl-A"))
        .expect("attempt");

    let started = Instant::now();
    let outcome = launch_detached(
        &registry,
        &layout,
        &attempt,
        &LaunchCommand::new(script.display().to_string()),
        Duration::from_millis(100),
    )
    .expect("launch");
    assert!(started.elapsed() < Duration::from_secs(5));
    let LaunchOutcome::Detached { pid } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    let stored = registry.get(&attempt.id).expect("get").expect("present");
    assert!(stored.is_pending());

    let _ = Command::new("kill").arg(pid.to_string()).status();
}

#[test]
fn worker_inherits_controller_and_launch_ids() {
    let (dir, layout, registry) = setup();
    let script = dir.path().join("worker.sh");
    let capture = dir.path().join("env.txt");
    write_script(
        &script,
        &format!(
            "#!/bin/sh\nprintf '%s %s %s' \"$CODEX_SUBAGENT_CONTROLLER_ID\" \"$CODEX_SUBAGENT_LAUNCH_ID\" \"$1\" > {}\n",
            capture.display()
        ),
    );
    let attempt = registry
        .create_attempt(NewLaunchAttempt::start("ctrl-A"))
        .expect("attempt");

    let outcome = launch_detached(
        &registry,
        &layout,
        &attempt,
        &LaunchCommand::new(script.display().to_string()).arg("hello"),
        Duration::from_secs(5),
    )
    .expect("launch");
    assert!(matches!(outcome, LaunchOutcome::Exited { .. }));
    assert_eq!(
        fs::read_to_string(&capture).expect("capture"),
        format!("ctrl-A {} hello", attempt.id)
    );
    assert!(!layout
        .launch_stderr_path(&attempt.id)
        .expect("stderr path")
        .exists());
}

#[test]
fn backend_command_carries_binary_args_and_cwd() {
    let mut options = BackendOptions::new("ping", PermissionLevel::ReadOnly);
    options.working_dir = Some("/tmp/work".into());
    let command = LaunchCommand::for_backend(&CodexBackend::default(), &options);
    assert_eq!(command.program, "codex");
    assert_eq!(command.args.last().map(String::as_str), Some("ping"));
    assert_eq!(command.cwd, Some("/tmp/work".into()));
}
