use codex_subagent::state::{
    PathLayout, PermissionLevel, StateError, ThreadPatch, ThreadRegistry, ThreadStatus,
};
use std::fs;
use std::thread;
use tempfile::{tempdir, TempDir};

fn registry() -> (TempDir, PathLayout, ThreadRegistry) {
    let dir = tempdir().expect("tempdir");
    let layout = PathLayout::new(dir.path().join(".codex-subagent"));
    layout.ensure().expect("ensure");
    let registry = ThreadRegistry::for_layout(&layout);
    (dir, layout, registry)
}

fn new_thread(controller: &str) -> ThreadPatch {
    ThreadPatch {
        role: Some("researcher".to_string()),
        permission_level: Some(PermissionLevel::ReadOnly),
        status: Some(ThreadStatus::Running),
        controller_id: Some(controller.to_string()),
        label: Some("explore".to_string()),
        backend: Some("codex".to_string()),
        ..ThreadPatch::default()
    }
}

#[test]
fn missing_registry_file_reads_as_empty() {
    let (_dir, _layout, registry) = registry();
    assert!(registry.list_threads().expect("list").is_empty());
    assert!(registry.get("nope").expect("get").is_none());
}

#[test]
fn blank_registry_file_reads_as_empty() {
    let (_dir, _layout, registry) = registry();
    fs::write(registry.path(), "  \n").expect("write");
    assert!(registry.list_threads().expect("list").is_empty());
}

#[test]
fn corrupt_registry_file_is_a_load_error() {
    let (_dir, _layout, registry) = registry();
    fs::write(registry.path(), "{not-json").expect("write");
    let err = registry.list_threads().expect_err("corrupt");
    assert!(err.is_load_error(), "unexpected error: {err}");
    assert!(matches!(err, StateError::Load { source: Some(_), .. }));

    fs::write(registry.path(), "\"just a string\"").expect("write");
    let err = registry.get("x").expect_err("wrong shape");
    assert!(err.is_load_error());
    assert!(err.to_string().contains("found a string"));
}

#[test]
fn corrupt_registry_blocks_mutation_and_is_left_untouched() {
    let (_dir, _layout, registry) = registry();
    fs::write(registry.path(), "{not-json").expect("write");
    let err = registry
        .upsert("t1", new_thread("A"))
        .expect_err("upsert on corrupt file");
    assert!(err.is_load_error());
    assert_eq!(fs::read_to_string(registry.path()).expect("read"), "{not-json");
    assert!(!registry.lock_path().exists());
}

#[test]
fn legacy_array_registry_is_normalized_by_thread_id() {
    let (_dir, _layout, registry) = registry();
    fs::write(
        registry.path(),
        r#"[{"thread_id":"a","status":"running","updated_at":"2024-01-01T00:00:00Z"},
            {"thread_id":"b","status":"completed","updated_at":"2024-01-02T00:00:00Z","title":"kept"}]"#,
    )
    .expect("write");

    let b = registry.get("b").expect("get").expect("present");
    assert_eq!(b.status, Some(ThreadStatus::Completed));
    assert_eq!(b.extra.get("title").and_then(|v| v.as_str()), Some("kept"));

    registry
        .update_thread("a", ThreadPatch::status(ThreadStatus::Stopped))
        .expect("update");
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(registry.path()).expect("read")).expect("json");
    assert!(raw.is_object(), "rewrite should use the keyed object form");
    assert_eq!(raw["b"]["title"], "kept");
}

#[test]
fn upsert_requires_thread_id() {
    let (_dir, _layout, registry) = registry();
    let err = registry.upsert("", new_thread("A")).expect_err("empty id");
    assert!(matches!(err, StateError::MissingThreadId));
    let err = registry.upsert("   ", new_thread("A")).expect_err("blank id");
    assert!(matches!(err, StateError::MissingThreadId));
}

#[test]
fn creating_a_thread_without_a_controller_is_rejected() {
    let (_dir, _layout, registry) = registry();
    let err = registry
        .upsert("t1", ThreadPatch::status(ThreadStatus::Running))
        .expect_err("ownerless create");
    assert!(matches!(err, StateError::MissingController { ref thread_id } if thread_id == "t1"));
    assert!(err.to_string().contains("controller_id"));

    let err = registry
        .upsert(
            "t1",
            ThreadPatch {
                controller_id: Some(String::new()),
                ..ThreadPatch::status(ThreadStatus::Running)
            },
        )
        .expect_err("blank controller");
    assert!(matches!(err, StateError::MissingController { .. }));
    assert!(registry.get("t1").expect("get").is_none());
    assert!(!registry.path().exists());

    registry.upsert("t1", new_thread("A")).expect("create");
    let merged = registry
        .upsert("t1", ThreadPatch::status(ThreadStatus::Completed))
        .expect("existing record needs no controller");
    assert_eq!(merged.owner(), Some("A"));
}

#[test]
fn upsert_merges_and_persists_across_instances() {
    let (_dir, layout, registry) = registry();
    let created = registry.upsert("123", new_thread("A")).expect("create");
    assert!(!created.updated_at.is_empty());

    let merged = registry
        .upsert(
            "123",
            ThreadPatch {
                status: Some(ThreadStatus::Completed),
                last_message_id: Some("msg-1".to_string()),
                updated_at: Some("2999-01-01T00:00:00.000Z".to_string()),
                ..ThreadPatch::default()
            },
        )
        .expect("merge");
    assert_eq!(merged.role.as_deref(), Some("researcher"));
    assert_eq!(merged.label.as_deref(), Some("explore"));
    assert_eq!(merged.controller_id.as_deref(), Some("A"));
    assert_eq!(merged.status, Some(ThreadStatus::Completed));
    assert_eq!(merged.updated_at, "2999-01-01T00:00:00.000Z");

    let reopened = ThreadRegistry::for_layout(&layout);
    assert_eq!(reopened.get("123").expect("get"), Some(merged));
}

#[test]
fn update_thread_on_absent_id_is_not_found() {
    let (_dir, _layout, registry) = registry();
    let err = registry
        .update_thread("ghost", ThreadPatch::status(ThreadStatus::Failed))
        .expect_err("absent");
    assert!(err.is_not_found());
    assert!(!registry.path().exists(), "failed update must not create the file");
}

#[test]
fn update_thread_stamps_updated_at_and_keeps_other_fields() {
    let (_dir, _layout, registry) = registry();
    let created = registry
        .upsert(
            "t1",
            ThreadPatch {
                updated_at: Some("2020-01-01T00:00:00.000Z".to_string()),
                ..new_thread("A")
            },
        )
        .expect("create");
    let updated = registry
        .update_thread(
            "t1",
            ThreadPatch {
                last_pulled_id: Some("msg-9".to_string()),
                ..ThreadPatch::default()
            },
        )
        .expect("update");
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.last_pulled_id.as_deref(), Some("msg-9"));
    assert_eq!(updated.status, Some(ThreadStatus::Running));
    assert_eq!(updated.permission_level, Some(PermissionLevel::ReadOnly));
}

#[test]
fn controller_id_is_immutable_once_set() {
    let (_dir, _layout, registry) = registry();
    registry.upsert("t1", new_thread("A")).expect("create");

    let err = registry
        .update_thread(
            "t1",
            ThreadPatch {
                controller_id: Some("B".to_string()),
                ..ThreadPatch::default()
            },
        )
        .expect_err("transfer");
    assert!(matches!(err, StateError::ControllerImmutable { .. }));

    let same = registry
        .upsert(
            "t1",
            ThreadPatch {
                controller_id: Some("A".to_string()),
                ..ThreadPatch::default()
            },
        )
        .expect("same controller");
    assert_eq!(same.owner(), Some("A"));
}

#[test]
fn list_threads_orders_newest_first_then_by_id() {
    let (_dir, _layout, registry) = registry();
    for (id, at) in [
        ("b", "2024-05-01T00:00:00.000Z"),
        ("a", "2024-05-01T00:00:00.000Z"),
        ("c", "2024-06-01T00:00:00.000Z"),
        ("d", "2024-04-01T00:00:00.000Z"),
    ] {
        registry
            .upsert(
                id,
                ThreadPatch {
                    updated_at: Some(at.to_string()),
                    ..new_thread("A")
                },
            )
            .expect("upsert");
    }
    let ids: Vec<String> = registry
        .list_threads()
        .expect("list")
        .into_iter()
        .map(|thread| thread.thread_id)
        .collect();
    assert_eq!(ids, vec!["c", "a", "b", "d"]);
}

#[test]
fn remove_is_a_noop_for_absent_ids() {
    let (_dir, _layout, registry) = registry();
    assert!(registry.remove("ghost").expect("remove absent").is_none());
    registry.upsert("t1", new_thread("A")).expect("create");
    assert!(registry.remove("t1").expect("remove").is_some());
    assert!(registry.get("t1").expect("get").is_none());
}

#[test]
fn concurrent_upserts_do_not_lose_records() {
    let (_dir, _layout, registry) = registry();
    let handles: Vec<_> = (0..8)
        .map(|index| {
            let registry = registry.clone();
            thread::spawn(move || {
                registry
                    .upsert(&format!("t{index}"), new_thread("A"))
                    .expect("upsert")
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    assert_eq!(registry.list_threads().expect("list").len(), 8);
    assert!(!registry.lock_path().exists());
}

#[cfg(unix)]
#[test]
fn registry_recovers_from_lock_left_by_crashed_writer() {
    let (_dir, _layout, registry) = registry();
    let mut child = std::process::Command::new("true").spawn().expect("spawn");
    let dead_pid = child.id();
    child.wait().expect("wait");
    fs::write(registry.lock_path(), dead_pid.to_string()).expect("seed lock");

    registry.upsert("t1", new_thread("A")).expect("upsert");
    registry
        .upsert("t1", ThreadPatch::status(ThreadStatus::Completed))
        .expect("second upsert");
    assert!(!registry.lock_path().exists());
}
