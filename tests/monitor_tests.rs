//! Data monitor: initial load, debounced reloads, waiting and watching.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::json;

use unity_mcp_bridge::error::ErrorCode;
use unity_mcp_bridge::monitor::DataMonitor;

const DEBOUNCE: Duration = Duration::from_millis(80);

fn monitor(dir: &Path) -> DataMonitor {
    DataMonitor::new(dir, DEBOUNCE, "*.json")
}

fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
    fs::write(dir.join(name), serde_json::to_string(&value).unwrap()).unwrap();
}

#[tokio::test]
async fn load_all_skips_missing_and_broken_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "project-info.json", json!({ "projectName": "Demo" }));
    fs::write(tmp.path().join("scene-info.json"), "{ broken").unwrap();
    write_json(tmp.path(), "unrelated.json", json!({ "ignored": true }));

    let monitor = monitor(tmp.path());
    assert_eq!(monitor.load_all().await, 1);

    let all = monitor.get_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all["project_info"], json!({ "projectName": "Demo" }));
    assert!(monitor.get("scene_info").is_none());
    assert!(monitor.get("unrelated").is_none());
}

#[tokio::test]
async fn broken_file_keeps_previous_value() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "scene-info.json", json!({ "activeScene": "Main" }));

    let monitor = monitor(tmp.path());
    monitor.load_all().await;

    fs::write(tmp.path().join("scene-info.json"), "{ \"activeScene\": ").unwrap();
    monitor.load_all().await;
    assert_eq!(monitor.get("scene_info"), Some(json!({ "activeScene": "Main" })));
}

#[tokio::test]
async fn snapshots_are_shared_not_copied() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "build-info.json", json!({ "target": "StandaloneLinux64" }));

    let monitor = monitor(tmp.path());
    monitor.load_all().await;

    let a = monitor.get_all();
    let b = monitor.get_all();
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    monitor.clear();
    assert!(monitor.get_all().is_empty());
    assert_eq!(a.len(), 1, "old snapshot is unaffected by clear");
}

#[tokio::test]
async fn burst_of_events_reloads_once() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "editor-state.json", json!({ "isPlaying": false }));
    let monitor = monitor(tmp.path());

    for _ in 0..5 {
        monitor.schedule_reload("editor-state.json");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(monitor.pending_timers(), 1);

    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(monitor.reload_count(), 1);
    assert_eq!(monitor.pending_timers(), 0);
    assert_eq!(monitor.get("editor_state"), Some(json!({ "isPlaying": false })));
}

#[tokio::test]
async fn different_files_reload_independently() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "project-info.json", json!({ "projectName": "Demo" }));
    write_json(tmp.path(), "assets-info.json", json!({ "count": 12 }));
    let monitor = monitor(tmp.path());

    monitor.schedule_reload("project-info.json");
    monitor.schedule_reload("assets-info.json");
    monitor.schedule_reload("project-info.json");
    assert_eq!(monitor.pending_timers(), 2);

    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(monitor.reload_count(), 2);
    assert!(monitor.get("project_info").is_some());
    assert!(monitor.get("assets_info").is_some());
}

#[tokio::test]
async fn clear_timers_cancels_pending_reloads() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "gameobjects.json", json!([]));
    let monitor = monitor(tmp.path());

    monitor.schedule_reload("gameobjects.json");
    monitor.clear_timers();
    assert_eq!(monitor.pending_timers(), 0);

    tokio::time::sleep(DEBOUNCE * 3).await;
    assert_eq!(monitor.reload_count(), 0);
    assert!(monitor.get("gameobjects").is_none());
}

#[tokio::test]
async fn deleted_file_is_evicted_on_reload() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(tmp.path(), "compile-status.json", json!({ "status": "succeeded" }));
    let monitor = monitor(tmp.path());
    monitor.load_all().await;
    assert!(monitor.get("compile_status").is_some());

    fs::remove_file(tmp.path().join("compile-status.json")).unwrap();
    monitor.schedule_reload("compile-status.json");
    tokio::time::sleep(DEBOUNCE * 3).await;
    assert!(monitor.get("compile_status").is_none());
}

#[tokio::test]
async fn wait_for_picks_up_late_files() {
    let tmp = tempfile::tempdir().unwrap();
    let monitor = monitor(tmp.path());

    let dir = tmp.path().to_path_buf();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        write_json(&dir, "console-logs.json", json!([{ "message": "hello" }]));
    });

    let value = monitor
        .wait_for("console_logs", Duration::from_secs(3))
        .await
        .unwrap();
    assert_eq!(value[0]["message"], "hello");
}

#[tokio::test]
async fn wait_for_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let monitor = monitor(tmp.path());

    let err = monitor
        .wait_for("project_info", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert!(err.message.contains("project_info"), "{}", err.message);
}

#[tokio::test]
async fn watcher_reloads_changed_files() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("UnityMCP");
    let monitor = monitor(&data_dir);

    monitor.watch().unwrap();
    assert!(monitor.is_watching());
    assert!(data_dir.is_dir(), "watch creates the data directory");

    write_json(&data_dir, "scene-info.json", json!({ "activeScene": "Level1" }));

    let mut seen = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        seen = monitor.get("scene_info");
        if seen.is_some() {
            break;
        }
    }
    assert_eq!(seen, Some(json!({ "activeScene": "Level1" })));

    monitor.stop();
    assert!(!monitor.is_watching());
}

#[tokio::test]
async fn watch_failure_names_the_data_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let not_a_dir = tmp.path().join("UnityMCP");
    fs::write(&not_a_dir, "occupied").unwrap();

    let err = monitor(&not_a_dir).watch().unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionFailed);
    assert!(err.message.starts_with("Cannot watch data directory"), "{}", err.message);
    assert!(err.message.contains("UnityMCP"), "{}", err.message);
}
