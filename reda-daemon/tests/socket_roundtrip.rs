use std::path::PathBuf;
use std::time::Duration;

use reda_core::config::{self, Config};
use reda_daemon::{paths::socket_path, request_run, request_status, request_stop, DaemonError};
use tempfile::TempDir;

fn write_valid_config(home: &TempDir) {
    let mut config = Config::default();
    config.api.api_key = "test-key".into();
    config.sheets.spreadsheet_id = "test-book".into();
    config::save_at(home.path(), &config).expect("save config");
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking join")
}

async fn wait_for_socket(home: PathBuf) {
    for _ in 0..50 {
        if socket_path(&home).exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("daemon socket never appeared");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_run_and_stop_over_the_socket() {
    let home = TempDir::new().expect("home");
    write_valid_config(&home);
    let home_path = home.path().to_path_buf();

    let daemon = tokio::spawn(reda_daemon::run(home_path.clone()));
    wait_for_socket(home_path.clone()).await;

    let status = blocking({
        let home = home_path.clone();
        move || request_status(&home)
    })
    .await
    .expect("status");
    assert_eq!(status["running"], true);
    assert_eq!(status["label"], "mx.reda.sync");
    assert!(
        status["next_run_at"]
            .as_str()
            .map(|at| at.ends_with("T00:00:00-06:00"))
            .unwrap_or(true),
        "next run should be local midnight: {status}"
    );

    // Unknown project fails before any network call.
    let err = blocking({
        let home = home_path.clone();
        move || request_run(&home, Some("Nowhere".into()), false)
    })
    .await
    .unwrap_err();
    assert!(
        matches!(err, DaemonError::Protocol(ref m) if m.contains("Nowhere")),
        "got: {err}"
    );

    let status = blocking({
        let home = home_path.clone();
        move || request_status(&home)
    })
    .await
    .expect("status after run");
    assert_eq!(status["last_run"]["trigger"], "socket");
    assert!(status["last_run"]["error"].is_string());

    blocking({
        let home = home_path.clone();
        move || request_stop(&home)
    })
    .await
    .expect("stop");

    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("clean shutdown");
    assert!(!socket_path(&home_path).exists(), "socket removed on shutdown");
}

#[tokio::test]
async fn daemon_refuses_to_start_without_config() {
    let home = TempDir::new().expect("home");
    let err = reda_daemon::run(home.path().to_path_buf())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
    assert!(!socket_path(home.path()).exists());
}

#[tokio::test]
async fn daemon_refuses_to_start_with_incomplete_config() {
    let home = TempDir::new().expect("home");
    config::init_at(home.path(), false).expect("init");
    let err = reda_daemon::run(home.path().to_path_buf())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
}
