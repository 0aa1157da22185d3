use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;
use tracing_subscriber::fmt::MakeWriter;

use reda_core::config::{self, Config};
use reda_sync::pipeline::{self, RunOptions, RunSummary};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_daemon_logs, RotationPolicy};
use crate::paths::{err_log_path, log_path, logs_dir, socket_path, DAEMON_LABEL};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::schedule::WeeklySchedule;

/// Set to `json` for JSON-lines console output.
pub const ENV_LOG_FORMAT: &str = "REDA_LOG_FORMAT";

const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

struct RunJob {
    options: RunOptions,
    trigger: &'static str,
    respond_to: oneshot::Sender<Result<RunSummary, String>>,
}

/// Result of the most recent run, as reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub trigger: String,
    pub finished_at_unix: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LastRun {
    fn record(trigger: &str, result: &Result<RunSummary, DaemonError>) -> Self {
        let (summary, error) = match result {
            Ok(summary) => (Some(summary.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            trigger: trigger.to_string(),
            finished_at_unix: unix_seconds_now(),
            summary,
            error,
        }
    }
}

#[derive(Debug, Default)]
struct DaemonState {
    next_run: Option<DateTime<FixedOffset>>,
    last_run: Option<LastRun>,
}

type SharedState = Arc<RwLock<DaemonState>>;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(home)?;
    init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
///
/// The config must load and validate at startup. After that it is re-read at
/// the start of every run, and a bad edit fails only that run.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = load_config(home.clone()).await?;
    config.validate()?;
    ensure_runtime_dirs(&home)?;

    let schedule = WeeklySchedule::from_config(&config);
    tracing::info!(
        schedule = %config.schedule,
        projects = config.projects.len(),
        "daemon starting"
    );

    let state: SharedState = Arc::new(RwLock::new(DaemonState::default()));
    let started_at_unix = unix_seconds_now();

    let (run_tx, run_rx) = mpsc::channel::<RunJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result =
                scheduler_task(home, schedule, state, run_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = run_processor_task(home, state, run_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let state = state.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                state,
                run_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };
    drop(run_tx);

    let (scheduler_result, processor_result, socket_result, rotation_result, signal_result) =
        tokio::join!(
            scheduler_handle,
            processor_handle,
            socket_handle,
            rotation_handle,
            signal_handle
        );

    handle_join("scheduler", scheduler_result)?;
    handle_join("run_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn scheduler_task(
    home: PathBuf,
    mut schedule: WeeklySchedule,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        match load_config(home.clone()).await {
            Ok(config) => schedule = WeeklySchedule::from_config(&config),
            Err(err) => tracing::warn!(error = %err, "config reload failed; keeping previous schedule"),
        }

        let now = Utc::now();
        let next = schedule.next_after(now);
        state.write().await.next_run = Some(next);
        tracing::info!(next_run = %next.to_rfc3339(), "next scheduled run");

        if !wait_or_shutdown(schedule.wait_from(now), &mut shutdown_rx).await {
            break;
        }

        match enqueue_run(&run_tx, RunOptions::default(), "schedule").await {
            Ok(summary) => tracing::info!(
                published = summary.published(),
                empty = summary.empty(),
                failed = summary.failed(),
                duration_ms = summary.duration_ms,
                "scheduled run completed"
            ),
            Err(err) => tracing::error!(error = %err, "scheduled run failed"),
        }
    }
    Ok(())
}

/// Sleep for `wait`; `false` if shutdown arrived first.
async fn wait_or_shutdown(wait: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

async fn run_processor_task(
    home: PathBuf,
    state: SharedState,
    mut run_rx: mpsc::Receiver<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = run_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                tracing::info!(trigger = job.trigger, project = ?job.options.project, "run started");

                let home_for_run = home.clone();
                let options = job.options.clone();
                let result = flatten_run_join(
                    tokio::task::spawn_blocking(move || run_blocking(&home_for_run, &options)).await,
                );

                if let Err(err) = &result {
                    tracing::error!(trigger = job.trigger, error = %err, "run aborted");
                }
                tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "run finished");

                state.write().await.last_run = Some(LastRun::record(job.trigger, &result));
                let _ = job.respond_to.send(result.map_err(|err| err.to_string()));
            }
        }
    }
    Ok(())
}

fn run_blocking(home: &Path, options: &RunOptions) -> Result<RunSummary, DaemonError> {
    let config = config::load_at(home)?;
    Ok(pipeline::run(&config, options)?)
}

/// A panicked or cancelled run is reported like any other failed run; the
/// processor keeps serving the queue.
fn flatten_run_join(
    joined: Result<Result<RunSummary, DaemonError>, tokio::task::JoinError>,
) -> Result<RunSummary, DaemonError> {
    joined.unwrap_or_else(|err| Err(DaemonError::Protocol(format!("run task join error: {err}"))))
}

async fn socket_server_task(
    home: PathBuf,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let state = state.clone();
                let run_tx = run_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        state,
                        run_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&home, &state, started_at_unix).await),
            "run" => {
                let options = RunOptions {
                    project: request.project.clone(),
                    dry_run: request.dry_run,
                };
                match enqueue_run(&run_tx, options, "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                tracing::info!("stop requested over socket");
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    rotate_daemon_logs(&home, RotationPolicy::default());
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn build_status_payload(home: &Path, state: &SharedState, started_at_unix: u64) -> Value {
    let (next_run, last_run) = {
        let state = state.read().await;
        (state.next_run, state.last_run.clone())
    };

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "next_run_at": next_run.map(|at| at.to_rfc3339()),
        "last_run": last_run,
        "socket": socket_path(home).display().to_string(),
    })
}

async fn enqueue_run(
    run_tx: &mpsc::Sender<RunJob>,
    options: RunOptions,
    trigger: &'static str,
) -> Result<RunSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    run_tx
        .send(RunJob {
            options,
            trigger,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("run queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("run response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn load_config(home: PathBuf) -> Result<Config, DaemonError> {
    tokio::task::spawn_blocking(move || config::load_at(&home))
        .await
        .map_err(|err| DaemonError::Protocol(format!("config load join error: {err}")))?
        .map_err(DaemonError::from)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Appends to a log file, reopening it per event so rotation needs no handoff.
#[derive(Debug, Clone)]
struct AppendFile(PathBuf);

impl<'a> MakeWriter<'a> for AppendFile {
    type Writer = Box<dyn io::Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.0) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::sink()),
        }
    }
}

/// Console plus `logs/daemon.log`, with warnings and errors also copied to
/// `logs/daemon-err.log`. `RUST_LOG` filters all three (default `info`).
fn init_tracing(home: &Path) {
    use tracing::Level;
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_console = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_console.then(|| fmt::layer().json().with_target(false)))
        .with((!json_console).then(|| fmt::layer().with_target(false)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(AppendFile(log_path(home))),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(AppendFile(err_log_path(home)).with_max_level(Level::WARN)),
        )
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
