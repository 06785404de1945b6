//! `TaskSync` — live-synchronized task tracking demo.
//!
//! Seeds an in-memory backend with demo accounts and tasks, signs in,
//! and walks the synchronization lifecycle end to end: filtered and
//! sorted views, tracked writes settling against live snapshots, and the
//! comment cascade on delete. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/tasksync/config.toml`).
//!
//! ```bash
//! # Demo as the seeded provider account
//! cargo run --bin tasksync
//!
//! # Demo as the seeded client account
//! cargo run --bin tasksync -- --email marcus@tasksync.demo \
//!     --password demo-password
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::config::{AppConfig, CliArgs};
use tasksync::query::{self, TaskFilter, TaskSort};
use tasksync::seed::{self, SeedError};
use tasksync::session::{Session, SessionError};
use tasksync::stats;
use tasksync::store::{StoreError, StoreEvent, TaskStore, WriteId, WriteState};
use tasksync_backend::{MemoryBackend, MemoryIdentity, TracingSink};
use tasksync_model::{Task, TaskDraft, TaskPatch, TaskStatus, Timestamp, UserId};

type DemoStore = TaskStore<MemoryBackend, TracingSink>;

/// Anything that can end the demo early.
#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > env > defaults).
    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            AppConfig::default()
        }
    };

    // Initialize logging before any output (logs go to file, not stdout).
    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!("tasksync starting");
    let result = run_demo(&config).await;
    tracing::info!("tasksync exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            tracing::error!(err = %e, "demo run failed");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, which belongs to the demo
/// output). Returns a [`WorkerGuard`] that must be held until shutdown to
/// ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// The whole demo, from seeding through sign-out.
async fn run_demo(config: &AppConfig) -> Result<(), DemoError> {
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Arc::new(MemoryBackend::new());
    let telemetry = Arc::new(TracingSink);

    // Step 1: demo accounts, tasks, and comments.
    let accounts = seed::seed_demo_data(identity.as_ref(), backend.as_ref()).await?;

    // Step 2: sign in, configured account first, seeded provider otherwise.
    let email = config
        .email
        .clone()
        .unwrap_or_else(|| seed::PROVIDER_EMAIL.to_string());
    let password = config
        .password
        .clone()
        .unwrap_or_else(|| seed::DEMO_PASSWORD.to_string());
    let (session, mut events) = Session::sign_in(
        identity,
        Arc::clone(&backend),
        telemetry,
        &config.sync,
        &email,
        &password,
    )
    .await?;
    let store = Arc::clone(session.store());

    // Step 3: let the first snapshots land before reading.
    wait_for_refresh(&mut events).await;
    println!(
        "Signed in as {} ({})",
        session.viewer().name,
        session.viewer().role
    );

    // Step 4: the three sorted views over the visible set.
    for sort in [TaskSort::Deadline, TaskSort::Priority, TaskSort::Status] {
        print_task_view(&store, sort);
    }

    // Step 5: summary figures.
    let visible = store.tasks_by_filter(&TaskFilter::default());
    let summary = stats::summarize(&visible, Timestamp::now());
    println!(
        "\n{} tasks: {} pending, {} in progress, {} completed, {} cancelled",
        summary.total,
        summary.by_status.pending,
        summary.by_status.in_progress,
        summary.by_status.completed,
        summary.by_status.cancelled
    );
    println!(
        "Overdue: {}   Completion: {}%",
        summary.overdue, summary.completion_rate
    );

    if let Some(task) = visible.iter().find(|t| t.title.contains("HVAC")) {
        println!("\nComments on \"{}\":", task.title);
        for comment in store.comments_by_task(&task.id) {
            println!("  - {}", comment.text);
        }
    }

    // Step 6: create a task and watch the write settle.
    let draft = TaskDraft {
        title: "Flush water heater".to_string(),
        description: "Annual sediment flush; bring the transfer pump.".to_string(),
        created_by: session.viewer().id.clone(),
        assigned_to: UserId::new(accounts.client.user_id.clone()),
        client_id: UserId::new(accounts.client.user_id.clone()),
        deadline: Some(Timestamp::now().saturating_add_millis(3 * 24 * 60 * 60 * 1000)),
        priority: tasksync_model::Priority::Medium,
        status: TaskStatus::Pending,
    };
    let (created, write_id) = store.create_task(draft).await?;
    println!(
        "\nCreated \"{}\" (write {}, {})",
        created.title,
        write_id,
        state_label(store.write_state(&write_id))
    );
    wait_for_settlement(&store, &write_id).await;
    println!(
        "Write {} is now {}",
        write_id,
        state_label(store.write_state(&write_id))
    );

    // Step 7: move it along and comment on it.
    let patch = TaskPatch {
        status: Some(TaskStatus::InProgress),
        ..TaskPatch::default()
    };
    let (updated, update_write) = store.update_task(&created.id, patch).await?;
    wait_for_settlement(&store, &update_write).await;
    println!("Updated \"{}\" to {}", updated.title, updated.status);

    let (comment, comment_write) = store
        .add_comment(&created.id, &session.viewer().id, "Pump loaded on the truck.")
        .await?;
    wait_for_settlement(&store, &comment_write).await;
    println!("Commented: {}", comment.text);
    println!(
        "Task now has {} comment(s)",
        store.comments_by_task(&created.id).len()
    );

    // Step 8: delete it again, comments and all.
    let delete_write = store.delete_task(&created.id).await?;
    wait_for_settlement(&store, &delete_write).await;
    println!(
        "Deleted \"{}\" ({} comment(s) left behind)",
        created.title,
        store.comments_by_task(&created.id).len()
    );
    println!("Pending writes: {}", store.pending_write_count());

    // Step 9: done.
    session.sign_out().await;
    println!("Signed out.");
    Ok(())
}

/// Waits until both collections have delivered their first snapshot, or
/// gives up after a short grace period.
async fn wait_for_refresh(events: &mut mpsc::Receiver<StoreEvent>) {
    let mut tasks_seen = false;
    let mut comments_seen = false;
    while !(tasks_seen && comments_seen) {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Some(StoreEvent::TasksRefreshed { .. })) => tasks_seen = true,
            Ok(Some(StoreEvent::CommentsRefreshed { .. })) => comments_seen = true,
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
}

/// Polls the ledger until a write leaves the pending state.
async fn wait_for_settlement(store: &DemoStore, write_id: &WriteId) {
    for _ in 0..100 {
        match store.write_state(write_id) {
            Some(WriteState::Pending) => tokio::time::sleep(Duration::from_millis(10)).await,
            _ => return,
        }
    }
}

fn state_label(state: Option<WriteState>) -> String {
    match state {
        Some(WriteState::Pending) => "pending".to_string(),
        Some(WriteState::Confirmed) => "confirmed".to_string(),
        Some(WriteState::Failed(reason)) => format!("failed: {reason}"),
        None => "no longer tracked".to_string(),
    }
}

fn print_task_view(store: &DemoStore, sort: TaskSort) {
    let mut tasks = store.tasks_by_filter(&TaskFilter::default());
    query::sort_tasks(&mut tasks, sort);
    println!("\nYour tasks by {sort}:");
    for task in &tasks {
        println!(
            "  [{:<11}] {:<28} {:<6} {}",
            task.status.as_str(),
            task.title,
            task.priority.as_str(),
            deadline_label(task)
        );
    }
}

fn deadline_label(task: &Task) -> String {
    task.deadline.map_or_else(
        || "no deadline".to_string(),
        |at| format!("due {}", format_timestamp(at)),
    )
}

/// Format an epoch-millisecond timestamp as a local date and time.
fn format_timestamp(at: Timestamp) -> String {
    use chrono::{Local, TimeZone};
    let ms = at.as_millis();
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => "??".to_string(),
    }
}
