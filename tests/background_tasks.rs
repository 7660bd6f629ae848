//! Background task registry integration tests

#![cfg(unix)]

use std::time::Duration;

use agent_shell::{BackgroundTaskManager, ExecError, TaskStatus};
use futures::StreamExt;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn successful_task_captures_output_and_exit_code() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("echo background hello", None).await.unwrap();

    let status = task.wait_terminal().await;
    assert_eq!(status, TaskStatus::Success);
    assert_eq!(task.exit_code(), Some(0));

    let (stdout, stderr) = task.output();
    assert!(stdout.contains("background hello"), "got {stdout}");
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn failing_task_reports_failed_status() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("exit 4", None).await.unwrap();

    assert_eq!(task.wait_terminal().await, TaskStatus::Failed);
    assert_eq!(task.exit_code(), Some(4));
}

#[tokio::test]
async fn ids_are_strictly_increasing() {
    init();
    let tasks = BackgroundTaskManager::new();
    let a = tasks.start_task("true", None).await.unwrap();
    let b = tasks.start_task("true", None).await.unwrap();
    a.wait_terminal().await;
    b.wait_terminal().await;

    let ida: u64 = a.id().parse().unwrap();
    let idb: u64 = b.id().parse().unwrap();
    assert!(idb > ida);

    // Removal does not recycle ids.
    tasks.remove_task(a.id()).await.unwrap();
    let c = tasks.start_task("true", None).await.unwrap();
    let idc: u64 = c.id().parse().unwrap();
    assert!(idc > idb);
    c.wait_terminal().await;
}

#[tokio::test]
async fn kill_terminates_a_running_task() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("sleep 30", None).await.unwrap();
    assert!(task.is_running());

    tasks.kill_task(task.id()).await.unwrap();
    assert_eq!(task.status(), TaskStatus::Killed);
    assert!(!task.is_running());
}

#[tokio::test]
async fn kill_rejects_terminal_tasks() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("true", None).await.unwrap();
    task.wait_terminal().await;

    let err = tasks.kill_task(task.id()).await.unwrap_err();
    assert!(matches!(err, ExecError::TaskNotRunning(_)), "got {err}");
}

#[tokio::test]
async fn remove_kills_running_task_first() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("sleep 30", None).await.unwrap();

    let snap = tasks.remove_task(task.id()).await.unwrap();
    assert_eq!(snap.status, TaskStatus::Killed);

    let err = tasks.get_task(task.id()).await.unwrap_err();
    assert!(matches!(err, ExecError::TaskNotFound(_)), "got {err}");
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    init();
    let tasks = BackgroundTaskManager::new();
    let err = tasks.get_task("999").await.unwrap_err();
    assert!(matches!(err, ExecError::TaskNotFound(_)), "got {err}");
    let err = tasks.remove_task("999").await.unwrap_err();
    assert!(matches!(err, ExecError::TaskNotFound(_)), "got {err}");
}

#[tokio::test]
async fn list_puts_running_tasks_first_then_newest() {
    init();
    let tasks = BackgroundTaskManager::new();
    let done_old = tasks.start_task("true", None).await.unwrap();
    done_old.wait_terminal().await;
    let running = tasks.start_task("sleep 30", None).await.unwrap();
    let done_new = tasks.start_task("true", None).await.unwrap();
    done_new.wait_terminal().await;

    let listed = tasks.list_tasks().await;
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].id, running.id());
    assert_eq!(listed[1].id, done_new.id());
    assert_eq!(listed[2].id, done_old.id());

    tasks.shutdown().await;
}

#[tokio::test]
async fn one_shot_stream_yields_current_buffers() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("echo once", None).await.unwrap();
    task.wait_terminal().await;

    let chunks: Vec<String> = tasks
        .stream_output(task.id(), false)
        .await
        .unwrap()
        .collect()
        .await;
    let joined = chunks.concat();
    assert!(joined.contains("once"), "got {joined}");
}

#[tokio::test]
async fn follow_stream_ends_when_task_finishes() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks
        .start_task("echo first; sleep 0.3; echo second", None)
        .await
        .unwrap();

    let collect = async {
        tasks
            .stream_output(task.id(), true)
            .await
            .unwrap()
            .collect::<Vec<String>>()
            .await
    };
    let chunks = tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("follow stream should finish with the task");
    let joined = chunks.concat();
    assert!(joined.contains("first"), "got {joined}");
    assert!(joined.contains("second"), "got {joined}");
}

#[tokio::test]
async fn stderr_chunks_are_prefixed() {
    init();
    let tasks = BackgroundTaskManager::new();
    let task = tasks.start_task("echo oops 1>&2", None).await.unwrap();
    task.wait_terminal().await;

    let chunks: Vec<String> = tasks
        .stream_output(task.id(), false)
        .await
        .unwrap()
        .collect()
        .await;
    assert!(
        chunks.iter().any(|c| c.starts_with("[stderr] ") && c.contains("oops")),
        "got {chunks:?}"
    );
}

#[tokio::test]
async fn shutdown_kills_everything_running() {
    init();
    let tasks = BackgroundTaskManager::new();
    let a = tasks.start_task("sleep 30", None).await.unwrap();
    let b = tasks.start_task("sleep 30", None).await.unwrap();

    tasks.shutdown().await;
    assert_eq!(a.status(), TaskStatus::Killed);
    assert_eq!(b.status(), TaskStatus::Killed);
}
