use std::sync::Arc;
use std::time::Duration;

use exec_config::ExecdConfig;
use exec_core::{ErrorKind, TerminationReason};
use exec_estimator::{Estimator, EstimatorConfig};
use exec_hooks::HookSpec;
use exec_process::UnixPtyPort;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

use super::*;

fn test_config() -> ExecdConfig {
    ExecdConfig {
        grace_ms: 50,
        prehook_budget_ms: 2_000,
        max_sessions: 10,
        ..ExecdConfig::default()
    }
}

fn test_executor(config: ExecdConfig) -> Arc<Executor> {
    let estimator = Arc::new(Estimator::new(EstimatorConfig {
        history_max: 50,
        min_samples_high: 5,
        min_timeout_s: 1,
        max_timeout_s: 3_600,
        default_idle_s: 300,
    }));
    Executor::new(config, estimator, Arc::new(UnixPtyPort))
}

async fn next_event(rx: &mut Receiver<ExecutionNotification>) -> ExecutionEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed early")
        .event
}

#[tokio::test]
async fn execute_runs_a_simple_command_to_completion() {
    let executor = test_executor(test_config());
    let (session_id, mut rx) = executor.accept().await.unwrap();

    let result = executor
        .execute(
            session_id,
            ExecuteParams {
                command: "echo hello".to_string(),
                absolute_timeout_s: Some(5),
                idle_timeout_s: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.pid > 0);

    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));

    loop {
        match next_event(&mut rx).await {
            ExecutionEvent::Output { data, .. } => assert!(data.contains("hello")),
            ExecutionEvent::Completed { exit_code, reason, .. } => {
                assert_eq!(exit_code, Some(0));
                assert_eq!(reason, TerminationReason::Ok);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn execute_rejects_an_empty_command() {
    let executor = test_executor(test_config());
    let (session_id, _rx) = executor.accept().await.unwrap();

    let err = executor
        .execute(session_id, ExecuteParams { command: "   ".to_string(), ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::InvalidParams);
}

#[tokio::test]
async fn second_execute_while_one_is_running_is_busy() {
    let executor = test_executor(test_config());
    let (session_id, mut rx) = executor.accept().await.unwrap();

    executor
        .execute(
            session_id,
            ExecuteParams {
                command: "sleep 2".to_string(),
                absolute_timeout_s: Some(5),
                idle_timeout_s: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));

    let err = executor
        .execute(session_id, ExecuteParams { command: "echo again".to_string(), ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::Busy);
}

#[tokio::test]
async fn control_cancel_terminates_the_running_process() {
    let executor = test_executor(test_config());
    let (session_id, mut rx) = executor.accept().await.unwrap();

    let result = executor
        .execute(
            session_id,
            ExecuteParams {
                command: "sleep 30".to_string(),
                absolute_timeout_s: Some(60),
                idle_timeout_s: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));

    executor
        .control(session_id, result.request_id, ControlAction::Cancel)
        .await
        .unwrap();

    loop {
        if let ExecutionEvent::Completed { reason, .. } = next_event(&mut rx).await {
            assert_eq!(reason, TerminationReason::Cancelled);
            break;
        }
    }
}

#[tokio::test]
async fn control_with_a_stale_request_id_is_not_running() {
    let executor = test_executor(test_config());
    let (session_id, mut rx) = executor.accept().await.unwrap();

    let result = executor
        .execute(
            session_id,
            ExecuteParams {
                command: "echo hi".to_string(),
                absolute_timeout_s: Some(5),
                idle_timeout_s: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));
    loop {
        if let ExecutionEvent::Completed { .. } = next_event(&mut rx).await {
            break;
        }
    }

    let err = executor
        .control(session_id, result.request_id, ControlAction::Cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::NotRunning);
}

#[tokio::test]
async fn a_vetoing_pre_hook_prevents_spawn() {
    let mut config = test_config();
    config.pre_hooks = vec![HookSpec::Check {
        template: "exit 1".to_string(),
        timeout_ms: 1_000,
    }];
    let executor = test_executor(config);
    let (session_id, _rx) = executor.accept().await.unwrap();

    let err = executor
        .execute(session_id, ExecuteParams { command: "echo never-runs".to_string(), ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::PrecheckFailed);
}

#[tokio::test]
async fn idle_timeout_terminates_a_silent_long_running_process() {
    let config = ExecdConfig { min_timeout_s: 1, ..test_config() };
    let executor = test_executor(config);
    let (session_id, mut rx) = executor.accept().await.unwrap();

    executor
        .execute(
            session_id,
            ExecuteParams {
                command: "sleep 30".to_string(),
                absolute_timeout_s: Some(30),
                idle_timeout_s: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));

    loop {
        if let ExecutionEvent::Completed { reason, .. } = next_event(&mut rx).await {
            assert_eq!(reason, TerminationReason::IdleTimeout);
            break;
        }
    }
}

#[tokio::test]
async fn disconnect_cancels_a_live_execution_and_closes_the_session() {
    let executor = test_executor(test_config());
    let (session_id, mut rx) = executor.accept().await.unwrap();

    executor
        .execute(
            session_id,
            ExecuteParams {
                command: "sleep 30".to_string(),
                absolute_timeout_s: Some(60),
                idle_timeout_s: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, ExecutionEvent::Started { .. }));

    let before = executor.live_sessions();
    assert_eq!(before, 1);
    executor.disconnect(session_id).await;

    loop {
        if let ExecutionEvent::Completed { reason, .. } = next_event(&mut rx).await {
            assert_eq!(reason, TerminationReason::Cancelled);
            break;
        }
    }

    for _ in 0..50 {
        if executor.live_sessions() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session was never closed after disconnect");
}
