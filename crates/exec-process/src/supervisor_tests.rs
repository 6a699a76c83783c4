use super::*;
use std::collections::HashSet;
use std::time::Duration;

struct UnusedPtyPort;

impl PtyPort for UnusedPtyPort {
    fn spawn(
        &self,
        _command: &str,
        _args: &[String],
        _cwd: Option<&str>,
        _env: &[(String, String)],
    ) -> Result<PtyHandle> {
        bail!("pty not exercised in this test")
    }
}

fn target(command: &str) -> SpawnTarget {
    SpawnTarget {
        command: command.to_string(),
        env_overrides: Vec::new(),
        cwd: None,
        env_denylist: HashSet::new(),
    }
}

#[tokio::test]
async fn exit_code_is_reported() {
    let mut handle = spawn(target("exit 3"), SpawnOptions::default(), &UnusedPtyPort)
        .await
        .unwrap();
    let code = handle.wait().await.unwrap();
    assert_eq!(code, 3);
}

#[tokio::test]
async fn wait_is_idempotent() {
    let mut handle = spawn(target("exit 0"), SpawnOptions::default(), &UnusedPtyPort)
        .await
        .unwrap();
    let first = handle.wait().await.unwrap();
    let second = handle.wait().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(handle.state(), ProcessState::Reaped);
}

#[tokio::test]
async fn spawning_a_missing_binary_fails() {
    let options = SpawnOptions {
        shell: false,
        ..SpawnOptions::default()
    };
    let result = spawn(target("definitely-not-a-real-binary-xyz"), options, &UnusedPtyPort).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn terminate_reaps_a_long_running_child() {
    let mut handle = spawn(target("sleep 30"), SpawnOptions::default(), &UnusedPtyPort)
        .await
        .unwrap();
    handle.terminate();
    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait()).await;
    assert!(result.is_ok(), "child was not reaped after SIGTERM");
}

#[tokio::test]
async fn pause_requires_running_state() {
    let mut handle = spawn(target("exit 0"), SpawnOptions::default(), &UnusedPtyPort)
        .await
        .unwrap();
    handle.wait().await.unwrap();
    assert!(handle.pause().is_err());
}
