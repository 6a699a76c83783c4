use super::*;
use exec_core::RequestIdAllocator;

#[tokio::test]
async fn over_cap_accept_is_rejected() {
    let manager: Arc<SessionManager<()>> = SessionManager::new(1, 16);
    let (first, _rx) = manager.accept().await.unwrap();
    assert_eq!(manager.live_count(), 1);
    let result = manager.accept().await;
    assert_eq!(result.err(), Some(ErrorKind::Busy));

    manager.begin_disconnect(first).await;
    let second = manager.accept().await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn second_execute_while_running_is_busy() {
    let manager: Arc<SessionManager<()>> = SessionManager::new(10, 16);
    let (session_id, _rx) = manager.accept().await.unwrap();
    let allocator = RequestIdAllocator::default();

    manager
        .begin_execution(session_id, &allocator, "sleep 10".to_string())
        .await
        .unwrap();
    let second = manager
        .begin_execution(session_id, &allocator, "echo hi".to_string())
        .await;
    assert_eq!(second.err(), Some(ErrorKind::Busy));
}

#[tokio::test]
async fn finishing_an_execution_frees_the_slot_for_a_new_one() {
    let manager: Arc<SessionManager<()>> = SessionManager::new(10, 16);
    let (session_id, _rx) = manager.accept().await.unwrap();
    let allocator = RequestIdAllocator::default();

    manager
        .begin_execution(session_id, &allocator, "echo first".to_string())
        .await
        .unwrap();
    manager
        .finish_execution(session_id, TerminationReason::Ok, Some(0))
        .await
        .unwrap();

    let second = manager
        .begin_execution(session_id, &allocator, "echo second".to_string())
        .await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn notifications_are_delivered_in_send_order() {
    let manager: Arc<SessionManager<u32>> = SessionManager::new(10, 16);
    let (session_id, mut rx) = manager.accept().await.unwrap();

    for i in 0..5u32 {
        manager.send(session_id, i).await.unwrap();
    }
    drop(manager);

    let mut received = Vec::new();
    while let Some(n) = rx.recv().await {
        received.push(n);
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn disconnect_without_a_live_execution_closes_immediately() {
    let manager: Arc<SessionManager<()>> = SessionManager::new(10, 16);
    let (session_id, _rx) = manager.accept().await.unwrap();
    let needs_drain = manager.begin_disconnect(session_id).await;
    assert!(!needs_drain);
    assert_eq!(manager.live_count(), 0);
    assert_eq!(manager.state(session_id).await, None);
}

#[tokio::test]
async fn disconnect_with_a_live_execution_drains_then_closes() {
    let manager: Arc<SessionManager<()>> = SessionManager::new(10, 16);
    let (session_id, _rx) = manager.accept().await.unwrap();
    let allocator = RequestIdAllocator::default();
    manager
        .begin_execution(session_id, &allocator, "sleep 10".to_string())
        .await
        .unwrap();

    let needs_drain = manager.begin_disconnect(session_id).await;
    assert!(needs_drain);
    assert_eq!(manager.state(session_id).await, Some(SessionState::Draining));

    manager.close(session_id).await;
    assert_eq!(manager.state(session_id).await, None);
    assert_eq!(manager.live_count(), 0);
}
