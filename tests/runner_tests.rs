// ABOUTME: Tests for the run loop that keeps the bot alive until shutdown
// ABOUTME: Checks a dead worker ends the run with an error and the session is always closed

use mirai::runner::run_until_shutdown;
use mirai_core::{PollOptions, Session, SessionConfig};
use mirai_gateway::mock::MockGateway;
use std::sync::Arc;
use std::time::Duration;

async fn running_session(mock: &MockGateway) -> Session {
    let config = SessionConfig::from_parts("localhost", 8080, "secret", 1)
        .unwrap()
        .with_polling(PollOptions {
            interval_ms: 5,
            queue_timeout_ms: 20,
            ..PollOptions::default()
        })
        .unwrap();
    let mut session = Session::new(config, Arc::new(mock.clone())).unwrap();
    session.enable().await.unwrap();
    session.begin_worker().unwrap();
    session
}

#[tokio::test]
async fn test_dead_worker_ends_run_with_error() {
    let mock = MockGateway::new().with_fetch_error("gateway down");
    let mut session = running_session(&mock).await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_until_shutdown(&mut session, std::future::pending::<anyhow::Result<()>>()),
    )
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("stopped unexpectedly"));
    assert!(format!("{:#}", err).contains("gateway down"));
    assert!(!session.is_enabled());
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test]
async fn test_shutdown_signal_closes_cleanly() {
    let mock = MockGateway::new();
    let mut session = running_session(&mock).await;

    let shutdown = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    };
    run_until_shutdown(&mut session, shutdown).await.unwrap();

    assert!(!session.is_enabled());
    assert!(!session.is_running());
    assert_eq!(mock.release_count(), 1);
}

#[tokio::test]
async fn test_failed_shutdown_listener_is_reported() {
    let mock = MockGateway::new();
    let mut session = running_session(&mock).await;

    let err = run_until_shutdown(&mut session, async { Err(anyhow::anyhow!("no signals")) })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no signals"));
    session.close(true).await.unwrap();
}
