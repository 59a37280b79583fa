mod common;

use chrono::Utc;
use common::{credentials, ChannelPublisher, StubService};
use locator::config::ErrorPolicy;
use locator::session::RetryPolicy;
use locator::supervisor::{PollOptions, Supervisor};
use locator::telemetry::LocationMessage;
use locator::transport::Action;
use locator::worker::Schedule;
use locator::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn options(policy: ErrorPolicy) -> PollOptions {
    PollOptions {
        prefix: "owntracks".to_string(),
        schedule: Schedule::new(Duration::from_secs(900), Duration::from_secs(15)),
        retry: RetryPolicy::default(),
        policy,
    }
}

#[tokio::test]
async fn test_one_record_per_device_after_login() {
    let service = Arc::new(StubService::new(&["alice", "bob"], &[]));
    let (publisher, mut published) = ChannelPublisher::new();
    let publisher = Arc::new(publisher);

    let supervisor = Supervisor::new(service.clone(), publisher.clone(), options(ErrorPolicy::FailFast));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let started = Utc::now().timestamp();
    let run = tokio::spawn(supervisor.run(credentials(&["alice", "bob"]), async move {
        let _ = stop_rx.await;
    }));

    let mut records = Vec::new();
    for _ in 0..2 {
        let record = timeout(TEST_TIMEOUT, published.recv()).await.unwrap().unwrap();
        records.push(record);
    }
    let finished = Utc::now().timestamp();

    stop_tx.send(()).unwrap();
    let result = timeout(TEST_TIMEOUT, run).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(publisher.is_closed());
    assert!(published.try_recv().is_err());

    records.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(records[0].0, "owntracks/alice/iPhone12");
    assert_eq!(records[1].0, "owntracks/bob/iPhone12");

    for (_, payload) in &records {
        let message: LocationMessage = serde_json::from_slice(payload).unwrap();
        assert_eq!(message.kind, "location");
        assert!(message.tst >= started && message.tst <= finished);
        assert_eq!(message.batt, 50.0);
    }

    let requests = service.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.action == Action::InitClient));
}

#[tokio::test]
async fn test_fail_fast_reports_failing_account() {
    let accounts = ["alice", "bob", "carol", "dave"];
    let service = Arc::new(StubService::new(&accounts, &["carol"]));
    let (publisher, _published) = ChannelPublisher::new();

    let supervisor = Supervisor::new(service, Arc::new(publisher), options(ErrorPolicy::FailFast));
    let result = timeout(
        TEST_TIMEOUT,
        supervisor.run(credentials(&accounts), std::future::pending()),
    )
    .await
    .unwrap();

    match result {
        Err(Error::Account { account, source }) => {
            assert_eq!(account, "carol");
            assert!(matches!(*source, Error::AccessDenied(401)));
        }
        other => panic!("expected carol's error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_wins_without_errors() {
    let service = Arc::new(StubService::new(&["alice"], &[]));
    let (publisher, _published) = ChannelPublisher::new();
    let publisher = Arc::new(publisher);

    let supervisor = Supervisor::new(service, publisher.clone(), options(ErrorPolicy::FailFast));
    let result = timeout(
        TEST_TIMEOUT,
        supervisor.run(credentials(&["alice"]), tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .unwrap();

    assert!(result.is_ok());
    assert!(publisher.is_closed());
}

#[tokio::test]
async fn test_continue_survives_one_failed_account() {
    let service = Arc::new(StubService::new(&["alice", "bob"], &["bob"]));
    let (publisher, mut published) = ChannelPublisher::new();

    let supervisor = Supervisor::new(service, Arc::new(publisher), options(ErrorPolicy::Continue));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(supervisor.run(credentials(&["alice", "bob"]), async move {
        let _ = stop_rx.await;
    }));

    let (topic, _) = timeout(TEST_TIMEOUT, published.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "owntracks/alice/iPhone12");

    // bob's failure must not end the run
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished());

    stop_tx.send(()).unwrap();
    let result = timeout(TEST_TIMEOUT, run).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_continue_ends_when_every_worker_failed() {
    let service = Arc::new(StubService::new(&["alice", "bob"], &["alice", "bob"]));
    let (publisher, _published) = ChannelPublisher::new();

    let supervisor = Supervisor::new(service, Arc::new(publisher), options(ErrorPolicy::Continue));
    let result = timeout(
        TEST_TIMEOUT,
        supervisor.run(credentials(&["alice", "bob"]), std::future::pending()),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(Error::WorkersExited)));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_after_login_uses_issued_pair() {
    let service = Arc::new(StubService::new(&["alice"], &[]));
    let (publisher, mut published) = ChannelPublisher::new();

    let supervisor = Supervisor::new(service.clone(), Arc::new(publisher), options(ErrorPolicy::FailFast));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(supervisor.run(credentials(&["alice"]), async move {
        let _ = stop_rx.await;
    }));

    // login, then the first refresh after 900-915s
    published.recv().await.unwrap();
    published.recv().await.unwrap();

    stop_tx.send(()).unwrap();
    run.await.unwrap().unwrap();

    let requests = service.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].action, Action::InitClient);
    assert_eq!(requests[0].login, "alice");
    assert_eq!(requests[1].action, Action::RefreshClient);
    assert_eq!(requests[1].login, "1000");
    assert_eq!(requests[1].secret, "alice-token-1");
}
