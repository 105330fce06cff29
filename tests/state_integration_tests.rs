//! Integration tests for StateNotifier and session snapshots
//!
//! These tests verify that:
//! - Every subscriber receives every published event
//! - Snapshots are detached from later mutations
//! - Subscribers on other threads and tasks see events in publish order
//! - Session invariants hold across a full configure/scan cycle

use fscan::metrics::Metrics;
use fscan::models::{SessionError, SessionState};
use fscan::state::StateNotifier;
use fscan::{Installation, ProcessorEvent, ProfileConfig, ScanSide, ScanStatus};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, timeout};

fn installation() -> Installation {
    Installation::new("C:/naps2/App", "C:/naps2/Data")
}

fn profile_config() -> ProfileConfig {
    ProfileConfig::new("FrontScan", "BackScan")
}

async fn recv(rx: &mut tokio::sync::broadcast::Receiver<ProcessorEvent>) -> ProcessorEvent {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_state_change_events_emitted() {
    let notifier = StateNotifier::new(Arc::new(Metrics::new()));
    let mut rx = notifier.subscribe();

    let mut state = SessionState::new();
    state.set_installation(installation()).unwrap();
    notifier.publish_state(&state);

    let event = recv(&mut rx).await;
    assert!(
        matches!(
            &event,
            ProcessorEvent::StateChanged(snapshot)
                if snapshot.status == ScanStatus::NoProfiles
                    && snapshot.installation == Some(installation())
        ),
        "Expected NO_PROFILES snapshot, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let notifier = StateNotifier::new(Arc::new(Metrics::new()));
    let mut rx1 = notifier.subscribe();
    let mut rx2 = notifier.subscribe();
    let mut rx3 = notifier.subscribe();

    notifier.publish(ProcessorEvent::ScanFailed {
        side: ScanSide::Front,
        reason: "NAPS2.Console.exe failed with exit code 1".to_string(),
    });

    let event1 = recv(&mut rx1).await;
    let event2 = recv(&mut rx2).await;
    let event3 = recv(&mut rx3).await;

    assert_eq!(event1, event2);
    assert_eq!(event2, event3);
}

#[tokio::test]
async fn test_full_cycle_snapshots() {
    let notifier = StateNotifier::new(Arc::new(Metrics::new()));
    let mut rx = notifier.subscribe();
    let mut state = SessionState::new();

    notifier.publish_state(&state);
    state.set_installation(installation()).unwrap();
    notifier.publish_state(&state);
    state.set_profile_config(profile_config()).unwrap();
    notifier.publish_state(&state);
    state.begin_scan().unwrap();
    notifier.publish_state(&state);
    state.finish_scan();
    notifier.publish_state(&state);

    let mut statuses = Vec::new();
    for _ in 0..5 {
        match recv(&mut rx).await {
            ProcessorEvent::StateChanged(snapshot) => statuses.push(snapshot.status),
            other => panic!("Expected StateChanged, got: {:?}", other),
        }
    }

    assert_eq!(
        statuses,
        vec![
            ScanStatus::Uninitialized,
            ScanStatus::NoProfiles,
            ScanStatus::ReadyToScan,
            ScanStatus::Scanning,
            ScanStatus::ReadyToScan,
        ]
    );
}

#[test]
fn test_session_rejects_changes_while_scanning() {
    let mut state = SessionState::new();
    state.set_installation(installation()).unwrap();
    state.set_profile_config(profile_config()).unwrap();
    state.begin_scan().unwrap();

    assert_eq!(state.begin_scan(), Err(SessionError::ScanInProgress));
    assert_eq!(state.clear(), Err(SessionError::ScanInProgress));
    assert_eq!(
        state.set_installation(Installation::new("D:/App", "D:/Data")),
        Err(SessionError::ScanInProgress)
    );
    assert_eq!(state.installation(), Some(&installation()));
    assert_eq!(state.status(), ScanStatus::Scanning);
}

#[test]
fn test_subscriber_on_another_thread_sees_publish_order() {
    let notifier = StateNotifier::new(Arc::new(Metrics::new()));
    let mut rx = notifier.subscribe();

    let listener = std::thread::spawn(move || {
        let mut sides = Vec::new();
        loop {
            match rx.blocking_recv() {
                Ok(ProcessorEvent::ScanCompleted { side, .. }) => sides.push(side),
                Ok(ProcessorEvent::Finished) => return sides,
                Ok(_) => {}
                Err(e) => panic!("Receive failed: {:?}", e),
            }
        }
    });

    for i in 0..20 {
        notifier.publish(ProcessorEvent::ScanCompleted {
            side: ScanSide::from_is_front(i % 2 == 0),
            output_path: format!("C:/scans/{}.jpg", i).into(),
        });
    }
    notifier.publish(ProcessorEvent::Finished);

    let sides = listener.join().unwrap();
    assert_eq!(sides.len(), 20);
    assert!(
        sides
            .chunks(2)
            .all(|pair| pair == [ScanSide::Front, ScanSide::Back])
    );
}

#[tokio::test]
async fn test_concurrent_subscribers_in_tasks() {
    let notifier = StateNotifier::new(Arc::new(Metrics::new()));

    let mut handles = vec![];
    for _ in 0..10 {
        let mut rx = notifier.subscribe();
        handles.push(tokio::spawn(async move {
            let mut count = 0;
            while let Ok(Ok(event)) = timeout(Duration::from_millis(500), rx.recv()).await {
                if event == ProcessorEvent::Finished {
                    break;
                }
                count += 1;
            }
            count
        }));
    }

    let mut state = SessionState::new();
    state.set_installation(installation()).unwrap();
    for _ in 0..5 {
        notifier.publish_state(&state);
    }
    notifier.publish(ProcessorEvent::Finished);

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 5);
    }
}

#[test]
fn test_metrics_count_events() {
    let metrics = Arc::new(Metrics::new());
    let notifier = StateNotifier::new(Arc::clone(&metrics));

    notifier.publish(ProcessorEvent::Finished);
    let _rx = notifier.subscribe();
    notifier.publish(ProcessorEvent::Finished);

    assert_eq!(metrics.events_published.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.events_unobserved.load(Ordering::Relaxed), 1);
}
