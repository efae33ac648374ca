//! Integration tests for the stream processor lifecycle
//!
//! Pausing, backpressure from the log, state commit failures, and snapshots.

mod common;

use common::{Harness, PARTITION_ID};
use eventide::db::{KeyedStateStore, MemoryBackend, SnapshotId};
use eventide::engine::CommandResponse;
use eventide::log::{LogAppendEntry, LogStream, LogStreamConfig};
use eventide::record::{
    encode_record, GroupIntent, GroupRecord, Intent, Record, RecordMetadata, UserIntent, UserRecord, NO_KEY,
    NO_POSITION,
};
use eventide::state::ProcessingState;
use eventide::stream::{StreamProcessorConfig, StreamProcessorPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const STREAM: i32 = 3;

fn command(harness: &Harness, value: GroupRecord) -> (LogAppendEntry, oneshot::Receiver<CommandResponse>) {
    let (request_id, response) = harness.responses.register(STREAM);
    let entry = LogAppendEntry {
        key: NO_KEY,
        source_record_position: NO_POSITION,
        metadata: RecordMetadata::command(Intent::Group(GroupIntent::Create)).with_request(STREAM, request_id),
        value: value.into(),
    };
    (entry, response)
}

async fn receive(response: oneshot::Receiver<CommandResponse>) -> CommandResponse {
    tokio::time::timeout(Duration::from_secs(5), response)
        .await
        .expect("no response within 5s")
        .expect("response dropped")
}

#[tokio::test]
async fn test_paused_processor_holds_commands_until_resumed() {
    let harness = Harness::start(StreamProcessorConfig::default()).await;
    harness.submit(Intent::Group(GroupIntent::Create), GroupRecord::new("g1")).await;

    harness.handle.pause().await.unwrap();
    harness
        .handle
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Paused)
        .await
        .unwrap();

    let (entry, mut response) = command(&harness, GroupRecord::new("g2"));
    let position = harness.log.try_write(vec![entry]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(response.try_recv().is_err());
    assert!(harness.handle.last_processed_position() < position);
    assert!(!harness.state().groups().exists("g2").unwrap());

    harness.handle.resume().await.unwrap();
    let response = receive(response).await;
    assert!(!response.is_rejection());
    assert_eq!(harness.handle.phase(), StreamProcessorPhase::Processing);
    assert!(harness.state().groups().exists("g2").unwrap());

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn test_backpressure_pauses_until_records_commit() {
    let log = Arc::new(LogStream::in_memory(
        PARTITION_ID,
        LogStreamConfig {
            max_uncommitted_records: 1,
            auto_commit: false,
        },
    ));
    let harness = Harness::start_with(
        Arc::new(MemoryBackend::new()),
        log.clone(),
        StreamProcessorConfig::default(),
        false,
    )
    .await;

    let (first, first_response) = command(&harness, GroupRecord::new("g1"));
    assert_eq!(log.try_write(vec![first]).unwrap(), 1);

    // a replicated command arrives behind it, filling the uncommitted window
    let (second, second_response) = command(&harness, GroupRecord::new("g2"));
    let replicated = Record {
        position: 2,
        source_record_position: second.source_record_position,
        key: second.key,
        timestamp: 0,
        partition_id: PARTITION_ID,
        metadata: second.metadata,
        value: second.value,
    };
    log.append_replicated(vec![encode_record(&replicated).unwrap()]).unwrap();

    log.set_commit_position(1);
    harness
        .handle
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Paused)
        .await
        .unwrap();
    assert_eq!(log.last_position(), 2);
    assert_eq!(harness.handle.last_processed_position(), NO_POSITION);

    log.set_commit_position(2);
    let response = receive(first_response).await;
    assert_eq!(response.intent(), Intent::Group(GroupIntent::Created));
    harness.handle.wait_for_processed(1).await.unwrap();

    // the follow-up event of the first command holds the second one back
    harness
        .handle
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Paused)
        .await
        .unwrap();
    assert_eq!(log.last_position(), 3);
    log.set_commit_position(3);
    let response = receive(second_response).await;
    assert!(!response.is_rejection());
    harness.handle.wait_for_processed(2).await.unwrap();

    // the response does not wait for the follow-up to commit
    assert_eq!(log.last_position(), 4);
    assert_eq!(harness.records().len(), 3);
    log.set_commit_position(4);

    let positions: Vec<(i64, i64)> = harness
        .records()
        .iter()
        .map(|record| (record.position, record.source_record_position))
        .collect();
    assert_eq!(positions, vec![(1, -1), (2, -1), (3, 1), (4, 2)]);

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_state_commit_fails_processor_and_restart_recovers() {
    let harness = Harness::start(StreamProcessorConfig::default()).await;
    harness.submit(Intent::User(UserIntent::Create), UserRecord::new("u1")).await;

    harness.backend.fail_next_writes(1);
    let (request_id, response) = harness.responses.register(STREAM);
    harness
        .log
        .try_write(vec![LogAppendEntry {
            key: NO_KEY,
            source_record_position: NO_POSITION,
            metadata: RecordMetadata::command(Intent::Group(GroupIntent::Create)).with_request(STREAM, request_id),
            value: GroupRecord::new("g1").into(),
        }])
        .unwrap();

    harness
        .handle
        .wait_for_phase(|phase| phase.is_terminal())
        .await
        .unwrap();
    assert_eq!(harness.handle.phase(), StreamProcessorPhase::Failed);
    // waiting requests are failed rather than left hanging
    assert!(tokio::time::timeout(Duration::from_secs(5), response)
        .await
        .unwrap()
        .is_err());
    assert!(!harness.state().groups().exists("g1").unwrap());

    let (backend, log) = (harness.backend.clone(), harness.log.clone());
    assert!(harness.stop().await.is_err());

    // the event reached the log, so replay restores what the commit lost
    let restarted = Harness::start_with(backend, log, StreamProcessorConfig::default(), false).await;
    restarted
        .handle
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Processing)
        .await
        .unwrap();
    assert!(restarted.state().groups().exists("g1").unwrap());
    assert!(restarted.state().users().exists("u1").unwrap());
    restarted.stop().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_restores_processed_state() {
    let harness = Harness::start(StreamProcessorConfig::default()).await;
    harness.submit(Intent::Group(GroupIntent::Create), GroupRecord::new("g1")).await;
    harness.submit(Intent::User(UserIntent::Create), UserRecord::new("u1")).await;

    let directory = tempfile::tempdir().unwrap();
    let snapshot = harness
        .handle
        .snapshot(directory.path().to_path_buf(), 1, 0)
        .await
        .unwrap();
    assert_eq!(snapshot.metadata.id, SnapshotId::new(PARTITION_ID, 1, 0));
    assert_eq!(
        snapshot.metadata.last_processed_position,
        harness.handle.last_processed_position()
    );

    let (store, metadata) = KeyedStateStore::restore_snapshot(
        directory.path(),
        snapshot.metadata.id,
        Arc::new(MemoryBackend::new()),
    )
    .unwrap();
    assert_eq!(metadata, snapshot.metadata);
    let state = ProcessingState::new(PARTITION_ID, store);
    assert!(state.groups().exists("g1").unwrap());
    assert!(state.users().exists("u1").unwrap());
    assert_eq!(
        state.last_processed().get().unwrap(),
        snapshot.metadata.last_processed_position
    );

    harness.stop().await.unwrap();
}

#[tokio::test]
async fn test_closed_processor_rejects_control_requests() {
    let harness = Harness::start(StreamProcessorConfig::default()).await;
    let handle = harness.handle.clone();
    harness.stop().await.unwrap();

    assert_eq!(handle.phase(), StreamProcessorPhase::Closed);
    assert!(handle.pause().await.is_err());
    // closing twice is fine
    handle.close().await.unwrap();
}
