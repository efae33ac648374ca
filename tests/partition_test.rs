//! Integration tests for partitions and the node runtime
//!
//! Commands go in through `submit`, events come out through the exporters,
//! and snapshots compact the log behind the slowest exporter.

mod common;

use common::create_test_logger;
use eventide::cluster::{ClusterOperation, MemberId};
use eventide::config::EngineConfig;
use eventide::exporter::{Exporter, ExporterError, ExporterRepository};
use eventide::partition::{CommandRequest, Partition, PartitionError};
use eventide::record::{EntityType, GroupIntent, GroupRecord, Intent, Record, UserIntent, UserRecord};
use eventide::runtime::{EngineRuntime, RuntimeError};
use eventide::state::decode_partition_id;
use eventide::stream::StreamProcessorPhase;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(i64, Intent)>>>);

impl Recorded {
    fn intents(&self) -> Vec<Intent> {
        self.0.lock().unwrap().iter().map(|(_, intent)| *intent).collect()
    }
}

struct Recorder {
    recorded: Recorded,
}

impl Exporter for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    fn export(&mut self, record: &Record) -> Result<(), ExporterError> {
        self.recorded.0.lock().unwrap().push((record.position, record.intent()));
        Ok(())
    }

    fn purge(&mut self) -> Result<(), ExporterError> {
        self.recorded.0.lock().unwrap().clear();
        Ok(())
    }
}

fn repository(recorded: &Recorded) -> Arc<ExporterRepository> {
    let repository = Arc::new(ExporterRepository::new());
    let recorded = recorded.clone();
    repository.register("recorder", move || {
        Box::new(Recorder {
            recorded: recorded.clone(),
        }) as Box<dyn Exporter>
    });
    repository
}

async fn started(partition: &Partition) {
    partition
        .processor()
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Processing)
        .await
        .unwrap();
}

async fn wait_for_export(partition: &Partition, position: i64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while partition.exporter_positions().get("recorder").unwrap_or(-1) < position {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events not exported within 5s");
}

#[tokio::test]
async fn test_submitted_commands_are_exported_and_compacted() {
    let recorded = Recorded::default();
    let partition = Partition::start(1, &EngineConfig::default(), &repository(&recorded), create_test_logger())
        .unwrap();
    started(&partition).await;

    partition
        .submit(CommandRequest::new(Intent::User(UserIntent::Create), UserRecord::new("u1")))
        .await
        .unwrap();
    partition
        .submit(CommandRequest::new(Intent::Group(GroupIntent::Create), GroupRecord::new("g1")))
        .await
        .unwrap();
    let response = partition
        .submit(CommandRequest::new(
            Intent::Group(GroupIntent::AddEntity),
            GroupRecord::new("g1").with_entity("u1", EntityType::User),
        ))
        .await
        .unwrap();
    assert_eq!(response.intent(), Intent::Group(GroupIntent::EntityAdded));

    wait_for_export(&partition, 6).await;
    assert_eq!(
        recorded.intents(),
        vec![
            Intent::User(UserIntent::Created),
            Intent::Group(GroupIntent::Created),
            Intent::Group(GroupIntent::EntityAdded),
        ]
    );

    let directory = tempfile::tempdir().unwrap();
    let snapshot = partition
        .snapshot(directory.path().to_path_buf(), 1)
        .await
        .unwrap();
    assert_eq!(snapshot.metadata.last_processed_position, 5);
    // everything up to the last processed command is covered by the snapshot
    assert_eq!(partition.log().first_position(), 6);

    partition.close().await.unwrap();
}

#[tokio::test]
async fn test_paused_partition_refuses_commands() {
    let partition = Partition::start(
        1,
        &EngineConfig::default(),
        &ExporterRepository::new(),
        create_test_logger(),
    )
    .unwrap();
    started(&partition).await;

    partition.processor().pause().await.unwrap();
    partition
        .processor()
        .wait_for_phase(|phase| phase == StreamProcessorPhase::Paused)
        .await
        .unwrap();

    let error = partition
        .submit(CommandRequest::new(Intent::Group(GroupIntent::Create), GroupRecord::new("g1")))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        PartitionError::Unavailable {
            partition_id: 1,
            phase: StreamProcessorPhase::Paused
        }
    ));
    assert_eq!(partition.log().last_position(), 0);

    partition.close().await.unwrap();
}

#[tokio::test]
async fn test_runtime_routes_commands_to_partitions() {
    let recorded = Recorded::default();
    let config = EngineConfig::default().with_node_id(3).with_partition_count(2);
    let runtime = EngineRuntime::start(config, repository(&recorded), create_test_logger()).unwrap();
    for partition_id in [1, 2] {
        started(runtime.partition(partition_id).unwrap()).await;
    }

    let response = runtime
        .submit(2, CommandRequest::new(Intent::Group(GroupIntent::Create), GroupRecord::new("g1")))
        .await
        .unwrap();
    assert_eq!(decode_partition_id(response.key), 2);
    assert!(matches!(
        runtime.partition(3).err(),
        Some(RuntimeError::UnknownPartition(3))
    ));

    let configuration = runtime
        .change_cluster(ClusterOperation::DeleteHistory { member_id: MemberId(3) })
        .await
        .unwrap();
    assert_eq!(configuration.member(MemberId(3)).unwrap().partitions.len(), 2);

    runtime.shutdown().await.unwrap();
}
