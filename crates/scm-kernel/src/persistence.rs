//! Flushing [`KernelState`] to, and rebuilding it from, the persistent KV
//! store (§4.1/§4.2 `take_snapshot`/`install_snapshot`). The replicated
//! log only carries commands, never state; a replica falling too far
//! behind to repair from the log is brought current by installing a
//! checkpoint of this encoding instead.
//!
//! Each table is keyed by its id's postcard encoding (a fixed-width,
//! order-preserving enough encoding for the small `u64`/`u128` ids this
//! workspace uses) with the corresponding `scm_types` value postcard-
//! encoded as well. The `meta` table additionally carries the container
//! id counter and the replicated log's last-applied index, the two bits
//! of ancillary state that live outside the three per-manager tables.

use scm_kv::{KvResult, KvStore, TableName, WriteBatch};
use scm_types::{ContainerInfo, NodeInfo, Pipeline, SafeModeStatus};

use crate::state::KernelState;

const LAST_APPLIED_KEY: &[u8] = b"last_applied_index";
const NEXT_CONTAINER_ID_KEY: &[u8] = b"next_container_id";
const SAFE_MODE_KEY: &[u8] = b"safe_mode_status";

/// Overwrites every table in `store` with the contents of `state` (§4.2
/// `take_snapshot`). Callers are expected to have already called
/// [`KvStore::compact_all`] via [`KvStore::checkpoint`] if the result is
/// headed off-box; this function only rewrites the tables in place.
pub fn persist(state: &KernelState, store: &KvStore, last_applied_index: u64) -> KvResult<()> {
    let mut nodes_batch = WriteBatch::new();
    for (id, info) in &state.nodes.read().expect("node table lock poisoned").by_id {
        let key = postcard::to_allocvec(id).expect("NodeId always encodes");
        let value = postcard::to_allocvec(info).expect("NodeInfo always encodes");
        nodes_batch.put(key, value);
    }
    store.table(TableName::Nodes).write_batch(&nodes_batch)?;

    let mut pipelines_batch = WriteBatch::new();
    for (id, pipeline) in &state.pipelines.read().expect("pipeline table lock poisoned").by_id {
        let key = postcard::to_allocvec(id).expect("PipelineId always encodes");
        let value = postcard::to_allocvec(pipeline).expect("Pipeline always encodes");
        pipelines_batch.put(key, value);
    }
    store.table(TableName::Pipelines).write_batch(&pipelines_batch)?;

    let containers = state.containers.read().expect("container table lock poisoned");
    let mut containers_batch = WriteBatch::new();
    for (id, info) in &containers.by_id {
        let key = postcard::to_allocvec(id).expect("ContainerId always encodes");
        let value = postcard::to_allocvec(info).expect("ContainerInfo always encodes");
        containers_batch.put(key, value);
    }
    store.table(TableName::Containers).write_batch(&containers_batch)?;

    let next_container_id = containers.next_container_id;
    drop(containers);

    let safe_mode = *state.safe_mode.read().expect("safe-mode lock poisoned");
    let mut meta_batch = WriteBatch::new();
    meta_batch.put(LAST_APPLIED_KEY.to_vec(), last_applied_index.to_le_bytes().to_vec());
    meta_batch.put(NEXT_CONTAINER_ID_KEY.to_vec(), next_container_id.to_le_bytes().to_vec());
    meta_batch.put(SAFE_MODE_KEY.to_vec(), postcard::to_allocvec(&safe_mode).expect("SafeModeStatus always encodes"));
    store.table(TableName::Meta).write_batch(&meta_batch)?;

    Ok(())
}

/// Rebuilds a fresh [`KernelState`] from `store`'s current contents
/// (§4.2 `install_snapshot`). Used when catching a replica up from a
/// checkpoint rather than replaying the log from the beginning.
pub fn load(store: &KvStore) -> KernelState {
    let state = KernelState::new();

    {
        let mut nodes = state.nodes.write().expect("node table lock poisoned");
        for (key, value) in store.table(TableName::Nodes).range_forward(&[]) {
            let id: scm_types::NodeId = postcard::from_bytes(&key).expect("persisted NodeId key is well-formed");
            let info: NodeInfo = postcard::from_bytes(&value).expect("persisted NodeInfo value is well-formed");
            nodes.by_hostname.insert(info.hostname.clone(), id);
            nodes.by_ip.insert(info.ip_address.clone(), id);
            nodes.command_queues.insert(id, std::collections::VecDeque::new());
            nodes.by_id.insert(id, info);
        }
    }

    {
        let mut pipelines = state.pipelines.write().expect("pipeline table lock poisoned");
        for (key, value) in store.table(TableName::Pipelines).range_forward(&[]) {
            let id: scm_types::PipelineId = postcard::from_bytes(&key).expect("persisted PipelineId key is well-formed");
            let pipeline: Pipeline = postcard::from_bytes(&value).expect("persisted Pipeline value is well-formed");
            pipelines.by_id.insert(id, pipeline);
        }
    }

    {
        let mut containers = state.containers.write().expect("container table lock poisoned");
        for (key, value) in store.table(TableName::Containers).range_forward(&[]) {
            let id: scm_types::ContainerId = postcard::from_bytes(&key).expect("persisted ContainerId key is well-formed");
            let info: ContainerInfo = postcard::from_bytes(&value).expect("persisted ContainerInfo value is well-formed");
            containers.by_id.insert(id, info);
        }
        if let Some(raw) = store.table(TableName::Meta).try_get(NEXT_CONTAINER_ID_KEY) {
            containers.next_container_id = u64::from_le_bytes(raw.try_into().expect("next_container_id is 8 bytes"));
        }
    }

    if let Some(raw) = store.table(TableName::Meta).try_get(SAFE_MODE_KEY) {
        let safe_mode: SafeModeStatus = postcard::from_bytes(&raw).expect("persisted SafeModeStatus is well-formed");
        *state.safe_mode.write().expect("safe-mode lock poisoned") = safe_mode;
    }

    state
}

/// The replicated log's last-applied index as of the most recent
/// [`persist`] call, or `0` if the store has never been written to.
pub fn last_applied_index(store: &KvStore) -> u64 {
    store
        .table(TableName::Meta)
        .try_get(LAST_APPLIED_KEY)
        .map(|raw| u64::from_le_bytes(raw.try_into().expect("last_applied_index is 8 bytes")))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_directory_ref::RandomPlacementPolicy;
    use scm_types::{ClientId, CommandTag, NodeDetails, NodeId, NodeReport, SequenceNumber, StorageVolumeReport, VolumeType};
    use tempfile::tempdir;

    fn runtime_config() -> crate::runtime::RuntimeConfig {
        crate::runtime::RuntimeConfig {
            queue_depth_limit: 16,
            pipelines_per_metadata_volume: 10,
            max_container_size_bytes: 5_000_000_000,
            preallocate_threshold_bytes: 100_000_000,
            min_datanodes: 1,
            container_replica_threshold: 0.99,
            pipeline_availability_check: false,
            pipeline_threshold: 0.9,
        }
    }

    #[test]
    fn persist_then_load_round_trips_a_registered_node() {
        let runtime = crate::runtime::Runtime::new(runtime_config(), Box::new(RandomPlacementPolicy));
        let node_id = NodeId::random();
        let method = crate::command::NodeWriteMethod::Register {
            node_id,
            details: NodeDetails { node_id: None, hostname: "dn0".into(), ip_address: "10.0.0.1".into(), ports: vec![9860] },
            report: NodeReport {
                volumes: vec![StorageVolumeReport { capacity_bytes: 100, used_bytes: 0, remaining_bytes: 100, volume_type: VolumeType::Disk }],
                metadata_volume_count: 1,
                healthy_volume_count: 1,
            },
        };
        let command = scm_types::Command {
            tag: CommandTag::Node,
            method: method.name().to_string(),
            argument: postcard::to_allocvec(&method).unwrap(),
            client_id: ClientId(1),
            sequence: SequenceNumber(1),
        };
        runtime.apply_committed(&command, 0, true, 0).unwrap();

        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        persist(&runtime.state, &store, 1).unwrap();
        assert_eq!(last_applied_index(&store), 1);

        let loaded = load(&store);
        assert!(loaded.nodes.read().unwrap().by_id.contains_key(&node_id));
    }

    #[test]
    fn container_counter_survives_a_round_trip() {
        let runtime = crate::runtime::Runtime::new(runtime_config(), Box::new(RandomPlacementPolicy));
        {
            let mut containers = runtime.state.containers.write().unwrap();
            containers.next_container_id = 41;
        }

        let dir = tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        persist(&runtime.state, &store, 5).unwrap();

        let loaded = load(&store);
        assert_eq!(loaded.containers.read().unwrap().next_container_id, 41);
    }
}
