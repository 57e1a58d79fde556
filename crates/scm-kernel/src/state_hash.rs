use crate::state::KernelState;

/// Deterministic content hash of the three manager tables (§8: "F's
/// in-memory maps match the leader's exactly" after snapshot install).
/// Built the same way [`scm_types::pipeline::member_set_hash`] is: a
/// fixed FNV-1a fold over a canonically ordered byte stream, never
/// `std::collections::hash_map::DefaultHasher` (unstable across Rust
/// versions and processes, which would make this comparison meaningless
/// across replicas running different toolchains).
pub fn content_hash(state: &KernelState) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut mix = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
    };

    let nodes = state.nodes.read().expect("node table lock poisoned");
    for (id, info) in &nodes.by_id {
        mix(&id.as_u128().to_le_bytes());
        mix(&(info.health as u8 as u64).to_le_bytes());
        mix(&info.healthy_volume_count.to_le_bytes());
    }
    drop(nodes);

    let pipelines = state.pipelines.read().expect("pipeline table lock poisoned");
    for (id, pipeline) in &pipelines.by_id {
        mix(&id.as_u128().to_le_bytes());
        mix(&pipeline.member_set_hash.to_le_bytes());
        mix(&(pipeline.state as u8 as u64).to_le_bytes());
    }
    drop(pipelines);

    let containers = state.containers.read().expect("container table lock poisoned");
    mix(&containers.next_container_id.to_le_bytes());
    for (id, info) in &containers.by_id {
        mix(&id.as_u64().to_le_bytes());
        mix(&(info.state as u8 as u64).to_le_bytes());
        mix(&info.used_bytes.to_le_bytes());
    }
    drop(containers);

    // Fold in a constant so an entirely-empty state still produces a
    // value distinct from the zero-initialized seed (keeps the hash from
    // looking accidentally "unset").
    mix(b"scm-kernel-state-hash");
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_states_hash_identically() {
        let a = KernelState::new();
        let b = KernelState::new();
        assert_eq!(content_hash(&a), content_hash(&b));
    }
}
