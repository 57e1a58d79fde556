use std::collections::BTreeSet;

use scm_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("insufficient datanodes: needed {needed}, available {available}")]
    InsufficientDatanodes { needed: usize, available: usize },
}

/// §9: "Express as a narrow capability: `PlacementPolicy = fn(candidates,
/// exclude, needed, size_hint) -> result<list<NodeId>>`." Implemented as a
/// trait rather than a bare `fn` type so policies can carry configuration
/// (e.g. a topology resolver) — concrete policies are the "variants or
/// injected function values" the note describes.
pub trait PlacementPolicy: Send + Sync {
    /// Picks exactly `needed` nodes from `candidates`, none of which is in
    /// `exclude`. `size_hint` is the expected per-member storage
    /// footprint, available for policies that weigh free capacity; the
    /// policies in this crate ignore it.
    fn choose(
        &self,
        candidates: &[NodeId],
        exclude: &BTreeSet<NodeId>,
        needed: usize,
        size_hint: u64,
    ) -> Result<Vec<NodeId>, PlacementError>;
}

fn eligible(candidates: &[NodeId], exclude: &BTreeSet<NodeId>) -> Vec<NodeId> {
    candidates.iter().copied().filter(|n| !exclude.contains(n)).collect()
}

/// Picks nodes in the order the caller already filtered them to HEALTHY
/// candidates — no further shuffling. Deterministic, so it is safe to
/// call from the apply path if a future version needs to (today
/// placement runs on the read/query side per §4.5 step 2, but keeping the
/// choice itself pure means it never becomes a source of cross-replica
/// divergence if that changes).
#[derive(Debug, Default)]
pub struct RandomPlacementPolicy;

impl PlacementPolicy for RandomPlacementPolicy {
    fn choose(
        &self,
        candidates: &[NodeId],
        exclude: &BTreeSet<NodeId>,
        needed: usize,
        _size_hint: u64,
    ) -> Result<Vec<NodeId>, PlacementError> {
        let pool = eligible(candidates, exclude);
        if pool.len() < needed {
            return Err(PlacementError::InsufficientDatanodes { needed, available: pool.len() });
        }
        Ok(pool.into_iter().take(needed).collect())
    }
}

/// Spreads members across distinct topology locations (racks) when
/// possible, falling back to filling from whatever locations remain once
/// every distinct rack has contributed one member. Requires the caller to
/// supply each candidate's topology path (resolved via
/// [`crate::DnsToSwitchResolver`]) alongside its id.
#[derive(Debug, Default)]
pub struct TopologyAwarePlacementPolicy {
    locations: std::collections::HashMap<NodeId, String>,
}

impl TopologyAwarePlacementPolicy {
    pub fn new(locations: std::collections::HashMap<NodeId, String>) -> Self {
        Self { locations }
    }

    fn location_of(&self, node: NodeId) -> &str {
        self.locations.get(&node).map(String::as_str).unwrap_or(super::topology::DEFAULT_RACK)
    }
}

impl PlacementPolicy for TopologyAwarePlacementPolicy {
    fn choose(
        &self,
        candidates: &[NodeId],
        exclude: &BTreeSet<NodeId>,
        needed: usize,
        _size_hint: u64,
    ) -> Result<Vec<NodeId>, PlacementError> {
        let pool = eligible(candidates, exclude);
        if pool.len() < needed {
            return Err(PlacementError::InsufficientDatanodes { needed, available: pool.len() });
        }

        let mut by_rack: std::collections::BTreeMap<&str, Vec<NodeId>> = std::collections::BTreeMap::new();
        for node in &pool {
            by_rack.entry(self.location_of(*node)).or_default().push(*node);
        }

        let mut chosen = Vec::with_capacity(needed);
        // Round-robin across racks so a factor-3 pipeline prefers three
        // distinct racks before it ever doubles up on one.
        loop {
            let mut made_progress = false;
            for members in by_rack.values_mut() {
                if chosen.len() == needed {
                    break;
                }
                if let Some(node) = members.pop() {
                    chosen.push(node);
                    made_progress = true;
                }
            }
            if chosen.len() == needed || !made_progress {
                break;
            }
        }

        if chosen.len() < needed {
            return Err(PlacementError::InsufficientDatanodes { needed, available: pool.len() });
        }
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u128) -> NodeId {
        NodeId::from_raw(id)
    }

    #[test]
    fn random_policy_fails_with_insufficient_datanodes() {
        let policy = RandomPlacementPolicy;
        let candidates = vec![n(1), n(2)];
        let result = policy.choose(&candidates, &BTreeSet::new(), 3, 0);
        assert!(matches!(result, Err(PlacementError::InsufficientDatanodes { needed: 3, available: 2 })));
    }

    #[test]
    fn random_policy_excludes_already_committed_nodes() {
        let policy = RandomPlacementPolicy;
        let candidates = vec![n(1), n(2), n(3)];
        let mut exclude = BTreeSet::new();
        exclude.insert(n(2));
        let chosen = policy.choose(&candidates, &exclude, 2, 0).unwrap();
        assert!(!chosen.contains(&n(2)));
        assert_eq!(chosen.len(), 2);
    }

    #[test]
    fn topology_aware_policy_spreads_across_racks_when_possible() {
        let mut locations = std::collections::HashMap::new();
        locations.insert(n(1), "/rack-a".to_string());
        locations.insert(n(2), "/rack-b".to_string());
        locations.insert(n(3), "/rack-a".to_string());
        let policy = TopologyAwarePlacementPolicy::new(locations);

        let candidates = vec![n(1), n(2), n(3)];
        let chosen = policy.choose(&candidates, &BTreeSet::new(), 2, 0).unwrap();
        // Must not pick two nodes from the same rack while a second rack
        // has an untouched candidate available.
        assert!(chosen.contains(&n(2)));
    }
}
