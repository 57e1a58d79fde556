//! `scm_kernel::ReplicatedLogHandle` implemented over a [`Replica`] and a
//! [`Transport`] (§4.2/§4.3). This is where the "blocking until the log
//! commit future resolves" suspension point in §5 actually lives: a
//! caller blocked in `submit` is, concretely, a thread spinning this
//! handle's `recv_timeout` loop until its own command shows up in
//! `newly_committed` or the deadline (§5 "Every `submit` has a wall-clock
//! deadline") expires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use scm_types::{ClientId, Command, Result, ScmError, SequenceNumber};

use crate::replica::{Replica, ReplicaEvent};
use crate::transport::Transport;

/// Drives one replica's state machine against a transport, exposing the
/// blocking `submit`/`role`/`leader_hint` surface `scm-kernel::HaGateway`
/// needs (§4.3's `ReplicatedLogHandle`).
pub struct ReplicaHandle<T: Transport> {
    replica: Mutex<Replica>,
    transport: T,
    submit_timeout: Duration,
    local_clock_millis: AtomicU64,
    /// Effects accumulated from every `step` call on this replica, drained
    /// by the caller that owns the process (`scm`'s bootstrap, or
    /// `scm-cluster-dev`'s harness) rather than executed inline here —
    /// this crate has no business doing I/O (§4.3 keeps the consensus
    /// layer a pure state machine plus a transport seam).
    pending_effects: Mutex<Vec<scm_kernel::Effect>>,
}

impl<T: Transport> ReplicaHandle<T> {
    #[must_use]
    pub fn new(replica: Replica, transport: T, submit_timeout: Duration) -> Self {
        Self {
            replica: Mutex::new(replica),
            transport,
            submit_timeout,
            local_clock_millis: AtomicU64::new(0),
            pending_effects: Mutex::new(Vec::new()),
        }
    }

    /// Removes and returns every effect accumulated since the last call.
    /// Every replica in the group computes the same effect list from the
    /// same committed entry, so this is safe to call on followers too —
    /// only the leader's execution of `EnqueueDatanodeCommand` is
    /// externally meaningful, but e.g. `SafeModeStatusChanged` is worth
    /// broadcasting everywhere.
    pub fn drain_effects(&self) -> Vec<scm_kernel::Effect> {
        std::mem::take(&mut self.pending_effects.lock().expect("effects lock poisoned"))
    }

    fn tick_local_clock(&self) -> u64 {
        self.local_clock_millis.fetch_add(1, Ordering::Relaxed)
    }

    fn send_all(&self, messages: Vec<crate::message::Message>) {
        for message in messages {
            self.transport.send(message);
        }
    }

    /// Applies every queued inbound protocol message to the replica
    /// without blocking. Callers (a dedicated receiver task in
    /// `scm-server`, or the test harness in `scm-cluster-dev`) should
    /// call this continuously; `submit` also calls it inline while
    /// waiting on its own command so a single-process dev cluster makes
    /// progress even with only one thread driving it.
    pub fn pump_once(&self, timeout: Duration) -> bool {
        let self_id = { self.replica.lock().expect("replica lock poisoned").id };
        let Some(message) = self.transport.recv_timeout(self_id, timeout) else { return false };
        let local_millis = self.tick_local_clock();
        let mut replica = self.replica.lock().expect("replica lock poisoned");
        let output = replica.step(ReplicaEvent::Receive(message), local_millis);
        drop(replica);
        self.send_all(output.messages);
        if !output.effects.is_empty() {
            self.pending_effects.lock().expect("effects lock poisoned").extend(output.effects);
        }
        true
    }

    pub fn id(&self) -> crate::types::ReplicaId {
        self.replica.lock().expect("replica lock poisoned").id
    }
}

impl<T: Transport> scm_kernel::ReplicatedLogHandle for ReplicaHandle<T> {
    fn role(&self) -> scm_kernel::Role {
        if self.replica.lock().expect("replica lock poisoned").is_leader() {
            scm_kernel::Role::Leader
        } else {
            scm_kernel::Role::Follower
        }
    }

    fn submit(&self, command: Command) -> Result<Vec<u8>> {
        let (client_id, sequence) = (command.client_id, command.sequence);
        let target_op;
        {
            let mut replica = self.replica.lock().expect("replica lock poisoned");
            if !replica.is_leader() {
                return Err(ScmError::NotLeader { leader_hint: Some(replica.leader_hint().to_string()) });
            }
            let local_millis = self.tick_local_clock();
            let output = replica.step(ReplicaEvent::ClientSubmit(command), local_millis);
            target_op = replica.op_number;
            drop(replica);
            self.send_all(output.messages);
            if !output.effects.is_empty() {
                self.pending_effects.lock().expect("effects lock poisoned").extend(output.effects);
            }
            if let Some(reply) = output.newly_committed.iter().find_map(|(op, reply)| (*op == target_op).then_some(reply)) {
                return Ok(reply.clone());
            }
        }

        let deadline = Instant::now() + self.submit_timeout;
        while Instant::now() < deadline {
            if !self.pump_once(Duration::from_millis(20)) {
                continue;
            }
            let replica = self.replica.lock().expect("replica lock poisoned");
            if let Some(reply) = replica.client_sessions.lookup(client_id, sequence).cached() {
                return Ok(reply);
            }
        }
        Err(ScmError::Timeout(format!("submit of {client_id:?}/{sequence:?} did not commit within deadline")))
    }

    fn leader_hint(&self) -> Option<String> {
        Some(self.replica.lock().expect("replica lock poisoned").leader_hint().to_string())
    }
}

impl crate::client_sessions::Lookup<'_> {
    fn cached(&self) -> Option<Vec<u8>> {
        match self {
            crate::client_sessions::Lookup::CachedReply(reply) | crate::client_sessions::Lookup::Stale(reply) => {
                Some((*reply).to_vec())
            }
            crate::client_sessions::Lookup::Fresh => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::replica::Replica;
    use crate::types::ReplicaId;
    use scm_directory_ref::RandomPlacementPolicy;
    use scm_kernel::{Runtime, RuntimeConfig};
    use std::sync::mpsc::{Receiver, Sender};

    struct LoopbackTransport {
        tx: Sender<Message>,
        rx: Mutex<Receiver<Message>>,
    }

    impl Transport for LoopbackTransport {
        fn send(&self, message: Message) {
            let _ = self.tx.send(message);
        }

        fn recv_timeout(&self, _self_id: ReplicaId, timeout: Duration) -> Option<Message> {
            self.rx.lock().expect("poisoned").recv_timeout(timeout).ok()
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig {
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
    fn single_replica_group_commits_immediately() {
        let replica =
            Replica::new(ReplicaId(0), vec![ReplicaId(0)], std::sync::Arc::new(Runtime::new(config(), Box::new(RandomPlacementPolicy))));
        let (tx, rx) = std::sync::mpsc::channel();
        let transport = LoopbackTransport { tx, rx: Mutex::new(rx) };
        let handle = ReplicaHandle::new(replica, transport, Duration::from_millis(500));

        assert!(matches!(handle.role(), scm_kernel::Role::Leader));

        let method = scm_kernel::NodeWriteMethod::Register {
            node_id: scm_types::NodeId::random(),
            details: scm_types::NodeDetails {
                node_id: None,
                hostname: "dn0".into(),
                ip_address: "10.0.0.1".into(),
                ports: vec![9860],
            },
            report: scm_types::NodeReport {
                volumes: vec![scm_types::StorageVolumeReport {
                    capacity_bytes: 100,
                    used_bytes: 0,
                    remaining_bytes: 100,
                    volume_type: scm_types::VolumeType::Disk,
                }],
                metadata_volume_count: 1,
                healthy_volume_count: 1,
            },
        };
        let command = Command {
            tag: scm_types::CommandTag::Node,
            method: method.name().to_string(),
            argument: postcard::to_allocvec(&method).unwrap(),
            client_id: ClientId(1),
            sequence: SequenceNumber(1),
        };
        let reply_bytes = handle.submit(command).expect("single-replica submit always commits");
        let reply: scm_kernel::Reply = postcard::from_bytes(&reply_bytes).unwrap();
        assert!(matches!(reply, scm_kernel::Reply::NodeRegistered { already_registered: false, .. }));
    }
}
