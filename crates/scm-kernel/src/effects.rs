use scm_types::{DatanodeCommand, NodeId, SafeModeStatus};

/// Side effects produced by an apply call, executed by the runtime after
/// the state mutation itself has committed to the in-memory tables (§9:
/// "replace the method-level interceptor pattern with an enum of
/// write-methods per manager and a single apply-dispatch function").
///
/// Effects are themselves deterministic: every replica computes the same
/// effect list from the same command, so executing them (enqueueing a
/// mailbox entry, broadcasting a status change) never causes cross-replica
/// divergence even though only the leader's execution is externally
/// visible to datanodes.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Enqueue a command into a node's outbound mailbox (§4.4
    /// `add_datanode_command`, §5 bounded per-node mailbox).
    EnqueueDatanodeCommand { node: NodeId, command: DatanodeCommand },
    /// The safe-mode status changed as a side effect of this apply (§4.7);
    /// the runtime forwards this to `scm::broadcast` subscribers.
    SafeModeStatusChanged(SafeModeStatus),
    /// A node crossed into DEAD; the runtime logs and the pipeline
    /// manager closure cascade (§4.4 sweeper) has already been folded
    /// into the same apply that produced this effect.
    NodeDeclaredDead { node: NodeId },
}
