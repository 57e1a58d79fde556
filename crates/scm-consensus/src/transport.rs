//! Transport seam between the pure `Replica` state machine and whatever
//! actually moves bytes between SCM processes. `scm-server` implements
//! this over `mio` + length-prefixed `postcard` frames for a real
//! cluster; `scm-cluster-dev` implements it over in-process channels for
//! local dev/test clusters. Neither implementation lives in this crate —
//! this is only the seam.

use std::time::Duration;

use crate::message::Message;
use crate::types::ReplicaId;

pub trait Transport: Send + Sync {
    /// Hands `message` off for delivery. Fire-and-forget: the VSR
    /// protocol itself tolerates drops and reorders (that's what repair
    /// and view change are for), so this method never blocks on
    /// confirmation.
    fn send(&self, message: Message);

    /// Blocks this thread until a message addressed to `self_id` (or a
    /// broadcast) arrives, or `timeout` elapses. Used by the blocking
    /// `submit` implementation in `gateway_handle` to wait out the quorum
    /// round without busy-polling.
    fn recv_timeout(&self, self_id: ReplicaId, timeout: Duration) -> Option<Message>;
}
