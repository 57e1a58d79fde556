//! Wire protocol: length-prefixed `postcard` frames carrying the
//! datanode↔SCM and client↔SCM RPC surfaces (§6).
//!
//! Framing mirrors the teacher's `connection.rs` usage of a fixed-size
//! frame header plus a `BytesMut` accumulator: a 4-byte big-endian length
//! prefix followed by that many bytes of `postcard`-encoded payload.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use scm_types::{
    ClusterId, ContainerId, ContainerInfo, ContainerEvent, ContainerState, DatanodeCommand, NodeDetails, NodeId,
    NodeInfo, NodeReport, Pipeline, PipelineId, PipelineReportEntry, ReplicaReportedState, ReplicationConfig,
    SafeModeStatus, ScmId,
};

use crate::error::{ServerError, ServerResult};

/// Size of the frame length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame this server will accept, guarding against a malformed
/// or hostile length prefix driving an unbounded allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Attempts to decode one length-prefixed frame from `buf`, advancing
/// past it on success. Returns `Ok(None)` when the buffer doesn't yet
/// hold a full frame.
pub fn decode_frame(buf: &mut BytesMut) -> ServerResult<Option<BytesMut>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    let len = u32::from_be_bytes(buf[..FRAME_HEADER_SIZE].try_into().expect("slice is exactly 4 bytes")) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ServerError::Wire(format!("frame of {len} bytes exceeds the {MAX_FRAME_SIZE}-byte limit")));
    }
    if buf.len() < FRAME_HEADER_SIZE + len {
        return Ok(None);
    }
    buf.advance(FRAME_HEADER_SIZE);
    Ok(Some(buf.split_to(len)))
}

/// Appends `payload` to `out` as one length-prefixed frame.
pub fn encode_frame(payload: &[u8], out: &mut BytesMut) {
    out.put_u32(payload.len() as u32);
    out.extend_from_slice(payload);
}

pub fn decode_request(frame: &[u8]) -> ServerResult<Request> {
    postcard::from_bytes(frame).map_err(|e| ServerError::Wire(format!("request decode failed: {e}")))
}

pub fn encode_response(response: &Response, out: &mut BytesMut) -> ServerResult<()> {
    let payload = postcard::to_allocvec(response).map_err(|e| ServerError::Wire(format!("response encode failed: {e}")))?;
    encode_frame(&payload, out);
    Ok(())
}

pub fn encode_request(request: &Request, out: &mut BytesMut) -> ServerResult<()> {
    let payload = postcard::to_allocvec(request).map_err(|e| ServerError::Wire(format!("request encode failed: {e}")))?;
    encode_frame(&payload, out);
    Ok(())
}

pub fn decode_response(frame: &[u8]) -> ServerResult<Response> {
    postcard::from_bytes(frame).map_err(|e| ServerError::Wire(format!("response decode failed: {e}")))
}

/// One container replica's reported condition, as carried in a
/// `ReportContainer` RPC (§6). `ContainerReplica` in `scm_types` also
/// carries `node_id`/`last_seen_millis`; those are filled in by the
/// handler from `NodeDetails`/the apply-time clock rather than trusted
/// from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerReportEntry {
    pub container_id: ContainerId,
    pub reported_state: ReplicaReportedState,
    pub bytes_used: u64,
    pub key_count: u64,
}

pub type ContainerReport = Vec<ContainerReportEntry>;
pub type PipelineReport = Vec<PipelineReportEntry>;

/// Requests the datanode↔SCM and client↔SCM RPC surfaces share one wire
/// format for (§6): both kinds of caller dial the same port and get
/// dispatched by `handler::dispatch` to the right manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    // --- Datanode protocol (§6) -------------------------------------
    Register { details: NodeDetails, report: NodeReport, pipeline_report: PipelineReport },
    SendHeartbeat { details: NodeDetails },
    ReportContainer { details: NodeDetails, report: ContainerReport },
    ReportPipeline { details: NodeDetails, report: PipelineReport },

    // --- Client/admin protocol (§6) ----------------------------------
    GetVersion,
    ListNodes,
    GetNode { node_id: NodeId },
    ListPipelines,
    GetPipeline { pipeline_id: PipelineId },
    CreatePipeline { config: ReplicationConfig },
    ClosePipeline { pipeline_id: PipelineId },
    ListContainers,
    GetContainer { container_id: ContainerId },
    AllocateContainer { pipeline_id: PipelineId, owner: String, replication: ReplicationConfig },
    ContainerEvent { container_id: ContainerId, event: ContainerEvent },
    SafeModeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub cluster_id: ClusterId,
    pub scm_id: ScmId,
    pub assigned_node_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub commands: Vec<DatanodeCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub cluster_id: ClusterId,
    pub scm_id: ScmId,
    pub software_version: String,
}

impl Request {
    /// Label used for the `scm_server_requests_total` metric (§4.2's
    /// ambient observability layer, not a feature the RPC surface
    /// exposes to callers).
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::SendHeartbeat { .. } => "heartbeat",
            Request::ReportContainer { .. } => "report_container",
            Request::ReportPipeline { .. } => "report_pipeline",
            Request::GetVersion => "get_version",
            Request::ListNodes => "list_nodes",
            Request::GetNode { .. } => "get_node",
            Request::ListPipelines => "list_pipelines",
            Request::GetPipeline { .. } => "get_pipeline",
            Request::CreatePipeline { .. } => "create_pipeline",
            Request::ClosePipeline { .. } => "close_pipeline",
            Request::ListContainers => "list_containers",
            Request::GetContainer { .. } => "get_container",
            Request::AllocateContainer { .. } => "allocate_container",
            Request::ContainerEvent { .. } => "container_event",
            Request::SafeModeStatus => "safe_mode_status",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Registered(RegisterResponse),
    Heartbeat(HeartbeatResponse),
    Ack,
    Version(VersionResponse),
    Nodes(Vec<NodeInfo>),
    Node(Option<NodeInfo>),
    Pipelines(Vec<Pipeline>),
    PipelineInfo(Option<Pipeline>),
    PipelineCreated(Pipeline),
    Containers(Vec<ContainerInfo>),
    Container(Option<ContainerInfo>),
    ContainerAllocated(ContainerInfo),
    ContainerTransitioned(ContainerState),
    SafeMode(SafeModeStatus),
    /// §7 error taxonomy, carried back with its exit code so `scm-cli`
    /// never has to re-derive it from the message string.
    Error { message: String, exit_code: i32 },
}

impl From<scm_types::ScmError> for Response {
    fn from(error: scm_types::ScmError) -> Self {
        Response::Error { exit_code: error.exit_code(), message: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_encode_and_decode() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf);
        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_returns_none_until_the_full_frame_has_arrived() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello world", &mut buf);
        let mut partial = buf.split_to(6);
        assert!(decode_frame(&mut partial).unwrap().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        assert!(matches!(decode_frame(&mut buf), Err(ServerError::Wire(_))));
    }

    #[test]
    fn request_round_trips_through_postcard() {
        let request = Request::GetVersion;
        let mut buf = BytesMut::new();
        encode_request(&request, &mut buf).unwrap();
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        let decoded = decode_request(&frame).unwrap();
        assert!(matches!(decoded, Request::GetVersion));
    }
}
