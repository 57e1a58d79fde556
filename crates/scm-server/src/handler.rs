//! Request handler: routes decoded `wire::Request`s to the `HaGateway`
//! (§4.3) and turns its results back into `wire::Response`s, adapted
//! from the teacher's `RequestHandler` — one `handle` entry point that
//! never panics on a bad request, one `handle_inner` that does the real
//! dispatch and is free to use `?`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use scm_kernel::gateway::{HaGateway, ReplicatedLogHandle};
use scm_types::{
    next_local_sequence, ClientId, NodeId, NodeHealth, PipelineId, Result as ScmResult,
};

use crate::metrics::ServerMetrics;
use crate::wire::{Request, Response};

/// This server's own identity when submitting commands that originate
/// from an RPC rather than from a replayed client request (§4.2's
/// client-session table keys on `(ClientId, SequenceNumber)`; this
/// process picks one `ClientId` at startup and a fresh sequence number
/// per submit).
fn local_client_id() -> ClientId {
    ClientId(NodeId::random().as_u128())
}

/// Dispatches decoded requests against the gateway. Holds the in-memory,
/// non-replicated bookkeeping `open_pipeline`'s all-members-acked
/// precondition needs: the gateway itself only knows about acks one
/// write at a time, so something upstream has to remember who has
/// reported in so far for a pipeline that hasn't opened yet.
pub struct RequestHandler<L: ReplicatedLogHandle> {
    gateway: Arc<HaGateway<L>>,
    client_id: ClientId,
    pending_pipeline_acks: Mutex<HashMap<PipelineId, BTreeSet<NodeId>>>,
    metrics: Arc<ServerMetrics>,
}

impl<L: ReplicatedLogHandle> RequestHandler<L> {
    /// Takes the gateway behind an `Arc` rather than owning it outright:
    /// the sweeper task and the VSR inbound-message pump both need their
    /// own handle on the same gateway, running on threads this handler
    /// doesn't control (§5 "the apply pipeline" vs. "the read/query
    /// world" are two different worlds sharing the one `Runtime`).
    pub fn new(gateway: Arc<HaGateway<L>>, metrics: Arc<ServerMetrics>) -> Self {
        Self { gateway, client_id: local_client_id(), pending_pipeline_acks: Mutex::new(HashMap::new()), metrics }
    }

    pub fn gateway(&self) -> &HaGateway<L> {
        &self.gateway
    }

    #[instrument(skip_all, fields(op))]
    pub fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let response = match self.handle_inner(request) {
            Ok(response) => {
                self.metrics.record_request(kind, true);
                response
            }
            Err(error) => {
                self.metrics.record_request(kind, false);
                Response::from(error)
            }
        };
        self.metrics.set_safe_mode(self.gateway.safe_mode_status().in_safe_mode);
        response
    }

    fn handle_inner(&self, request: Request) -> ScmResult<Response> {
        match request {
            // --- Datanode protocol (§6) ----------------------------
            Request::Register { details, report, pipeline_report } => {
                tracing::Span::current().record("op", "register");
                self.handle_register(details, report, pipeline_report)
            }
            Request::SendHeartbeat { details } => {
                tracing::Span::current().record("op", "heartbeat");
                self.handle_heartbeat(details)
            }
            Request::ReportContainer { details, report } => {
                tracing::Span::current().record("op", "report_container");
                self.handle_report_container(details, report)
            }
            Request::ReportPipeline { details, report } => {
                tracing::Span::current().record("op", "report_pipeline");
                self.handle_report_pipeline(details, report)
            }

            // --- Client/admin protocol (§6) -------------------------
            Request::GetVersion => {
                let (cluster_id, scm_id, software_version) = self.gateway.get_version();
                Ok(Response::Version(crate::wire::VersionResponse { cluster_id, scm_id, software_version }))
            }
            Request::ListNodes => Ok(Response::Nodes(self.gateway.list_nodes())),
            Request::GetNode { node_id } => Ok(Response::Node(self.gateway.get_node(node_id))),
            Request::ListPipelines => Ok(Response::Pipelines(self.gateway.list_pipelines())),
            Request::GetPipeline { pipeline_id } => Ok(Response::PipelineInfo(self.gateway.get_pipeline(pipeline_id))),
            Request::CreatePipeline { config } => self.handle_create_pipeline(config),
            Request::ClosePipeline { pipeline_id } => {
                self.gateway.close_pipeline(pipeline_id, self.client_id, next_local_sequence())?;
                self.pending_pipeline_acks.lock().expect("pending-ack lock poisoned").remove(&pipeline_id);
                Ok(Response::Ack)
            }
            Request::ListContainers => Ok(Response::Containers(self.gateway.list_containers())),
            Request::GetContainer { container_id } => Ok(Response::Container(self.gateway.get_container(container_id))),
            Request::AllocateContainer { pipeline_id, owner, replication } => {
                let info = self.gateway.allocate_container(
                    pipeline_id,
                    owner,
                    replication,
                    self.client_id,
                    next_local_sequence(),
                )?;
                Ok(Response::ContainerAllocated(info))
            }
            Request::ContainerEvent { container_id, event } => {
                let state =
                    self.gateway.apply_container_event(container_id, event, self.client_id, next_local_sequence())?;
                Ok(Response::ContainerTransitioned(state))
            }
            Request::SafeModeStatus => Ok(Response::SafeMode(self.gateway.safe_mode_status())),
        }
    }

    fn handle_register(
        &self,
        details: scm_types::NodeDetails,
        report: scm_types::NodeReport,
        pipeline_report: crate::wire::PipelineReport,
    ) -> ScmResult<Response> {
        let node_id = details.node_id.unwrap_or_else(NodeId::random);
        let (assigned_node_id, _already_registered) =
            self.gateway.register(node_id, details, report, self.client_id, next_local_sequence())?;

        for entry in pipeline_report {
            self.record_pipeline_ack(entry.pipeline_id, assigned_node_id)?;
        }

        let (cluster_id, scm_id, _) = self.gateway.get_version();
        info!(node = %assigned_node_id, "datanode registered");
        Ok(Response::Registered(crate::wire::RegisterResponse { cluster_id, scm_id, assigned_node_id }))
    }

    fn handle_heartbeat(&self, details: scm_types::NodeDetails) -> ScmResult<Response> {
        let node_id = details.node_id.ok_or_else(|| {
            scm_types::ScmError::InvalidArgument("heartbeat requires an assigned node_id".to_string())
        })?;
        let commands = self.gateway.process_heartbeat(node_id)?;
        Ok(Response::Heartbeat(crate::wire::HeartbeatResponse { commands }))
    }

    fn handle_report_container(
        &self,
        details: scm_types::NodeDetails,
        report: crate::wire::ContainerReport,
    ) -> ScmResult<Response> {
        let node_id = details.node_id.ok_or_else(|| {
            scm_types::ScmError::InvalidArgument("container report requires an assigned node_id".to_string())
        })?;
        for entry in report {
            let replica = scm_types::ContainerReplica {
                container_id: entry.container_id,
                node_id,
                reported_state: entry.reported_state,
                bytes_used: entry.bytes_used,
                key_count: entry.key_count,
                last_seen_millis: 0,
            };
            self.gateway.update_replica(replica, self.client_id, next_local_sequence())?;
        }
        Ok(Response::Ack)
    }

    fn handle_report_pipeline(
        &self,
        details: scm_types::NodeDetails,
        report: crate::wire::PipelineReport,
    ) -> ScmResult<Response> {
        let node_id = details.node_id.ok_or_else(|| {
            scm_types::ScmError::InvalidArgument("pipeline report requires an assigned node_id".to_string())
        })?;
        for entry in report {
            self.record_pipeline_ack(entry.pipeline_id, node_id)?;
        }
        Ok(Response::Ack)
    }

    /// Accumulates one member's ack of a pipeline in local, non-replicated
    /// state and, once every member of that pipeline has reported in,
    /// drives the replicated `open_pipeline` transition (§4.4 `open`
    /// requires all members acked before ALLOCATED→OPEN).
    fn record_pipeline_ack(&self, pipeline_id: PipelineId, node_id: NodeId) -> ScmResult<()> {
        let Some(pipeline) = self.gateway.get_pipeline(pipeline_id) else {
            return Ok(());
        };
        if pipeline.state != scm_types::PipelineState::Allocated {
            return Ok(());
        }

        let all_acked = {
            let mut pending = self.pending_pipeline_acks.lock().expect("pending-ack lock poisoned");
            let acked = pending.entry(pipeline_id).or_default();
            acked.insert(node_id);
            pipeline.members.iter().all(|member| acked.contains(member))
        };

        if all_acked {
            let acked_members: Vec<NodeId> = pipeline.members.clone();
            self.gateway.open_pipeline(pipeline_id, acked_members, self.client_id, next_local_sequence())?;
            self.pending_pipeline_acks.lock().expect("pending-ack lock poisoned").remove(&pipeline_id);
            info!(pipeline = %pipeline_id, "pipeline opened, all members acked");
        }
        Ok(())
    }

    fn handle_create_pipeline(&self, config: scm_types::ReplicationConfig) -> ScmResult<Response> {
        let candidates: Vec<NodeId> = self
            .gateway
            .list_nodes()
            .into_iter()
            .filter(|node| node.health == NodeHealth::Healthy)
            .map(|node| node.node_id)
            .collect();

        if candidates.len() < config.factor as usize {
            warn!(available = candidates.len(), required = config.factor, "not enough healthy nodes to place pipeline");
        }

        let pipeline_id = PipelineId::random();
        let pipeline =
            self.gateway.create_pipeline(pipeline_id, config, candidates, self.client_id, next_local_sequence())?;
        Ok(Response::PipelineCreated(pipeline))
    }
}
