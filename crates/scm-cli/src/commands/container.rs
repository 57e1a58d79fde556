//! `scm container list/get/allocate/event` — Container Manager queries and
//! lifecycle transitions (§4.6).

use anyhow::{bail, Result};
use scm_server::wire::{Request, Response};
use scm_types::ContainerEvent;

use crate::client;
use crate::style::{print_info_table, print_list_table, print_success};

pub fn list(server: &str) -> Result<i32> {
    match client::call(server, &Request::ListContainers)? {
        Response::Containers(containers) => {
            let rows: Vec<Vec<String>> = containers
                .iter()
                .map(|container| {
                    vec![
                        container.container_id.to_string(),
                        container.pipeline_id.to_string(),
                        format!("{:?}", container.state),
                        container.used_bytes.to_string(),
                        container.key_count.to_string(),
                        container.owner.clone(),
                    ]
                })
                .collect();
            print_list_table(&["CONTAINER ID", "PIPELINE ID", "STATE", "USED BYTES", "KEYS", "OWNER"], &rows);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn get(server: &str, container_id: &str) -> Result<i32> {
    let container_id = super::parse_container_id(container_id)?;
    match client::call(server, &Request::GetContainer { container_id })? {
        Response::Container(Some(container)) => {
            print_info_table(&[
                ("container id", container.container_id.to_string()),
                ("pipeline id", container.pipeline_id.to_string()),
                ("state", format!("{:?}", container.state)),
                ("used bytes", container.used_bytes.to_string()),
                ("key count", container.key_count.to_string()),
                ("owner", container.owner.clone()),
                ("replication", format!("{:?}/{}", container.replication.replication_type, container.replication.factor)),
                ("state entered at (ms)", container.state_entered_at_millis.to_string()),
                ("delete txn id", container.delete_transaction_id.to_string()),
            ]);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Container(None) => Ok(super::report_error(&format!("container {container_id} not found"), 1)),
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn allocate(server: &str, pipeline_id: &str, owner: &str, replication: &str, factor: u8) -> Result<i32> {
    let pipeline_id = super::parse_pipeline_id(pipeline_id)?;
    let config = super::replication_config(replication, factor)?;
    let request = Request::AllocateContainer { pipeline_id, owner: owner.to_string(), replication: config };
    match client::call(server, &request)? {
        Response::ContainerAllocated(container) => {
            print_success(&format!("container {} allocated on pipeline {}", container.container_id, pipeline_id));
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

/// Maps the CLI's lowercase event names onto §4.6's exhaustive event table.
pub fn parse_event(raw: &str) -> Result<ContainerEvent> {
    Ok(match raw {
        "finalize" => ContainerEvent::Finalize,
        "quasi-close" => ContainerEvent::QuasiClose,
        "close" => ContainerEvent::Close,
        "force-close" => ContainerEvent::ForceClose,
        "delete" => ContainerEvent::Delete,
        "cleanup" => ContainerEvent::Cleanup,
        other => bail!(
            "unknown container event {other:?} (expected one of: finalize, quasi-close, close, force-close, delete, cleanup)"
        ),
    })
}

pub fn event(server: &str, container_id: &str, event_name: &str) -> Result<i32> {
    let container_id = super::parse_container_id(container_id)?;
    let event = parse_event(event_name)?;
    match client::call(server, &Request::ContainerEvent { container_id, event })? {
        Response::ContainerTransitioned(state) => {
            print_success(&format!("container {container_id} is now {state:?}"));
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

fn unexpected(response: &Response) -> Result<i32> {
    anyhow::bail!("unexpected response from server: {response:?}")
}
