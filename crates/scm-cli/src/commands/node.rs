//! `scm node list` / `scm node get` — Node Manager queries (§4.4).

use anyhow::Result;
use scm_server::wire::{Request, Response};

use crate::client;
use crate::style::{print_info_table, print_list_table};

pub fn list(server: &str) -> Result<i32> {
    match client::call(server, &Request::ListNodes)? {
        Response::Nodes(nodes) => {
            let rows: Vec<Vec<String>> = nodes
                .iter()
                .map(|node| {
                    vec![
                        node.node_id.to_string(),
                        node.hostname.clone(),
                        node.ip_address.clone(),
                        format!("{:?}", node.health),
                        node.topology_location.clone(),
                        node.pipelines.len().to_string(),
                        node.containers.len().to_string(),
                    ]
                })
                .collect();
            print_list_table(&["NODE ID", "HOSTNAME", "IP", "HEALTH", "TOPOLOGY", "PIPELINES", "CONTAINERS"], &rows);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn get(server: &str, node_id: &str) -> Result<i32> {
    let node_id = super::parse_node_id(node_id)?;
    match client::call(server, &Request::GetNode { node_id })? {
        Response::Node(Some(node)) => {
            print_info_table(&[
                ("node id", node.node_id.to_string()),
                ("hostname", node.hostname.clone()),
                ("ip address", node.ip_address.clone()),
                ("ports", format!("{:?}", node.ports)),
                ("topology", node.topology_location.clone()),
                ("health", format!("{:?}", node.health)),
                ("last heartbeat (ms)", node.last_heartbeat_millis.to_string()),
                ("metadata volumes", node.metadata_volume_count.to_string()),
                ("healthy volumes", node.healthy_volume_count.to_string()),
                ("pipelines", node.pipelines.len().to_string()),
                ("containers", node.containers.len().to_string()),
            ]);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Node(None) => Ok(super::report_error(&format!("node {node_id} not found"), 1)),
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

fn unexpected(response: &Response) -> Result<i32> {
    anyhow::bail!("unexpected response from server: {response:?}")
}
