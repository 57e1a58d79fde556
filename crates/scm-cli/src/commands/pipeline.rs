//! `scm pipeline list/get/create/close` — Pipeline Manager queries (§4.5).

use anyhow::Result;
use scm_server::wire::{Request, Response};

use crate::client;
use crate::style::{print_info_table, print_list_table, print_success};

pub fn list(server: &str) -> Result<i32> {
    match client::call(server, &Request::ListPipelines)? {
        Response::Pipelines(pipelines) => {
            let rows: Vec<Vec<String>> = pipelines
                .iter()
                .map(|pipeline| {
                    vec![
                        pipeline.pipeline_id.to_string(),
                        format!("{:?}/{}", pipeline.config.replication_type, pipeline.config.factor),
                        format!("{:?}", pipeline.state),
                        pipeline.members.len().to_string(),
                        pipeline.leader().map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                        pipeline.containers.len().to_string(),
                    ]
                })
                .collect();
            print_list_table(&["PIPELINE ID", "TYPE/FACTOR", "STATE", "MEMBERS", "LEADER", "CONTAINERS"], &rows);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn get(server: &str, pipeline_id: &str) -> Result<i32> {
    let pipeline_id = super::parse_pipeline_id(pipeline_id)?;
    match client::call(server, &Request::GetPipeline { pipeline_id })? {
        Response::PipelineInfo(Some(pipeline)) => {
            print_info_table(&[
                ("pipeline id", pipeline.pipeline_id.to_string()),
                ("type", format!("{:?}", pipeline.config.replication_type)),
                ("factor", pipeline.config.factor.to_string()),
                ("state", format!("{:?}", pipeline.state)),
                ("members", format!("{:?}", pipeline.members)),
                ("member-set hash", format!("{:#x}", pipeline.member_set_hash)),
                ("created at (ms)", pipeline.created_at_millis.to_string()),
                ("containers", format!("{:?}", pipeline.containers)),
            ]);
            Ok(super::EXIT_SUCCESS)
        }
        Response::PipelineInfo(None) => Ok(super::report_error(&format!("pipeline {pipeline_id} not found"), 1)),
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn create(server: &str, replication: &str, factor: u8) -> Result<i32> {
    let config = super::replication_config(replication, factor)?;
    match client::call(server, &Request::CreatePipeline { config })? {
        Response::PipelineCreated(pipeline) => {
            print_success(&format!("pipeline {} created ({:?})", pipeline.pipeline_id, pipeline.state));
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

pub fn close(server: &str, pipeline_id: &str) -> Result<i32> {
    let pipeline_id = super::parse_pipeline_id(pipeline_id)?;
    match client::call(server, &Request::ClosePipeline { pipeline_id })? {
        Response::Ack => {
            print_success(&format!("close requested for pipeline {pipeline_id}"));
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => unexpected(&other),
    }
}

fn unexpected(response: &Response) -> Result<i32> {
    anyhow::bail!("unexpected response from server: {response:?}")
}
