//! `scm version` — cluster identity query (§4.4 `get_version`).

use anyhow::Result;
use scm_server::wire::{Request, Response};

use crate::client;
use crate::style::print_info_table;

pub fn run(server: &str) -> Result<i32> {
    match client::call(server, &Request::GetVersion)? {
        Response::Version(version) => {
            print_info_table(&[
                ("cluster id", version.cluster_id.to_string()),
                ("scm id", version.scm_id.to_string()),
                ("software version", version.software_version.clone()),
            ]);
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => anyhow::bail!("unexpected response from server: {other:?}"),
    }
}
