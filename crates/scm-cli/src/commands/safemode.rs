//! `scm safemode status` — Safe-Mode Controller query (§4.7).

use anyhow::Result;
use scm_server::wire::{Request, Response};

use crate::client;
use crate::style::{print_info_table, print_success, print_warn};

pub fn status(server: &str) -> Result<i32> {
    match client::call(server, &Request::SafeModeStatus)? {
        Response::SafeMode(status) => {
            print_info_table(&[
                ("in safe mode", status.in_safe_mode.to_string()),
                ("pre-check complete", status.pre_check_complete.to_string()),
            ]);
            if status.in_safe_mode {
                print_warn("cluster is in safe mode: mutating client traffic is refused");
            } else {
                print_success("cluster safe-mode barrier has cleared");
            }
            Ok(super::EXIT_SUCCESS)
        }
        Response::Error { message, exit_code } => Ok(super::report_error(&message, exit_code)),
        other => anyhow::bail!("unexpected response from server: {other:?}"),
    }
}
