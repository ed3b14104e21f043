//! `vmwatch ping`: one reachability check through the ping API.

use anyhow::Result;
use colored::Colorize;

use super::output::{init_tracing, is_json, print_output};
use crate::config;
use crate::upstream::UpstreamClient;

pub fn run(config_path: Option<&str>, format: &str, ip: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { run_async(config_path, format, ip).await })
}

async fn run_async(config_path: Option<&str>, format: &str, ip: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_tracing("warn");
    let upstream = UpstreamClient::new(&cfg.upstream)?;
    let reply = upstream.ping(ip).await?;

    if is_json(format) {
        return print_output(format, &reply);
    }
    if reply.reachable {
        println!("{} {}", reply.ip.bold(), "reachable".green());
    } else {
        println!("{} {}", reply.ip.bold(), "not reachable".red());
    }
    Ok(())
}
