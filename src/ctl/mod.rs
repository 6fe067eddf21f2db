//! `grace-update`: drive the two-phase numprocs update against a running
//! host and report what changed.

pub mod client;

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::{RemoteFault, NOT_RUNNING};
use crate::models::ProcessState;
use crate::services::control::split_identity;
use crate::services::NumprocsResult;

pub use client::GraceClient;

/// The RPC calls `grace-update` needs
pub(crate) trait RpcApi {
    async fn update_numprocs(&self, group: &str) -> Result<NumprocsResult>;
    async fn start_process(&self, identity: &str) -> Result<()>;
    async fn stop_process(&self, identity: &str) -> Result<()>;
    async fn process_state(&self, identity: &str) -> Result<ProcessState>;
    async fn remove_process_from_group(&self, group: &str, process: &str) -> Result<()>;
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(120);

/// How `grace_update` waits for removed processes to stop
#[derive(Debug, Clone, Copy)]
pub struct StopWait {
    pub poll: Duration,
    pub timeout: Duration,
}

impl Default for StopWait {
    fn default() -> Self {
        Self {
            poll: POLL_INTERVAL,
            timeout: STOP_TIMEOUT,
        }
    }
}

fn is_not_running(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RemoteFault>()
        .is_some_and(|f| f.fault.fault_code == NOT_RUNNING)
}

async fn wait_until_stopped<A: RpcApi>(api: &A, identity: &str, poll: Duration) -> Result<()> {
    while !api.process_state(identity).await?.is_stopped() {
        log::debug!("waiting for {} to stop", identity);
        tokio::time::sleep(poll).await;
    }
    Ok(())
}

pub(crate) async fn grace_update<A: RpcApi, W: Write>(
    api: &A,
    group: &str,
    start: bool,
    wait: StopWait,
    out: &mut W,
) -> Result<()> {
    let result = api.update_numprocs(group).await?;
    writeln!(out, "{}", serde_json::to_string(&result)?)?;

    match result {
        NumprocsResult::Reduce { processes_name } => {
            for identity in &processes_name {
                log::info!("stopping {}", identity);
                match api.stop_process(identity).await {
                    Ok(()) => {}
                    Err(e) if is_not_running(&e) => log::info!("{} is not running", identity),
                    Err(e) => return Err(e),
                }
            }
            for identity in &processes_name {
                tokio::time::timeout(wait.timeout, wait_until_stopped(api, identity, wait.poll))
                    .await
                    .with_context(|| format!("{} did not stop within {:?}", identity, wait.timeout))??;
                let (group_name, process_name) = split_identity(identity);
                api.remove_process_from_group(group_name, process_name).await?;
                writeln!(out, "{} removed", identity)?;
            }
        }
        NumprocsResult::Add { processes_name } => {
            for identity in &processes_name {
                writeln!(out, "{} added", identity)?;
                if start {
                    api.start_process(identity).await?;
                }
            }
        }
        NumprocsResult::Error { msg } => writeln!(out, "{}", msg)?,
    }
    Ok(())
}
