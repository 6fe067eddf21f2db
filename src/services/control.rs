//! The `supervisor` namespace the shell adapter drives (start, stop, info),
//! the periodic transition loop and host shutdown.

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;

use crate::error::RpcError;
use crate::models::{ProcessInfo, SupervisorState};
use crate::services::subprocess::Subprocess;
use crate::state::{lock_state, AppState, Supervisord};

/// Split `group:process`; a bare name addresses the process of the same
/// name in the group of that name.
pub fn split_identity(identity: &str) -> (&str, &str) {
    identity.split_once(':').unwrap_or((identity, identity))
}

fn find_process<'a>(
    supervisord: &'a mut Supervisord,
    identity: &str,
) -> Result<&'a mut Subprocess, RpcError> {
    let (group_name, process_name) = split_identity(identity);
    supervisord
        .process_groups
        .get_mut(group_name)
        .and_then(|group| group.processes.get_mut(process_name))
        .ok_or_else(|| RpcError::BadName(identity.to_string()))
}

pub fn start_process(state: &AppState, identity: &str) -> Result<ProcessInfo, RpcError> {
    let mut supervisord = lock_state(state)?;
    supervisord.ensure_not_shutdown()?;
    let process = find_process(&mut supervisord, identity)?;
    process.spawn()?;
    Ok(process.info())
}

/// Send the stop signal and wait for the child to exit, killing it after
/// `stopwaitsecs`. The registry lock is released while waiting; the process
/// sits in STOPPING meanwhile, so it cannot be removed.
pub async fn stop_process(state: &AppState, identity: &str) -> Result<ProcessInfo, RpcError> {
    lock_state(state)?.ensure_not_shutdown()?;
    stop(state, identity).await
}

/// The wait runs on its own task, so a caller that goes away mid-stop
/// still leaves the process STOPPED.
async fn stop(state: &AppState, identity: &str) -> Result<ProcessInfo, RpcError> {
    let (child, signal, stopwaitsecs) = {
        let mut supervisord = lock_state(state)?;
        let process = find_process(&mut supervisord, identity)?;
        let child = process
            .begin_stop()
            .ok_or_else(|| RpcError::NotRunning(identity.to_string()))?;
        (child, process.config.stopsignal.signal(), process.config.stopwaitsecs)
    };

    let task = tokio::spawn(finish_stop(
        state.clone(),
        identity.to_string(),
        child,
        signal,
        stopwaitsecs,
    ));
    task.await
        .map_err(|e| RpcError::Failed(format!("stop of {} did not complete: {}", identity, e)))?
}

async fn finish_stop(
    state: AppState,
    identity: String,
    mut child: Child,
    signal: Signal,
    stopwaitsecs: u64,
) -> Result<ProcessInfo, RpcError> {
    if let Some(pid) = child.id() {
        log::info!("waiting for {} to stop", identity);
        if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
            log::warn!("failed to signal {} (pid {}): {}", identity, pid, e);
        }
    }

    let status = match tokio::time::timeout(Duration::from_secs(stopwaitsecs), child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            log::warn!("failed to wait for {}: {}", identity, e);
            None
        }
        Err(_) => {
            log::warn!("killing {} with SIGKILL after {}s", identity, stopwaitsecs);
            if let Err(e) = child.kill().await {
                log::warn!("failed to kill {}: {}", identity, e);
            }
            child.try_wait().ok().flatten()
        }
    };

    let mut supervisord = lock_state(&state)?;
    let process = find_process(&mut supervisord, &identity)?;
    process.finish_stop(status);
    Ok(process.info())
}

pub fn process_info(state: &AppState, identity: &str) -> Result<ProcessInfo, RpcError> {
    let mut supervisord = lock_state(state)?;
    find_process(&mut supervisord, identity).map(|p| p.info())
}

pub fn all_process_info(state: &AppState) -> Result<Vec<ProcessInfo>, RpcError> {
    let supervisord = lock_state(state)?;
    let mut groups: Vec<_> = supervisord.process_groups.values().collect();
    groups.sort_by(|a, b| {
        a.config
            .priority
            .cmp(&b.config.priority)
            .then_with(|| a.name().cmp(b.name()))
    });
    Ok(groups.iter().flat_map(|g| g.process_infos()).collect())
}

/// Re-evaluate every group on each tick until the host shuts down
pub async fn run_transitions(state: AppState, every: Duration) {
    let mut ticker = actix_rt::time::interval(every);
    loop {
        ticker.tick().await;
        let mut supervisord = match lock_state(&state) {
            Ok(supervisord) => supervisord,
            Err(e) => {
                log::error!("transition loop stopped: {}", e);
                break;
            }
        };
        if supervisord.state == SupervisorState::Shutdown {
            break;
        }
        for group in supervisord.process_groups.values_mut() {
            group.transition();
        }
    }
}

/// Enter SHUTDOWN and stop every running child
pub async fn shutdown(state: &AppState) -> Result<(), RpcError> {
    let running: Vec<String> = {
        let mut supervisord = lock_state(state)?;
        supervisord.state = SupervisorState::Shutdown;
        supervisord
            .process_groups
            .values()
            .flat_map(|g| g.processes.values())
            .filter(|p| p.state.is_running())
            .map(Subprocess::identity)
            .collect()
    };

    log::info!("shutting down, stopping {} process(es)", running.len());
    for identity in running {
        if let Err(e) = stop(state, &identity).await {
            log::warn!("failed to stop {}: {}", identity, e);
        }
    }
    Ok(())
}
