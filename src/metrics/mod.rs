use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry, CounterVec, Encoder,
    GaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::state::Supervisord;

pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub group_processes: GaugeVec,
    pub process_up: GaugeVec,

    // Counter metrics
    pub numprocs_updates: CounterVec,
    pub removed_processes: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let group_processes = register_gauge_vec_with_registry!(
            Opts::new("grace_group_processes", "Processes configured in the group"),
            &["group"],
            registry
        )
        .expect("grace_group_processes registers");

        let process_up = register_gauge_vec_with_registry!(
            Opts::new("grace_process_up", "Process is running (1) or not (0)"),
            &["group", "process"],
            registry
        )
        .expect("grace_process_up registers");

        let numprocs_updates = register_counter_vec_with_registry!(
            Opts::new("grace_numprocs_updates_total", "UpdateNumprocs calls by outcome"),
            &["group", "result"],
            registry
        )
        .expect("grace_numprocs_updates_total registers");

        let removed_processes = register_counter_vec_with_registry!(
            Opts::new("grace_removed_processes_total", "Processes removed from a group"),
            &["group"],
            registry
        )
        .expect("grace_removed_processes_total registers");

        Self {
            registry,
            group_processes,
            process_up,
            numprocs_updates,
            removed_processes,
        }
    }

    /// Reset the gauges to the current registry contents
    pub fn refresh(&self, supervisord: &Supervisord) {
        self.group_processes.reset();
        self.process_up.reset();
        for group in supervisord.process_groups.values() {
            self.group_processes
                .with_label_values(&[group.name()])
                .set(group.processes.len() as f64);
            for process in group.processes.values() {
                self.process_up
                    .with_label_values(&[group.name(), process.config.name.as_str()])
                    .set(if process.state.is_running() { 1.0 } else { 0.0 });
            }
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
