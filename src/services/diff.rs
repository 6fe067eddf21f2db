//! Classifies the change between the live and the freshly read config of a
//! group. Pure: no registry access, no I/O.
//!
//! `ProcessConfig` is compared by equality only, so the set operations here
//! are pairwise scans instead of hash lookups.

use std::fmt;

use crate::models::{ProcessConfig, ProcessGroupConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NameChanged,
    PriorityChanged,
    /// Slots other than the trailing ones changed
    NotOnlyNumprocs,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NameChanged => write!(f, "Not only numprocs has changed: name is different"),
            RejectReason::PriorityChanged => {
                write!(f, "Not only numprocs has changed: priority is different")
            }
            RejectReason::NotOnlyNumprocs => write!(f, "Not only numprocs has changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoOp,
    /// Needs a full group restart instead
    Rejected { reason: RejectReason },
    /// Slots to add, in the new config's order
    ScaleUp { added: Vec<ProcessConfig> },
    /// Slots to remove, in the old config's order
    ScaleDown { removed: Vec<ProcessConfig> },
}

fn contains(list: &[ProcessConfig], item: &ProcessConfig) -> bool {
    list.iter().any(|candidate| candidate == item)
}

fn is_subset(a: &[ProcessConfig], b: &[ProcessConfig]) -> bool {
    a.iter().all(|item| contains(b, item))
}

/// Items of `a` without an equal item in `b`, keeping `a`'s order
fn difference(a: &[ProcessConfig], b: &[ProcessConfig]) -> Vec<ProcessConfig> {
    a.iter().filter(|item| !contains(b, item)).cloned().collect()
}

pub fn decide(old: &ProcessGroupConfig, new: &ProcessGroupConfig) -> Decision {
    if old == new {
        return Decision::NoOp;
    }
    if old.name != new.name {
        return Decision::Rejected {
            reason: RejectReason::NameChanged,
        };
    }
    if old.priority != new.priority {
        return Decision::Rejected {
            reason: RejectReason::PriorityChanged,
        };
    }

    let (old_configs, new_configs) = (&old.process_configs, &new.process_configs);
    let rejected = Decision::Rejected {
        reason: RejectReason::NotOnlyNumprocs,
    };
    if old_configs.len() < new_configs.len() {
        if is_subset(old_configs, new_configs) {
            Decision::ScaleUp {
                added: difference(new_configs, old_configs),
            }
        } else {
            rejected
        }
    } else if old_configs.len() > new_configs.len() {
        if is_subset(new_configs, old_configs) {
            Decision::ScaleDown {
                removed: difference(old_configs, new_configs),
            }
        } else {
            rejected
        }
    } else {
        rejected
    }
}
