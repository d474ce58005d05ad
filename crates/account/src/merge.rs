//! Change-log compaction.

use cadence_types::{Address, ChangeLog};
use std::collections::HashMap;

/// Collapse a run of change logs into its canonical compact form.
///
/// Logs on the same `(address, log_type, extra)` collapse to a single log
/// keeping the first `old_val` and the last `new_val`; first-appearance
/// order is preserved. Versions are then re-issued densely per
/// `(address, log_type)`, starting from the first version that pair carried
/// in the input, so replaying the compacted run reaches the same state
/// through the same version window.
pub fn merge_change_logs(logs: &[ChangeLog]) -> Vec<ChangeLog> {
    let mut merged: Vec<ChangeLog> = Vec::with_capacity(logs.len());

    for log in logs {
        let existing = merged.iter_mut().find(|candidate| {
            candidate.address == log.address
                && candidate.log_type == log.log_type
                && candidate.extra == log.extra
        });
        match existing {
            Some(candidate) => candidate.new_val = log.new_val.clone(),
            None => merged.push(log.clone()),
        }
    }

    // Re-issue dense versions per (address, log_type).
    let mut counters: HashMap<(Address, u32), u32> = HashMap::new();
    for log in &mut merged {
        let counter = counters
            .entry((log.address, log.log_type.tag()))
            .or_insert(log.version);
        log.version = *counter;
        *counter += 1;
    }

    merged
}
