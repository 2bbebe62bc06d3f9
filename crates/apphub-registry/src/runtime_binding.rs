use apphub_core::service::{ServiceRecord, ServiceRuntimeSnapshot, ServiceStatus};
use chrono::Utc;

/// Applies a freshly-observed runtime snapshot onto `record` (spec §4.F
/// `updateServiceRuntimeForRepository`). The new snapshot always wins over
/// whatever runtime state was previously recorded — a repository only ever
/// has one live launch bound to it at a time. A bound runtime is reported as
/// `running` until the next health probe corrects it.
pub fn apply_runtime_update(record: &mut ServiceRecord, mut snapshot: ServiceRuntimeSnapshot) {
    snapshot.updated_at = Some(Utc::now());
    record.runtime = snapshot;
    record.status = ServiceStatus::Running;
}

/// Clears `record`'s runtime metadata, but only if `launch_id` still matches
/// what's recorded (spec §4.F `clearServiceRuntimeForRepository`: a teardown
/// for an already-superseded launch must not clobber a newer one). Returns
/// whether the clear actually happened.
pub fn clear_runtime(record: &mut ServiceRecord, launch_id: &str) -> bool {
    record.clear_runtime_if_launch_matches(launch_id)
}
