use apphub_core::workflow::normalize_run_key;
use chrono::{DateTime, Utc};

/// Derives a run key: renders `run_key_template` if present, else composes
/// one from `(trigger.name, envelope.occurredAt)` via a sanitizing
/// composer that strips disallowed characters (spec §4.D "Run-key
/// derivation"). Returns `(run_key, run_key_normalized)`.
pub fn derive(
    run_key_template: Option<&str>,
    trigger_name: Option<&str>,
    occurred_at: DateTime<Utc>,
) -> (String, String) {
    let run_key = match run_key_template {
        Some(template) => template.to_string(),
        None => {
            let name = trigger_name.unwrap_or("trigger");
            format!("{}-{}", sanitize(name), occurred_at.format("%Y%m%dT%H%M%SZ"))
        }
    };
    let normalized = normalize_run_key(&run_key);
    (run_key, normalized)
}

/// Strips characters other than ASCII alphanumerics and `-`/`_`, following
/// the same "disallowed characters stripped, lowercased for the normalized
/// column" rule spec §4.D describes for the default composer.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn uses_template_verbatim_when_present() {
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap();
        let (run_key, normalized) = derive(Some("Nightly-Sync"), None, now);
        assert_eq!(run_key, "Nightly-Sync");
        assert_eq!(normalized, "nightly-sync");
    }

    #[test]
    fn composes_from_trigger_name_and_timestamp_when_absent() {
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap();
        let (run_key, normalized) = derive(None, Some("Feature Flag Sync!"), now);
        assert_eq!(run_key, "FeatureFlagSync-20250801T120000Z");
        assert_eq!(normalized, run_key.to_lowercase());
    }
}
