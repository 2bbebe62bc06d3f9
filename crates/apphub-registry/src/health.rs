use std::time::Duration;

use apphub_core::service::{HealthSnapshot, ServiceRecord, ServiceStatus};
use chrono::Utc;
use tracing::debug;

/// Builds the candidate base-URL list in priority order (spec §4.F "Health
/// polling"): runtime endpoints first (most specific, most likely to be
/// reachable right now), falling back to the declarative manifest URL.
/// `ServiceRecord` in this core carries no separate top-level `baseUrl`
/// beyond the manifest's (see DESIGN.md), so that step of the spec's
/// candidate list collapses into `manifest.base_url`.
pub fn candidate_urls(record: &ServiceRecord, containerized: bool) -> Vec<String> {
    let runtime = &record.runtime;
    let mut candidates = Vec::new();

    if let Some(url) = &runtime.instance_url {
        candidates.push(url.clone());
    }
    if let (Some(ip), Some(port)) = (&runtime.container_ip, runtime.port.or(runtime.container_port)) {
        candidates.push(format!("http://{ip}:{port}"));
    }
    if let Some(url) = &runtime.base_url {
        candidates.push(url.clone());
    }
    if let Some(url) = &runtime.preview_url {
        candidates.push(url.clone());
    }
    if let (Some(host), Some(port)) = (&runtime.host, runtime.port) {
        candidates.push(format!("http://{host}:{port}"));
    }
    if let Some(url) = &record.manifest.base_url {
        candidates.push(url.clone());
    }

    if containerized {
        // Loopback hosts are rewritten to host.docker.internal, but the
        // original is also tried (spec §4.F) — append rather than replace.
        let rewritten: Vec<String> = candidates.iter().filter_map(|url| rewrite_loopback(url)).collect();
        candidates.extend(rewritten);
    }

    candidates
}

fn rewrite_loopback(url: &str) -> Option<String> {
    for host in ["localhost", "127.0.0.1"] {
        if url.contains(host) {
            return Some(url.replacen(host, "host.docker.internal", 1));
        }
    }
    None
}

/// Probes `record`'s candidates in order against `health_endpoint`. First
/// 2xx wins (`healthy`); a remembered non-2xx response becomes `degraded`
/// if nothing healthier is found; all timeouts/errors yield `unreachable`
/// (spec §4.F "Health polling").
pub async fn probe_service(
    client: &reqwest::Client,
    record: &ServiceRecord,
    timeout: Duration,
    containerized: bool,
) -> HealthSnapshot {
    let candidates = candidate_urls(record, containerized);
    let checked_at = Utc::now();

    if candidates.is_empty() {
        return HealthSnapshot {
            status: ServiceStatus::Unknown,
            checked_at,
            probed_url: None,
            message: Some("no candidate base url configured".to_string()),
        };
    }

    let mut degraded: Option<(String, String)> = None;

    for base in &candidates {
        let url = format!("{}{}", base.trim_end_matches('/'), record.manifest.health_endpoint);
        match client.get(&url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => {
                return HealthSnapshot {
                    status: ServiceStatus::Healthy,
                    checked_at,
                    probed_url: Some(url),
                    message: None,
                };
            }
            Ok(response) => {
                debug!(slug = %record.slug, %url, status = %response.status(), "non-2xx health response");
                degraded.get_or_insert((url, format!("http {}", response.status())));
            }
            Err(err) => {
                debug!(slug = %record.slug, %url, error = %err, "health probe failed");
            }
        }
    }

    match degraded {
        Some((url, message)) => HealthSnapshot {
            status: ServiceStatus::Degraded,
            checked_at,
            probed_url: Some(url),
            message: Some(message),
        },
        None => HealthSnapshot {
            status: ServiceStatus::Unreachable,
            checked_at,
            probed_url: None,
            message: Some("all candidate urls timed out or errored".to_string()),
        },
    }
}
