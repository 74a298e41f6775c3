//! Parsing the human-authored catalog file into a [`CatalogState`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use mcpv_types::catalog::{CatalogState, RuntimeConfig};
use mcpv_types::spec::{ActivationMode, ServerSpec, SpecKey, Strategy, Transport};
use serde::Deserialize;

use crate::error::{CatalogError, CatalogResult};

/// Top-level shape of the catalog file. Unknown top-level
/// fields reject the file; `serde(deny_unknown_fields)` enforces this
/// directly rather than a hand-rolled key scan.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalogFile {
    #[serde(default)]
    servers: Vec<RawServerSpec>,
    #[serde(default)]
    runtime: Option<RawRuntimeConfig>,
    /// Grouping of specs by name, for operator convenience only — nothing
    /// downstream of the loader ever consults profile membership.
    #[serde(default)]
    #[allow(dead_code)]
    profiles: BTreeMap<String, Vec<String>>,
}

/// Unknown per-spec fields are ignored for forward compatibility
/// — no `deny_unknown_fields` here.
#[derive(Debug, Deserialize)]
struct RawServerSpec {
    /// Explicit catalog key; defaults to `name` if omitted.
    key: Option<String>,
    name: String,
    transport: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    proxy: Option<String>,
    protocol_version: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    activation_mode: Option<String>,
    #[serde(default)]
    strategy: Option<String>,
    max_concurrent: u32,
    #[serde(default)]
    min_ready: u32,
    #[serde(default)]
    idle_seconds: u64,
    #[serde(default)]
    drain_timeout_seconds: u64,
    #[serde(default)]
    session_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Default)]
struct RawRuntimeConfig {
    route_timeout_seconds: Option<u64>,
    heartbeat_interval_seconds: Option<u64>,
    max_retries: Option<u32>,
    retry_base_seconds: Option<u64>,
    retry_max_seconds: Option<u64>,
    initialize_retry_count: Option<u32>,
}

/// Normalize the catalog file's tolerant transport-name spellings:
/// `streamable_http`, `streamable-http`, and `streamablehttp` all
/// normalize to one transport.
fn normalize_transport_name(raw: &str) -> String {
    raw.to_ascii_lowercase().replace(['-', '_'], "")
}

fn parse_transport(raw: &RawServerSpec) -> CatalogResult<Transport> {
    match normalize_transport_name(&raw.transport).as_str() {
        "stdio" => {
            let command = raw.command.clone().ok_or_else(|| {
                CatalogError::Invalid(format!("spec '{}': stdio transport requires 'command'", raw.name))
            })?;
            Ok(Transport::Stdio {
                command,
                args: raw.args.clone(),
                env: raw.env.clone(),
                cwd: raw.cwd.clone(),
            })
        }
        "streamablehttp" => {
            let endpoint = raw.endpoint.clone().ok_or_else(|| {
                CatalogError::Invalid(format!(
                    "spec '{}': streamable-http transport requires 'endpoint'",
                    raw.name
                ))
            })?;
            Ok(Transport::StreamableHttp {
                endpoint,
                headers: raw.headers.clone(),
                max_retries: raw.max_retries.unwrap_or(3),
                proxy: raw.proxy.clone(),
            })
        }
        other => Err(CatalogError::Invalid(format!(
            "spec '{}': unknown transport '{other}'",
            raw.name
        ))),
    }
}

fn parse_activation_mode(raw: &RawServerSpec) -> CatalogResult<ActivationMode> {
    match raw.activation_mode.as_deref() {
        None | Some("on-demand") | Some("on_demand") => Ok(ActivationMode::OnDemand),
        Some("always-on") | Some("always_on") => Ok(ActivationMode::AlwaysOn),
        Some(other) => Err(CatalogError::Invalid(format!(
            "spec '{}': unknown activationMode '{other}'",
            raw.name
        ))),
    }
}

fn parse_strategy(raw: &RawServerSpec) -> CatalogResult<Strategy> {
    match raw.strategy.as_deref() {
        None | Some("stateless") => Ok(Strategy::Stateless),
        Some("stateful") => Ok(Strategy::Stateful),
        Some(other) => Err(CatalogError::Invalid(format!(
            "spec '{}': unknown strategy '{other}'",
            raw.name
        ))),
    }
}

fn parse_server_spec(raw: RawServerSpec) -> CatalogResult<(SpecKey, ServerSpec)> {
    let key = SpecKey::from(raw.key.clone().unwrap_or_else(|| raw.name.clone()));
    let transport = parse_transport(&raw)?;
    let activation_mode = parse_activation_mode(&raw)?;
    let strategy = parse_strategy(&raw)?;
    if raw.max_concurrent == 0 {
        return Err(CatalogError::Invalid(format!(
            "spec '{}': maxConcurrent must be >= 1",
            raw.name
        )));
    }
    let spec = ServerSpec {
        name: raw.name,
        transport,
        protocol_version: raw.protocol_version,
        tags: raw.tags,
        activation_mode,
        strategy,
        max_concurrent: raw.max_concurrent,
        min_ready: raw.min_ready,
        idle_seconds: raw.idle_seconds,
        drain_timeout_seconds: raw.drain_timeout_seconds,
        session_ttl_seconds: raw.session_ttl_seconds,
    };
    Ok((key, spec))
}

fn parse_runtime_config(raw: Option<RawRuntimeConfig>) -> RuntimeConfig {
    let defaults = RuntimeConfig::default();
    let Some(raw) = raw else { return defaults };
    RuntimeConfig {
        route_timeout_seconds: raw.route_timeout_seconds.unwrap_or(defaults.route_timeout_seconds),
        heartbeat_interval_seconds: raw
            .heartbeat_interval_seconds
            .unwrap_or(defaults.heartbeat_interval_seconds),
        max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
        retry_base_seconds: raw.retry_base_seconds.unwrap_or(defaults.retry_base_seconds),
        retry_max_seconds: raw.retry_max_seconds.unwrap_or(defaults.retry_max_seconds),
        initialize_retry_count: raw
            .initialize_retry_count
            .unwrap_or(defaults.initialize_retry_count),
    }
}

/// Load, parse, and validate a catalog file into the next [`CatalogState`]
/// revision.
///
/// # Errors
///
/// Returns [`CatalogError`] on I/O failure, parse failure, or a violated
/// structural invariant. The caller is responsible for discarding the
/// result and keeping the previous snapshot live on error.
pub fn load_from_path(path: &Path, prev_revision: u64) -> CatalogResult<CatalogState> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_catalog(&text, prev_revision, path)
}

fn parse_catalog(text: &str, prev_revision: u64, path: &Path) -> CatalogResult<CatalogState> {
    let raw: RawCatalogFile = serde_yaml::from_str(text).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut specs = BTreeMap::new();
    for raw_spec in raw.servers {
        let (key, spec) = parse_server_spec(raw_spec)?;
        specs.insert(key, spec);
    }
    let runtime = parse_runtime_config(raw.runtime);

    let next = CatalogState::next(prev_revision, Utc::now(), specs, runtime);
    next.validate().map_err(CatalogError::Invalid)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
servers:
  - name: alpha
    transport: streamable-http
    endpoint: "https://example.test/mcp"
    protocol_version: "2025-11-25"
    max_concurrent: 2
    min_ready: 1
  - name: beta
    transport: streamablehttp
    endpoint: "https://example.test/beta"
    protocol_version: "2025-11-25"
    max_concurrent: 1
runtime:
  route_timeout_seconds: 45
profiles:
  default: [alpha, beta]
"#;

    #[test]
    fn transport_casing_variants_normalize_to_one_transport() {
        let state = parse_catalog(YAML, 0, Path::new("catalog.yaml")).unwrap();
        assert_eq!(state.specs.len(), 2);
        for spec in state.specs.values() {
            assert!(matches!(spec.transport, Transport::StreamableHttp { .. }));
        }
    }

    #[test]
    fn runtime_overrides_apply_on_top_of_defaults() {
        let state = parse_catalog(YAML, 0, Path::new("catalog.yaml")).unwrap();
        assert_eq!(state.runtime.route_timeout_seconds, 45);
        assert_eq!(state.runtime.heartbeat_interval_seconds, RuntimeConfig::default().heartbeat_interval_seconds);
    }

    #[test]
    fn unknown_top_level_field_rejects_the_file() {
        let bad = "servers: []\nbogus_field: 1\n";
        let err = parse_catalog(bad, 0, Path::new("catalog.yaml")).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn unknown_per_spec_field_is_ignored() {
        let yaml = r#"
servers:
  - name: alpha
    transport: stdio
    command: demo
    protocol_version: "2025-11-25"
    max_concurrent: 1
    some_future_field: true
"#;
        let state = parse_catalog(yaml, 0, Path::new("catalog.yaml")).unwrap();
        assert_eq!(state.specs.len(), 1);
    }

    #[test]
    fn revision_increments_from_previous() {
        let state = parse_catalog(YAML, 4, Path::new("catalog.yaml")).unwrap();
        assert_eq!(state.revision, 5);
    }
}
