//! NSX edge node payload extraction

use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{CoreStats, FlowCacheStats, HitRates, InterfaceStats, PerformanceStats};
use crate::parse::{parse_text, parse_value};

/// Parse `get interfaces | json` into per-port error counters.
///
/// Ports without a name are skipped; unreadable counters count as zero.
pub fn extract_interfaces(payload: &Value) -> BTreeMap<String, InterfaceStats> {
    let mut interfaces = BTreeMap::new();

    let Some(ports) = payload.get("physical_ports").and_then(Value::as_array) else {
        return interfaces;
    };

    for port in ports {
        let name = match port.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };
        let stats = port.get("stats");
        let counter = |field: &str| {
            stats
                .and_then(|s| s.get(field))
                .and_then(parse_value)
                .unwrap_or(0.0)
        };

        interfaces.insert(
            name.to_string(),
            InterfaceStats {
                rx_errors: counter("rx_errors"),
                rx_misses: counter("rx_misses"),
                tx_errors: counter("tx_errors"),
            },
        );
    }

    interfaces
}

/// Parse `get dataplane perfstats` into CPU and flow-cache figures.
///
/// Returns `None` when the payload is not a list of sections.
pub fn extract_performance(payload: &Value) -> Option<PerformanceStats> {
    let sections = payload.as_array().filter(|s| !s.is_empty())?;
    let mut perf = PerformanceStats::default();

    for section in sections {
        if let Some(cpus) = section.get("CpuStats").and_then(Value::as_array) {
            for cpu in cpus {
                let Some(core) = cpu.get("core").and_then(core_key) else {
                    continue;
                };
                perf.cpu_stats.insert(core, core_stats(cpu));
            }
        } else if let Some(flow) = section.get("FlowCacheStats") {
            perf.flow_cache_stats = flow_cache_stats(flow);
        }
    }

    Some(perf)
}

/// Core ids arrive as strings or numbers
fn core_key(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn core_stats(cpu: &Value) -> CoreStats {
    // missing usage is unknown; missing packet rates are idle
    let reading = |field: &str, missing: &str| match cpu.get(field) {
        Some(raw) => parse_value(raw),
        None => parse_text(missing),
    };

    CoreStats {
        usage: reading("usage", "n/a"),
        rx: reading("rx", "0 pps"),
        tx: reading("tx", "0 pps"),
        crypto: reading("crypto", "0 pps"),
        slowpath: reading("slowpath", "0 pps"),
        intercore: reading("intercore", "0 pps"),
    }
}

fn flow_cache_stats(flow: &Value) -> FlowCacheStats {
    let tier = |name: &str| -> HitRates {
        flow.get(name)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let core = entry.get("core").and_then(core_key)?;
                        let rate = entry.get("hit rate").and_then(parse_value);
                        Some((core, rate))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    FlowCacheStats {
        micro_hit_rate: tier("micro"),
        mega_hit_rate: tier("mega"),
    }
}
