//! ESXi `net-stats` payload extraction

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::models::{
    AggregatedNicStats, Direction, HostStats, NicEntry, NicId, NicKind, NicStats, ThreadStats,
};
use crate::parse::parse_value;

/// Threads at or below this usage are ignored
pub const USAGE_FLOOR: f64 = 2.0;

static ENS_PATTERN: OnceLock<Regex> = OnceLock::new();
static POLL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn ens_pattern() -> &'static Regex {
    ENS_PATTERN.get_or_init(|| Regex::new(r"EnsNetWorld-\d+-(\d+)").expect("valid regex"))
}

fn poll_pattern() -> &'static Regex {
    POLL_PATTERN
        .get_or_init(|| Regex::new(r"([A-Za-z][A-Za-z0-9_]*)-pollWorld").expect("valid regex"))
}

/// Where a scheduler thread belongs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadClass {
    /// EnsNetWorld worker in the given direction bucket
    Aggregated(Direction),
    /// Poll worker of a physical NIC
    Poll(NicId),
    Other,
}

/// Classify a thread by name
pub fn classify_thread(name: &str) -> ThreadClass {
    if let Some(caps) = ens_pattern().captures(name) {
        return match caps[1].parse::<u64>() {
            Ok(suffix) => ThreadClass::Aggregated(Direction::from_suffix(suffix)),
            Err(_) => ThreadClass::Other,
        };
    }

    if let Some(caps) = poll_pattern().captures(name) {
        return match NicId::new(&caps[1]) {
            Ok(id) if id.kind() == NicKind::Plain => ThreadClass::Poll(id),
            _ => ThreadClass::Other,
        };
    }

    ThreadClass::Other
}

/// Thread records of the first `stats` entry; `sys` may be keyed or listed
fn thread_records(payload: &Value) -> Vec<&Value> {
    let sys = payload
        .get("stats")
        .and_then(Value::as_array)
        .and_then(|stats| stats.first())
        .and_then(|first| first.get("sys"));

    match sys {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(list)) => list.iter().collect(),
        _ => Vec::new(),
    }
}

/// Build a host's NIC map from a `net-stats -tW -A` payload.
///
/// The seeded NICs are always present; the `ens` group only when at least
/// one of its threads passed the usage floor.
pub fn extract_host(payload: &Value) -> HostStats {
    let mut host = HostStats::template();
    let mut ens = AggregatedNicStats::default();

    for record in thread_records(payload) {
        let Some(name) = record.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(used) = record.get("used").and_then(parse_value) else {
            continue;
        };
        let ready = record.get("ready").and_then(parse_value).unwrap_or(0.0);

        if used <= USAGE_FLOOR {
            continue;
        }

        let stats = ThreadStats { used, ready };
        match classify_thread(name) {
            ThreadClass::Aggregated(direction) => {
                ens.record(direction, name.to_string(), stats);
            }
            ThreadClass::Poll(nic) => {
                let entry = host
                    .nic_stats
                    .entry(nic)
                    .or_insert_with(|| NicEntry::Plain(NicStats::default()));
                if let NicEntry::Plain(nic_stats) = entry {
                    nic_stats.record(name.to_string(), stats);
                }
            }
            ThreadClass::Other => {}
        }
    }

    if !ens.is_empty() {
        debug!(
            tx_threads = ens.tx.threads.len(),
            rx_threads = ens.rx.threads.len(),
            "Found EnsNetWorld threads"
        );
        host.nic_stats.insert(NicId::aggregated(), NicEntry::Aggregated(ens));
    }

    host
}
