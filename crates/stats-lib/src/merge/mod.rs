//! Default-stats merging
//!
//! A collected record is merged into its default template so that every
//! entity in the result has at least the template's shape. Dynamic keys
//! (hosts, edge nodes, NIC identifiers) that the template has never seen get
//! a synthesized, correctly-shaped entry before the collected data is merged
//! into it.
//!
//! A NIC entry whose shape does not match its identifier is converted first:
//! the `ens` group is always aggregated, every other NIC is plain. When a
//! merged host or edge node still does not fit its model, only that entity
//! falls back to its default.

mod tree;

#[cfg(test)]
mod tests;

pub use tree::StatTree;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::Result;
use crate::extract::{classify_thread, ThreadClass};
use crate::models::{
    AggregatedNicStats, EdgeNodeStats, HostStats, NicEntry, NicId, NicKind, NicStats,
};

/// Position in the tree, used to pick templates for unseen keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Hosts,
    Host,
    NicStats,
    Nodes,
    Interior,
}

impl Scope {
    fn child(self, key: &str) -> Scope {
        match (self, key) {
            (Scope::Root, "hosts") => Scope::Hosts,
            (Scope::Root, "nodes") => Scope::Nodes,
            (Scope::Hosts, _) => Scope::Host,
            (Scope::Host, "nic_stats") => Scope::NicStats,
            _ => Scope::Interior,
        }
    }

    /// Template for a key missing from the default side
    fn template(self, key: &str) -> Option<StatTree> {
        let built = match self {
            Scope::Hosts => StatTree::from_model(&HostStats::template()),
            Scope::Nodes => StatTree::from_model(&EdgeNodeStats::template()),
            Scope::NicStats => {
                let id = NicId::new(key).ok()?;
                StatTree::from_model(&NicEntry::template_for(&id))
            }
            _ => return None,
        };

        match built {
            Ok(tree) => Some(tree),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to build template for unseen key");
                None
            }
        }
    }

    /// Check that an entity subtree fits its model
    fn check_entity(self, tree: &StatTree) -> Result<()> {
        match self {
            Scope::Hosts => tree.clone().into_model::<HostStats>().map(drop),
            Scope::Nodes => tree.clone().into_model::<EdgeNodeStats>().map(drop),
            _ => Ok(()),
        }
    }
}

/// Convert a NIC entry to the shape its identifier requires
fn conform_nic(id: &NicId, entry: NicEntry) -> NicEntry {
    match (id.kind(), entry) {
        (NicKind::Aggregated, NicEntry::Plain(plain)) => {
            let mut ens = AggregatedNicStats {
                max_used: plain.max_used,
                max_ready: plain.max_ready,
                ..AggregatedNicStats::default()
            };
            for (name, stats) in plain.threads {
                match classify_thread(&name) {
                    ThreadClass::Aggregated(direction) => ens.record(direction, name, stats),
                    _ => warn!(
                        nic = %id,
                        thread = %name,
                        "Dropping non-EnsNetWorld thread from aggregated group"
                    ),
                }
            }
            NicEntry::Aggregated(ens)
        }
        (NicKind::Plain, NicEntry::Aggregated(ens)) => {
            let mut plain = NicStats {
                max_used: ens.max_used,
                max_ready: ens.max_ready,
                ..NicStats::default()
            };
            for (name, stats) in ens.tx.threads.into_iter().chain(ens.rx.threads) {
                plain.record(name, stats);
            }
            NicEntry::Plain(plain)
        }
        (_, entry) => entry,
    }
}

fn conform_nic_tree(key: &str, value: &StatTree) -> Option<StatTree> {
    let id = NicId::new(key).ok()?;
    let entry: NicEntry = value.clone().into_model().ok()?;
    if matches!(
        (id.kind(), &entry),
        (NicKind::Aggregated, NicEntry::Aggregated(_)) | (NicKind::Plain, NicEntry::Plain(_))
    ) {
        return None;
    }
    StatTree::from_model(&conform_nic(&id, entry)).ok()
}

/// Merge `collected` into `default`.
///
/// Two nodes merge key by key; any other pairing takes the collected value.
/// Keys only present in `default` are retained.
pub fn merge_trees(default: &StatTree, collected: &StatTree) -> StatTree {
    merge_at(Scope::Root, default, collected)
}

fn merge_at(scope: Scope, default: &StatTree, collected: &StatTree) -> StatTree {
    match (default, collected) {
        (StatTree::Node(base), StatTree::Node(incoming)) => {
            StatTree::Node(merge_nodes(scope, base, incoming))
        }
        _ => collected.clone(),
    }
}

fn merge_nodes(
    scope: Scope,
    base: &BTreeMap<String, StatTree>,
    incoming: &BTreeMap<String, StatTree>,
) -> BTreeMap<String, StatTree> {
    let mut merged = base.clone();

    for (key, value) in incoming {
        let child_scope = scope.child(key);
        let conformed = match scope {
            Scope::NicStats => conform_nic_tree(key, value),
            _ => None,
        };
        let value = conformed.as_ref().unwrap_or(value);
        let next = match merged.get(key) {
            Some(existing) => merge_at(child_scope, existing, value),
            None if value.is_node() => match scope.template(key) {
                Some(template) => merge_at(child_scope, &template, value),
                None => value.clone(),
            },
            None => value.clone(),
        };
        merged.insert(key.clone(), next);
    }

    merged
}

/// Merge `collected` into `default` and convert the result into a model.
///
/// A host or edge node whose merged subtree does not fit its model is
/// replaced by its default (or its template when the default has none); the
/// other entities keep their merged data.
pub fn merge_into<T: DeserializeOwned>(default: &StatTree, collected: &StatTree) -> Result<T> {
    let merged = merge_trees(default, collected);
    match merged.clone().into_model() {
        Ok(model) => Ok(model),
        Err(e) => {
            warn!(error = %e, "Merged stats do not fit the model, checking each entity");
            revert_failed_entities(default, merged).into_model()
        }
    }
}

fn revert_failed_entities(default: &StatTree, merged: StatTree) -> StatTree {
    let StatTree::Node(mut root) = merged else {
        return merged;
    };

    for (group, entities) in root.iter_mut() {
        let scope = Scope::Root.child(group);
        let StatTree::Node(entities) = entities else {
            continue;
        };
        if !matches!(scope, Scope::Hosts | Scope::Nodes) {
            continue;
        }

        for (id, entity) in entities.iter_mut() {
            if let Err(e) = scope.check_entity(entity) {
                warn!(entity = %id, error = %e, "Entity stats rejected, keeping its defaults");
                *entity = default
                    .get(group)
                    .and_then(|defaults| defaults.get(id))
                    .cloned()
                    .or_else(|| scope.template(id))
                    .unwrap_or_default();
            }
        }
    }

    StatTree::Node(root)
}

/// Merge two typed records through their tree form
pub fn try_merge<T>(default: &T, collected: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let base = StatTree::from_model(default)?;
    let incoming = StatTree::from_model(collected)?;
    merge_into(&base, &incoming)
}

/// Merge two typed records, keeping the whole default only when even the
/// per-entity fallback cannot produce a valid record
pub fn merge_stats<T>(default: &T, collected: &T) -> T
where
    T: Serialize + DeserializeOwned + Clone,
{
    match try_merge(default, collected) {
        Ok(merged) => merged,
        Err(e) => {
            warn!(error = %e, "Stats merge failed, keeping defaults");
            default.clone()
        }
    }
}
