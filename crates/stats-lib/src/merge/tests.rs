//! Merge tests: typed records plus structural properties

#[cfg(test)]
mod typed_merge_tests {
    use crate::merge::{merge_stats, try_merge};
    use crate::models::*;

    fn host_with(nic: &str, thread: &str, used: f64, ready: f64) -> HostStats {
        let mut host = HostStats::default();
        let id = NicId::new(nic).unwrap();
        let mut entry = NicEntry::template_for(&id);
        match &mut entry {
            NicEntry::Plain(stats) => stats.record(thread.to_string(), ThreadStats { used, ready }),
            NicEntry::Aggregated(stats) => {
                stats.record(Direction::Tx, thread.to_string(), ThreadStats { used, ready })
            }
        }
        host.nic_stats.insert(id, entry);
        host
    }

    #[test]
    fn test_merge_empty_collected_is_identity() {
        let default = ClusterStats::template();
        let merged = merge_stats(&default, &ClusterStats::default());
        assert_eq!(merged, default);

        let fleet = EdgeFleetStats::template_for(["edge-1", "edge-2"]);
        let merged = merge_stats(&fleet, &EdgeFleetStats::default());
        assert_eq!(merged, fleet);
    }

    #[test]
    fn test_new_plain_nic_gets_full_shape() {
        let mut collected = ClusterStats::default();
        collected.record_host("esx-1", host_with("vmnic7", "vmnic7-pollWorld-0", 12.0, 1.0));

        let merged = merge_stats(&ClusterStats::template(), &collected);
        let host = &merged.hosts["esx-1"];

        assert!(host.nic_stats.contains_key("vmnic2"));
        assert!(host.nic_stats.contains_key("vmnic3"));
        match &host.nic_stats["vmnic7"] {
            NicEntry::Plain(nic) => {
                assert_eq!(nic.max_used, 12.0);
                assert_eq!(nic.threads.len(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
        assert_eq!(merged.max_values.used, 12.0);
    }

    #[test]
    fn test_new_aggregated_nic_gets_aggregated_shape() {
        let mut collected = ClusterStats::default();
        collected.record_host("esx-1", host_with("ens", "EnsNetWorld-0-1", 5.0, 0.0));

        let merged = merge_stats(&ClusterStats::template(), &collected);
        match &merged.hosts["esx-1"].nic_stats["ens"] {
            NicEntry::Aggregated(ens) => {
                assert_eq!(ens.max_used, 5.0);
                assert!(ens.tx.threads.contains_key("EnsNetWorld-0-1"));
                assert!(ens.rx.threads.is_empty());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_edge_merge_keeps_template_and_adds_new_keys() {
        let default = EdgeFleetStats::template_for(["edge-1", "edge-2"]);

        let mut node = EdgeNodeStats::default();
        node.interfaces.insert(
            "fp-eth0".into(),
            InterfaceStats { rx_errors: 4.0, rx_misses: 0.0, tx_errors: 1.0 },
        );
        node.interfaces.insert("fp-eth9".into(), InterfaceStats::default());
        node.performance.cpu_stats.insert(
            "5".into(),
            CoreStats { usage: Some(55.0), ..CoreStats::default() },
        );

        let mut collected = EdgeFleetStats::default();
        collected.nodes.insert("edge-1".into(), node);
        collected.nodes.insert("edge-3".into(), EdgeNodeStats::failed("timeout"));

        let merged = try_merge(&default, &collected).unwrap();

        let edge1 = &merged.nodes["edge-1"];
        assert_eq!(edge1.interfaces.len(), 5);
        assert_eq!(edge1.interfaces["fp-eth0"].rx_errors, 4.0);
        assert_eq!(edge1.performance.cpu_stats.len(), 4);
        assert_eq!(edge1.performance.cpu_stats["5"].usage, Some(55.0));
        assert_eq!(edge1.performance.cpu_stats["0"], CoreStats::zeroed());

        assert_eq!(merged.nodes["edge-2"], EdgeNodeStats::template());

        let edge3 = &merged.nodes["edge-3"];
        assert!(edge3.is_failed());
        assert_eq!(edge3.interfaces.len(), 4);
    }

    #[test]
    fn test_absent_reading_overwrites_template_zero() {
        let default = EdgeFleetStats::template_for(["edge-1"]);
        let mut node = EdgeNodeStats::default();
        node.performance.cpu_stats.insert("0".into(), CoreStats::default());

        let mut collected = EdgeFleetStats::default();
        collected.nodes.insert("edge-1".into(), node);

        let merged = merge_stats(&default, &collected);
        assert_eq!(merged.nodes["edge-1"].performance.cpu_stats["0"].usage, None);
    }

    #[test]
    fn test_merge_is_idempotent_for_records() {
        let mut collected = ClusterStats::default();
        collected.record_host("esx-1", host_with("vmnic4", "vmnic4-pollWorld-2", 30.0, 2.0));

        let once = merge_stats(&ClusterStats::template(), &collected);
        let twice = merge_stats(&once, &collected);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_plain_shaped_ens_is_converted() {
        let mut plain = NicStats::default();
        for (name, used) in [("EnsNetWorld-0-1", 90.0), ("EnsNetWorld-0-2", 40.0), ("t", 95.0)] {
            plain.record(name.to_string(), ThreadStats { used, ready: 0.5 });
        }
        let mut host = HostStats::default();
        host.nic_stats.insert(NicId::aggregated(), NicEntry::Plain(plain));
        let mut collected = ClusterStats::default();
        collected.record_host("esx-1", host);

        let merged = try_merge(&ClusterStats::template(), &collected).unwrap();
        match &merged.hosts["esx-1"].nic_stats["ens"] {
            NicEntry::Aggregated(ens) => {
                assert_eq!(ens.tx.threads["EnsNetWorld-0-1"].used, 90.0);
                assert_eq!(ens.rx.threads["EnsNetWorld-0-2"].used, 40.0);
                assert!(!ens.tx.threads.contains_key("t"));
                assert!(!ens.rx.threads.contains_key("t"));
                assert_eq!(ens.max_used, 95.0);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_aggregated_shape_on_plain_nic_is_converted() {
        let mut ens = AggregatedNicStats::default();
        ens.record(
            Direction::Tx,
            "vmnic4-pollWorld-1".into(),
            ThreadStats { used: 30.0, ready: 1.0 },
        );
        ens.record(
            Direction::Rx,
            "vmnic4-pollWorld-2".into(),
            ThreadStats { used: 20.0, ready: 3.0 },
        );
        let mut host = HostStats::default();
        host.nic_stats.insert(NicId::new("vmnic4").unwrap(), NicEntry::Aggregated(ens));
        let mut collected = ClusterStats::default();
        collected.record_host("esx-1", host);

        let merged = try_merge(&ClusterStats::template(), &collected).unwrap();
        match &merged.hosts["esx-1"].nic_stats["vmnic4"] {
            NicEntry::Plain(nic) => {
                assert_eq!(nic.threads.len(), 2);
                assert_eq!(nic.max_used, 30.0);
                assert_eq!(nic.max_ready, 3.0);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}

#[cfg(test)]
mod entity_fallback_tests {
    use crate::merge::{merge_into, StatTree};
    use crate::models::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> StatTree {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_bad_host_falls_back_alone() {
        let default = StatTree::from_model(&ClusterStats::template()).unwrap();
        let collected = tree(json!({
            "hosts": {
                "esx-1": {"nic_stats": {"vmnic2": {
                    "max_used": 10.0,
                    "max_ready": 1.0,
                    "threads": {"vmnic2-pollWorld-0": {"used": 10.0, "ready": 1.0}}
                }}},
                "esx-2": {"nic_stats": {
                    "bad|nic": {"max_used": 50.0, "max_ready": 0.0, "threads": {}}
                }}
            },
            "max_values": {"used": 10.0, "ready": 1.0}
        }));

        let merged: ClusterStats = merge_into(&default, &collected).unwrap();

        match &merged.hosts["esx-1"].nic_stats["vmnic2"] {
            NicEntry::Plain(nic) => assert!(nic.threads.contains_key("vmnic2-pollWorld-0")),
            other => panic!("unexpected shape: {other:?}"),
        }
        assert!(merged.hosts["esx-1"].nic_stats.contains_key("vmnic3"));
        assert_eq!(merged.hosts["esx-2"], HostStats::template());
        assert_eq!(merged.max_values.used, 10.0);
    }

    #[test]
    fn test_bad_edge_node_keeps_its_default() {
        let fleet = EdgeFleetStats::template_for(["edge-1", "edge-2"]);
        let default = StatTree::from_model(&fleet).unwrap();
        let collected = tree(json!({
            "nodes": {
                "edge-1": {"performance": {"cpu_stats": {"0": {"usage": 50.0}}}},
                "edge-2": {"interfaces": {"fp-eth0": "broken"}}
            }
        }));

        let merged: EdgeFleetStats = merge_into(&default, &collected).unwrap();

        assert_eq!(merged.nodes["edge-1"].performance.cpu_stats["0"].usage, Some(50.0));
        assert_eq!(merged.nodes["edge-2"], EdgeNodeStats::template());
    }

    #[test]
    fn test_bad_root_is_an_error() {
        let default = StatTree::from_model(&ClusterStats::template()).unwrap();
        let collected = tree(json!({"hosts": "not a map"}));

        assert!(merge_into::<ClusterStats>(&default, &collected).is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use crate::merge::{merge_trees, StatTree};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn leaf() -> impl Strategy<Value = StatTree> {
        prop_oneof![
            Just(StatTree::Absent),
            any::<bool>().prop_map(StatTree::Flag),
            (-1.0e6f64..1.0e6).prop_map(StatTree::Number),
            "[a-z]{0,4}".prop_map(StatTree::Text),
        ]
    }

    fn tree() -> impl Strategy<Value = StatTree> {
        leaf().prop_recursive(4, 48, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(StatTree::List),
                prop::collection::btree_map("[a-e]{1,2}", inner, 0..4).prop_map(StatTree::Node),
            ]
        })
    }

    fn node() -> impl Strategy<Value = StatTree> {
        prop::collection::btree_map("[a-e]{1,2}", tree(), 0..5).prop_map(StatTree::Node)
    }

    fn lookup<'a>(tree: &'a StatTree, path: &[String]) -> Option<&'a StatTree> {
        path.iter().try_fold(tree, |current, key| current.get(key))
    }

    /// Every key path from the root to a leaf or an empty node
    fn leaf_paths(tree: &StatTree) -> Vec<Vec<String>> {
        fn walk(tree: &StatTree, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
            match tree {
                StatTree::Node(children) if !children.is_empty() => {
                    for (key, child) in children {
                        prefix.push(key.clone());
                        walk(child, prefix, out);
                        prefix.pop();
                    }
                }
                _ => out.push(prefix.clone()),
            }
        }

        let mut paths = Vec::new();
        walk(tree, &mut Vec::new(), &mut paths);
        paths
    }

    proptest! {
        #[test]
        fn prop_empty_collected_is_identity(default in node()) {
            let merged = merge_trees(&default, &StatTree::Node(BTreeMap::new()));
            prop_assert_eq!(merged, default);
        }

        #[test]
        fn prop_keys_of_both_sides_survive(default in node(), collected in node()) {
            let merged = merge_trees(&default, &collected);
            let merged_keys = merged.as_node().unwrap();

            for key in default.as_node().unwrap().keys() {
                prop_assert!(merged_keys.contains_key(key));
            }
            for key in collected.as_node().unwrap().keys() {
                prop_assert!(merged_keys.contains_key(key));
            }
        }

        #[test]
        fn prop_collected_leaves_win(default in node(), collected in node()) {
            let merged = merge_trees(&default, &collected);

            for path in leaf_paths(&collected) {
                let incoming = lookup(&collected, &path).unwrap();
                if incoming.is_node() {
                    continue;
                }
                prop_assert_eq!(lookup(&merged, &path), Some(incoming));
            }
        }

        #[test]
        fn prop_merge_is_idempotent(default in node(), collected in node()) {
            let once = merge_trees(&default, &collected);
            let twice = merge_trees(&once, &collected);
            prop_assert_eq!(once, twice);
        }
    }
}
