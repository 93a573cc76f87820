//! Collector tests over a scripted remote shell

#[cfg(test)]
mod collection_tests {
    use crate::collector::*;
    use crate::models::{Collected, NicEntry};
    use crate::settings::{CollectionConfig, EdgeClusterConfig, Settings, VropsConfig};
    use crate::testing::FakeShell;
    use serde_json::json;
    use std::sync::Arc;

    fn settings() -> Settings {
        let hosts = [("esx-01", "10.0.1.1"), ("esx-02", "10.0.1.2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Settings {
            edge_nodes: [("edge-01", "10.0.0.11"), ("edge-02", "10.0.0.12")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            edge_clusters: [(
                "cluster-a".to_string(),
                EdgeClusterConfig { esxi_hosts: hosts },
            )]
            .into_iter()
            .collect(),
            vrops_instance: VropsConfig {
                ip: "10.0.2.1".into(),
                adapter_instance_id: "adapter-1".into(),
                base_url: None,
                verify_tls: false,
            },
            collection: CollectionConfig::default(),
        }
    }

    fn net_stats(threads: serde_json::Value) -> serde_json::Value {
        json!({ "stats": [{ "sys": threads }] })
    }

    #[tokio::test]
    async fn test_cluster_collection_falls_back_per_host() {
        let shell = Arc::new(
            FakeShell::new()
                .with_payload(
                    "esx-01",
                    &net_stats_command(1),
                    net_stats(json!({
                        "1": {"name": "vmnic2-pollWorld-0", "used": 40.0, "ready": 2.0}
                    })),
                )
                .unreachable("esx-02"),
        );
        let collector = EsxiCollector::new(shell.clone(), &settings());

        let collection = collector.collect_cluster("cluster-a").await;
        let stats = &collection.stats;

        assert_eq!(stats.hosts.len(), 2);
        assert_eq!(stats.max_values.used, 40.0);
        assert_eq!(stats.max_values.ready, 2.0);
        assert_eq!(collection.fallbacks, vec!["esx-02".to_string()]);
        assert_eq!(stats.hosts["esx-02"], crate::models::HostStats::template());

        let calls = shell.calls();
        assert_eq!(calls.last().map(String::as_str), Some("disconnect_all"));
        assert!(calls.contains(&"disconnect:esx-01".to_string()));
    }

    #[tokio::test]
    async fn test_empty_payload_uses_template() {
        let shell = Arc::new(FakeShell::new());
        let collector = EsxiCollector::new(shell, &settings());

        let target = Target::esxi("esx-01", "10.0.1.1");
        let result = collector.collect_host(&target).await;
        assert!(matches!(result, crate::models::Collected::Failed(reason) if reason.contains("esx-01")));
    }

    #[tokio::test]
    async fn test_unknown_cluster_yields_empty_template() {
        let shell = Arc::new(FakeShell::new());
        let collector = EsxiCollector::new(shell.clone(), &settings());

        let collection = collector.collect_cluster("cluster-z").await;
        assert!(collection.stats.hosts.is_empty());
        assert!(shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ens_threads_collected() {
        let shell = Arc::new(FakeShell::new().with_payload(
            "esx-01",
            &net_stats_command(1),
            net_stats(json!({
                "1": {"name": "EnsNetWorld-0-2", "used": 9.0, "ready": 0.0}
            })),
        ));
        let collector = EsxiCollector::new(shell, &settings());

        let Collected::Ok(host) = collector
            .collect_host(&Target::esxi("esx-01", "10.0.1.1"))
            .await
        else {
            panic!("collected");
        };
        let NicEntry::Aggregated(ens) = &host.nic_stats["ens"] else {
            panic!("ens must be aggregated");
        };
        assert!(ens.rx.threads.contains_key("EnsNetWorld-0-2"));
    }

    #[tokio::test]
    async fn test_edge_collection_marks_unreachable_nodes() {
        let shell = Arc::new(
            FakeShell::new()
                .with_payload(
                    "edge-01",
                    EDGE_INTERFACES_COMMAND,
                    json!({"physical_ports": [
                        {"name": "fp-eth0", "stats": {"rx_errors": 2, "rx_misses": 5, "tx_errors": 0}}
                    ]}),
                )
                .with_payload(
                    "edge-01",
                    &perfstats_command(1),
                    json!([
                        {"CpuStats": [{"core": "0", "usage": "35%", "crypto": "10 pps"}]},
                        {"FlowCacheStats": {"micro": [{"core": "0", "hit rate": "91%"}], "mega": []}}
                    ]),
                )
                .unreachable("edge-02"),
        );
        let collector = EdgeCollector::new(shell.clone(), &settings());

        let collection = collector.collect_all().await;
        let fleet = &collection.stats;

        assert_eq!(fleet.nodes.len(), 2);
        assert!(fleet.nodes["edge-02"].is_failed());
        assert_eq!(collection.fallbacks, vec!["edge-02".to_string()]);

        let edge1 = &fleet.nodes["edge-01"];
        assert_eq!(edge1.interfaces["fp-eth0"].rx_misses, 5.0);
        assert_eq!(edge1.performance.cpu_stats["0"].usage, Some(35.0));

        let max = fleet.max_values.expect("fleet aggregate");
        assert_eq!(max.cpu.usage, 35.0);
        assert_eq!(max.cpu.crypto, 10.0);
        assert_eq!(max.interfaces.rx_errors, 2.0);
        assert_eq!(max.flow_cache.micro_hit_rate, Some(91.0));
        assert_eq!(max.flow_cache.mega_hit_rate, None);

        assert_eq!(shell.calls().last().map(String::as_str), Some("disconnect_all"));
    }

    #[tokio::test]
    async fn test_edge_node_without_perf_data_keeps_interfaces() {
        let shell = Arc::new(FakeShell::new().with_payload(
            "edge-01",
            EDGE_INTERFACES_COMMAND,
            json!({"physical_ports": [{"name": "fp-eth1", "stats": {"tx_errors": 1}}]}),
        ));
        let collector = EdgeCollector::new(shell, &settings());

        let Collected::Ok(node) = collector
            .collect_node(&Target::edge("edge-01", "10.0.0.11"))
            .await
        else {
            panic!("collected");
        };
        assert_eq!(node.interfaces["fp-eth1"].tx_errors, 1.0);
        assert!(node.performance.cpu_stats.is_empty());
        assert!(!node.is_failed());
    }

    #[test]
    fn test_commands() {
        assert_eq!(net_stats_command(1), "net-stats -i 1 -tW -A");
        assert_eq!(perfstats_command(5), "get dataplane perfstats 5");
    }

    #[test]
    fn test_is_empty_payload() {
        assert!(is_empty_payload(&json!({})));
        assert!(is_empty_payload(&json!([])));
        assert!(is_empty_payload(&serde_json::Value::Null));
        assert!(!is_empty_payload(&json!({"stats": []})));
    }
}
