//! Integration tests for the Prometheus provider
//!
//! These tests stand up a mock Prometheus HTTP API and check snapshot
//! assembly and failure classification without a real monitoring stack.

#[cfg(test)]
mod mock_prometheus_tests {
    use crate::collector::{MetricsProvider, PrometheusProvider, QuerySet};
    use crate::error::FailureKind;
    use crate::models::{ClusterState, Sample, MISSING};
    use mockito::{Matcher, Mock, ServerGuard};

    fn vector(series: &[(&str, &str)]) -> String {
        let result: Vec<String> = series
            .iter()
            .map(|(node, value)| {
                format!(
                    r#"{{"metric":{{"node":"{}"}},"value":[1700000000.0,"{}"]}}"#,
                    node, value
                )
            })
            .collect();
        format!(
            r#"{{"status":"success","data":{{"resultType":"vector","result":[{}]}}}}"#,
            result.join(",")
        )
    }

    fn scalar(value: Option<&str>) -> String {
        match value {
            Some(v) => format!(
                r#"{{"status":"success","data":{{"resultType":"vector","result":[{{"metric":{{}},"value":[1700000000.0,"{}"]}}]}}}}"#,
                v
            ),
            None => r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#.to_string(),
        }
    }

    async fn mock_query(server: &mut ServerGuard, promql: &str, body: String) -> Mock {
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded("query".into(), promql.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Mock every query of a cluster where cillium1, cillium2 and cillium3 report
    async fn mock_cluster(server: &mut ServerGuard) -> Vec<Mock> {
        let q = QuerySet::default();
        vec![
            mock_query(
                server,
                &q.cpu_usage,
                vector(&[("cillium1", "5.0"), ("cillium2", "80.126"), ("cillium3", "60.0")]),
            )
            .await,
            mock_query(
                server,
                &q.mem_usage,
                vector(&[("cillium1", "40.0"), ("cillium2", "50.0"), ("cillium3", "60.0")]),
            )
            .await,
            mock_query(server, &q.gpu_usage, vector(&[("cillium3", "35.0")])).await,
            mock_query(server, &q.gpu_temp, vector(&[("cillium3", "61.0")])).await,
            mock_query(server, &q.completed_batch, scalar(Some("12"))).await,
            mock_query(server, &q.running_batch, scalar(Some("3"))).await,
            mock_query(server, &q.total_batch, scalar(Some("20"))).await,
            mock_query(server, &q.pending_batch, scalar(None)).await,
            mock_query(server, &q.running_long, scalar(Some("1"))).await,
            mock_query(server, &q.pending_long, scalar(Some("2"))).await,
        ]
    }

    #[tokio::test]
    async fn test_snapshot_from_prometheus() {
        let mut server = mockito::Server::new_async().await;
        let _mocks = mock_cluster(&mut server).await;

        let provider =
            PrometheusProvider::new(&format!("{}/api/v1/query", server.url())).unwrap();
        let snapshot = provider.snapshot().await.unwrap();

        assert_eq!(snapshot.active_nodes, ClusterState::OnlyA);
        assert_eq!(snapshot.cpu_usage, [5.0, 80.13, 60.0, MISSING]);
        assert_eq!(snapshot.mem_usage, [40.0, 50.0, 60.0, MISSING]);
        assert_eq!(snapshot.gpu_usage, [35.0, MISSING]);
        assert_eq!(snapshot.gpu_temp, [61.0, MISSING]);
        assert_eq!(snapshot.jobs.completed_batch, 12);
        assert_eq!(snapshot.jobs.running_batch, 3);
        assert_eq!(snapshot.jobs.pending_batch, 0);
        assert_eq!(snapshot.jobs.total_batch, 20);
        assert_eq!(snapshot.jobs.running_long, 1);
        assert_eq!(snapshot.jobs.pending_long, 2);

        let sample = Sample::from_snapshot(&snapshot);
        assert!((sample.cpu_worker_avg - 70.065).abs() < 1e-9);
        assert_eq!(sample.gpu_worker_avg, 35.0);
        assert!(sample.gpu_pending);
    }

    #[tokio::test]
    async fn test_malformed_response_is_data_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"success","data":{}}"#)
            .create_async()
            .await;

        let provider =
            PrometheusProvider::new(&format!("{}/api/v1/query", server.url())).unwrap();
        let err = provider.snapshot().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DataShape);
    }

    #[tokio::test]
    async fn test_series_without_node_label_is_data_shape() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(scalar(Some("1")))
            .create_async()
            .await;

        let provider =
            PrometheusProvider::new(&format!("{}/api/v1/query", server.url())).unwrap();
        let err = provider.snapshot().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DataShape);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let provider =
            PrometheusProvider::new(&format!("{}/api/v1/query", server.url())).unwrap();
        let err = provider.snapshot().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        let provider = PrometheusProvider::new("http://127.0.0.1:1/api/v1/query").unwrap();
        let err = provider.snapshot().await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Transient);
    }
}
