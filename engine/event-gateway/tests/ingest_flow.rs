//! End-to-end flow: HTTP request through the gateway and pipeline into a store

use event_gateway::{create_routes, ErrorResponse, GatewayConfig};
use event_pipeline::{MemoryStore, Pipeline, PipelineConfig, WriterConfig};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

const EXAMPLE: &str = r#"{
    "client_time": "2020-12-01 23:59:00",
    "device_id": "0287D9AA-4ADF-4B37-A60F-3E9E645C821E",
    "device_os": "iOS 13.5.1",
    "session": "ybuRi8mAUypxjbxQ",
    "sequence": 1,
    "event": "app_start",
    "param_int": 0,
    "param_str": "some text"
}"#;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        writer: WriterConfig { dead_letter_dir: None, ..Default::default() },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_example_event_is_written_after_one_flush_interval() {
    let store = MemoryStore::new();
    let (ingest, handle) = Pipeline::start(pipeline_config(), Arc::new(store.clone())).unwrap();
    let routes = create_routes(ingest, &GatewayConfig::default());

    let response = warp::test::request()
        .method("POST")
        .path("/api/event")
        .remote_addr("203.0.113.9:40000".parse().unwrap())
        .header("content-type", "application/json")
        .body(EXAMPLE)
        .reply(&routes)
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(store.events().is_empty());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let batches = store.batches();
    assert_eq!(batches.len(), 1);
    let event = &batches[0][0];
    assert_eq!(event.device_id, "0287D9AA-4ADF-4B37-A60F-3E9E645C821E");
    assert_eq!(event.device_os, "iOS 13.5.1");
    assert_eq!(event.session, "ybuRi8mAUypxjbxQ");
    assert_eq!(event.sequence, 1);
    assert_eq!(event.event, "app_start");
    assert_eq!(event.param_int, Some(0));
    assert_eq!(event.param_str.as_deref(), Some("some text"));
    assert_eq!(event.client_time.to_string(), "2020-12-01 23:59:00");
    assert_eq!(event.ip.as_deref(), Some("203.0.113.9"));
    assert!(!event.server_time.is_zero());

    let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(stats.events_written, 1);
    assert_eq!(stats.batches_written, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_param_type_is_rejected_and_never_stored() {
    let store = MemoryStore::new();
    let (ingest, handle) = Pipeline::start(pipeline_config(), Arc::new(store.clone())).unwrap();
    let routes = create_routes(ingest, &GatewayConfig::default());

    let body = EXAMPLE.replace(r#""param_int": 0"#, r#""param_int": "zero""#);
    let response = warp::test::request()
        .method("POST")
        .path("/api/event")
        .remote_addr("203.0.113.9:40000".parse().unwrap())
        .body(body)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.error.code, "INVALID_EVENT");

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(store.insert_calls(), 0);

    handle.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_many_clients_arrive_complete() {
    let store = MemoryStore::new();
    let (ingest, handle) = Pipeline::start(pipeline_config(), Arc::new(store.clone())).unwrap();
    let routes = create_routes(ingest, &GatewayConfig::default());

    // More requests than the hand-off channel holds
    for sequence in 0..250 {
        let body = format!(
            r#"{{"device_id":"client-{}","sequence":{},"event":"tap"}}"#,
            sequence % 10,
            sequence
        );
        let response = warp::test::request()
            .method("POST")
            .path("/api/event")
            .remote_addr(format!("10.0.0.{}:5000", sequence % 10 + 1).parse().unwrap())
            .body(body)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        if sequence == 120 {
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
    }

    let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();

    // Arrival order holds inside a batch; batches themselves may land in any order
    let batches = store.batches();
    assert!(batches.len() >= 2);
    for batch in &batches {
        let sequences: Vec<i32> = batch.iter().map(|e| e.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");
    }

    let mut sequences: Vec<i32> = batches.iter().flatten().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (0..250).collect::<Vec<_>>());

    let event = batches.iter().flatten().find(|e| e.sequence == 11).unwrap();
    assert_eq!(event.ip.as_deref(), Some("10.0.0.2"));
    assert_eq!(event.device_id, "client-1");
    assert_eq!(stats.events_received, 250);
}
