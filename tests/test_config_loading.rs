use std::sync::Arc;
use std::time::Duration;

use task_runtime::domain::checkpoint::policy::CheckpointPolicy;
use task_runtime::domain::runtime::config::{CheckpointConfig, TraceConfig};
use task_runtime::domain::runtime::runtime::{Runtime, ShutdownMode};
use task_runtime::domain::scheduler::scheduling_policy::SchedulingPolicy;
use task_runtime::domain::simulator::simulated_adaptor::SimulatedAdaptor;
use task_runtime::domain::task::parameter::{DataType, Direction};
use task_runtime::domain::task::task::OnFailure;
use task_runtime::error::{ConversionError, Error};
use task_runtime::{load_application, load_config};

const RUNTIME_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/runtime.json");
const APPLICATION_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/application.json");

fn write_temp(content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("runtime-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_sample_config() {
    let config = load_config(RUNTIME_FILE).unwrap();

    assert_eq!(config.policy, SchedulingPolicy::Fifo);
    assert_eq!(config.orchestrator.retry_budget, 2);
    assert_eq!(config.orchestrator.default_timeout, Some(Duration::from_millis(5000)));
    assert_eq!(config.checkpoint.policy, CheckpointPolicy::InstantiatedGroup { size: 3 });
    assert!(config.checkpoint.avoid_signatures.contains("pipeline.report"));
    assert!(config.trace.enabled);

    assert_eq!(config.workers.len(), 3);
    let node_b = &config.workers[1];
    assert_eq!(node_b.name.as_str(), "node-b");
    assert_eq!(node_b.description.cores, 2);
    assert!(node_b.description.tags.contains("gpu"));
    assert!(node_b.shared_disks.contains("scratch"));
    assert_eq!(config.workers[2].description.architecture.as_deref(), Some("arm"));
}

#[test]
fn test_load_sample_application() {
    let application = load_application(APPLICATION_FILE).unwrap();

    assert_eq!(application.name, "pipeline");
    assert_eq!(application.inputs.len(), 2);
    assert_eq!(application.inputs[1].data_type, DataType::Object);
    assert_eq!(application.tasks.len(), 7);

    let train = &application.tasks[3];
    assert_eq!(train.group.as_ref().map(|g| g.as_str()), Some("training"));
    assert_eq!(train.retry_budget, Some(3));
    assert_eq!(train.implementations.len(), 2);
    assert_eq!(train.parameters[1].direction, Direction::Commutative);

    assert_eq!(application.tasks[5].on_failure, OnFailure::Ignore);
    assert_eq!(application.tasks[6].parameters[1].direction, Direction::Concurrent);
    assert_eq!(application.main_accesses.len(), 2);
    assert_eq!(application.behaviours.len(), 5);
}

#[test]
fn test_missing_and_malformed_files() {
    assert!(matches!(load_config("does/not/exist.json"), Err(Error::IoError(_))));

    let path = write_temp("{ \"workers\": [ ");
    assert!(matches!(load_config(&path), Err(Error::DeserializationError(_))));
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_invalid_config_values() {
    let cases = [
        (r#"{ "scheduler": { "policy": "RANDOM" } }"#, "policy"),
        (r#"{ "checkpoint": { "policy": "sometimes" } }"#, "checkpoint"),
        (r#"{ "workers": [ { "name": "a", "cores": 1 }, { "name": "a", "cores": 2 } ] }"#, "duplicate"),
        (r#"{ "workers": [ { "name": "a", "cores": 0 } ] }"#, "cores"),
        (r#"{ "scheduler": { "taskTimeoutMs": 0 } }"#, "timeout"),
    ];

    for (content, case) in cases {
        let path = write_temp(content);
        let result = load_config(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(Error::ConversionError(_))), "case '{}' should be rejected", case);
    }

    let path = write_temp(r#"{ "workers": [ { "name": "a", "cores": 1 }, { "name": "a", "cores": 2 } ] }"#);
    assert!(matches!(load_config(&path), Err(Error::ConversionError(ConversionError::DuplicateWorker(name))) if name == "a"));
    let _ = std::fs::remove_file(path);
}

#[actix_rt::test]
async fn test_sample_application_runs_to_completion() {
    let mut config = load_config(RUNTIME_FILE).unwrap();
    config.checkpoint = CheckpointConfig::default();
    config.trace = TraceConfig::default();
    let application = load_application(APPLICATION_FILE).unwrap();

    let adaptor = Arc::new(application.configure(SimulatedAdaptor::new(config.workers.iter().map(|w| w.name.to_string()))));
    let runtime = Runtime::start(config, adaptor.clone()).await.unwrap();

    for input in &application.inputs {
        runtime.register_data(input.name.as_str(), input.data_type, input.location.clone()).await.unwrap();
    }
    let mut handles = Vec::new();
    for task in application.tasks.iter().cloned() {
        handles.push(runtime.submit_task(task).await.unwrap());
    }
    for name in &application.main_accesses {
        assert!(!runtime.main_access(name.as_str()).await.unwrap().is_empty());
    }

    let report = runtime.shutdown(ShutdownMode::Drain).await.unwrap();
    assert_eq!(report.counters.submitted, 7);
    assert_eq!(report.counters.completed, 7);
    assert!(report.failure.is_none());
    assert_eq!(adaptor.attempts("pipeline.train"), 3);
    for handle in handles {
        assert!(handle.wait().await.is_success());
    }
}
