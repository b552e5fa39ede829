use sensor_host::{
    Command, HostConfig, HostError, PublishOutcome, ServerConfig, SnapshotStore, Status,
    CURRENT_FILE, DEFAULT_PORT, DEFAULT_REFRESH_INTERVAL, NEXT_FILE,
};
use serde_json::{json, Value};
use std::time::Duration;

/// Test configuration validation against the documented limits
#[test]
fn test_config_validation() {
    let validated = HostConfig::new(["temp1", "temp2"], 8090)
        .with_refresh(1.0)
        .validate()
        .expect("Should accept a valid configuration");
    assert_eq!(validated.port, 8090);
    assert_eq!(validated.sensors, vec!["temp1", "temp2"]);
    assert_eq!(validated.refresh_interval, Duration::from_secs(1));

    let no_sensors: Vec<String> = Vec::new();
    tokio_test::assert_err!(HostConfig::new(no_sensors, 8090).validate());
    tokio_test::assert_err!(HostConfig::new(["temp1"], 0).validate());
    tokio_test::assert_err!(HostConfig::new(["temp1"], 65536).validate());
}

/// Test default substitution for missing or invalid values
#[test]
fn test_config_defaults() {
    let config = HostConfig::default();
    assert_eq!(config.port, i64::from(DEFAULT_PORT));
    assert!(config.sensors.is_empty());
    assert!(config.enable_cors);

    let validated = HostConfig::new(["a"], 8080)
        .with_refresh(-1.0)
        .validate()
        .unwrap();
    assert_eq!(validated.refresh_interval, DEFAULT_REFRESH_INTERVAL);
    assert_eq!(DEFAULT_REFRESH_INTERVAL, Duration::from_secs(5));
}

/// Test HostError creation and formatting
#[test]
fn test_host_error_types() {
    let config_error = HostError::config_error("Invalid configuration");
    assert!(format!("{}", config_error).contains("Invalid configuration"));

    let publish_error = HostError::publish_error(
        "temp1",
        std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
    );
    let msg = format!("{}", publish_error);
    assert!(msg.contains("temp1"));
    assert!(msg.contains("disk full"));

    assert!(format!("{}", HostError::AlreadyRunning).contains("already running"));
}

/// Test ServerConfig builder pattern
#[test]
fn test_server_config() {
    let config = ServerConfig::default()
        .with_host("127.0.0.1")
        .with_cors(false);

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, DEFAULT_PORT);
    assert!(!config.enable_cors);
    assert_eq!(config.bind_address(), "127.0.0.1:8080");
}

/// Test the status payload field names
#[test]
fn test_status_json_shape() {
    let idle = serde_json::to_value(Status::default()).expect("Should serialize");
    assert_eq!(
        idle,
        json!({
            "running": false,
            "port": 0,
            "sensors": [],
            "refresh_interval": 0.0,
            "temp_dir": ""
        })
    );

    let live = Status {
        running: true,
        port: 8090,
        sensors: vec!["temp1".to_string()],
        refresh_interval: 1.0,
        temp_dir: "/dev/shm/sensor_host_x".to_string(),
        configured_at: Some(chrono::Utc::now()),
    };
    let value = serde_json::to_value(&live).unwrap();
    assert_eq!(value["sensors"], json!(["temp1"]));
    assert!(value.get("configured_at").is_some());
}

/// Test command decoding
#[test]
fn test_command_parsing() {
    let parse = |value: Value| Command::parse(value.as_object().unwrap());
    assert_eq!(parse(json!({"status": {}})), Command::Status);
    assert_eq!(parse(json!({"refresh_now": {}})), Command::RefreshNow);
    assert_eq!(
        parse(json!({"explode": 1})),
        Command::Unknown(vec!["explode".to_string()])
    );
}

/// Test the on-disk layout written by the store
#[tokio::test]
async fn test_store_layout() {
    let base = tempfile::tempdir().unwrap();
    let root = base.path().join("generation");
    let store = SnapshotStore::init(&root, &["temp1"]).await.unwrap();

    let outcome = store
        .publish("temp1", &json!({"celsius": 20.25, "ok": true}))
        .await
        .unwrap();
    assert_eq!(outcome, PublishOutcome::Written);

    let source_dir = root.join("temp1");
    assert!(source_dir.join(CURRENT_FILE).is_file());
    assert!(!source_dir.join(NEXT_FILE).exists());

    let content = std::fs::read_to_string(source_dir.join(CURRENT_FILE)).unwrap();
    let value: Value = serde_json::from_str(&content).expect("Should be valid JSON");
    assert_eq!(value, json!({"celsius": 20.25, "ok": true}));

    tokio_test::assert_ok!(store.teardown().await);
    assert!(!root.exists());
    tokio_test::assert_ok!(store.teardown().await);
}
