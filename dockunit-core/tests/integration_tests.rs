use dockunit_core::*;
use std::time::SystemTime;

#[test]
fn test_container_id_validation() {
    // Valid references
    assert!(ContainerId::new("web").is_ok());
    assert!(ContainerId::new("web-1").is_ok());
    assert!(ContainerId::new("web_1.blue").is_ok());
    assert!(ContainerId::new("a").is_ok());
    assert!(ContainerId::new("3f4e1b2c9a7d").is_ok());
    assert!(ContainerId::new("f".repeat(64)).is_ok());

    // Invalid - empty
    assert!(ContainerId::new("").is_err());
    assert!(ContainerId::new("/").is_err());

    // Invalid - too long
    assert!(ContainerId::new("a".repeat(129)).is_err());

    // Invalid - bad characters
    assert!(ContainerId::new("web@1").is_err());
    assert!(ContainerId::new("web 1").is_err());
    assert!(ContainerId::new("web/1").is_err());
    assert!(ContainerId::new("web:1").is_err());
    assert!(ContainerId::new(".hidden").is_err());
}

#[test]
fn test_container_id_serialization() {
    let id = ContainerId::new("web-1").unwrap();

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"web-1\"");

    let deserialized: ContainerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, deserialized);

    // Engine-style names deserialize without their leading slash
    let named: ContainerId = serde_json::from_str("\"/web-1\"").unwrap();
    assert_eq!(named, id);
}

#[test]
fn test_handle_usability() {
    struct AlwaysAlive;
    impl Liveness for AlwaysAlive {
        fn is_alive(&self, _pid: ProcessId) -> bool {
            true
        }
    }

    let mut handle = ContainerHandle {
        id: ContainerId::new("abc123").unwrap(),
        name: None,
        pid: ProcessId::from_raw(0),
        running: true,
    };
    assert!(!handle.is_usable(&AlwaysAlive));

    handle.pid = ProcessId::from_raw(4321);
    assert!(handle.is_usable(&AlwaysAlive));

    let dead = ProcTable::new("/nonexistent-proc-root");
    assert!(!handle.is_usable(&dead));
}

#[test]
fn test_handle_serde() {
    let handle = ContainerHandle {
        id: ContainerId::new("abc123").unwrap(),
        name: Some(ContainerId::new("web").unwrap()),
        pid: ProcessId::from_raw(4321),
        running: true,
    };

    let json = serde_json::to_string(&handle).unwrap();
    let back: ContainerHandle = serde_json::from_str(&json).unwrap();
    assert_eq!(back, handle);
}

#[test]
fn test_event_timestamp_roundtrip_is_second_precision() {
    let now = SystemTime::now();
    let event = LifecycleEvent::Removed {
        id: ContainerId::new("web").unwrap(),
        timestamp: now,
    };

    let json = serde_json::to_string(&event).unwrap();
    let back: LifecycleEvent = serde_json::from_str(&json).unwrap();

    let LifecycleEvent::Removed { timestamp, .. } = back else {
        panic!("expected a removed event, got {back:?}");
    };
    let delta = now.duration_since(timestamp).unwrap();
    assert!(delta.as_secs() < 1);
}
