use dockunit_core::{ContainerId, Error, ProcessId, ReconciliationOutcome};
use dockunit_engine::*;
use std::sync::Arc;
use std::time::Duration;

fn named_request(name: &str, remove_on_exit: bool) -> LaunchRequest {
    LaunchRequest {
        name: Some(ContainerId::new(name).unwrap()),
        run_args: vec![
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "busybox".to_string(),
        ],
        remove_on_exit,
    }
}

#[tokio::test]
async fn test_missing_named_container_is_launched() {
    let engine = Arc::new(MockEngine::new());
    let resolver = Resolver::new(engine.clone());

    let resolution = resolver.resolve(&named_request("web", false)).await.unwrap();

    assert_eq!(resolution.outcome, ReconciliationOutcome::Launched);
    assert_eq!(resolution.handle.name.as_ref().map(ContainerId::as_str), Some("web"));
    assert!(engine.exists("web"));
}

#[tokio::test]
async fn test_stopped_with_remove_is_recreated() {
    let engine = Arc::new(MockEngine::new());
    engine.add_container("old", Some("web"), false, 0);
    let resolver = Resolver::new(engine.clone());

    let resolution = resolver.resolve(&named_request("web", true)).await.unwrap();

    assert_eq!(resolution.outcome, ReconciliationOutcome::Recreated);
    assert_ne!(resolution.handle.id.as_str(), "old");
    assert!(!engine.exists("old"));

    // Removal strictly precedes the launch, otherwise the name would conflict
    let calls = engine.calls();
    let removed = calls
        .iter()
        .position(|c| *c == EngineCall::Remove("old".to_string()))
        .unwrap();
    let launched = calls
        .iter()
        .position(|c| matches!(c, EngineCall::Launch(_)))
        .unwrap();
    assert!(removed < launched);
}

#[tokio::test]
async fn test_stopped_without_remove_is_restarted_in_place() {
    let engine = Arc::new(MockEngine::new());
    engine.add_container("old", Some("web"), false, 0);
    let resolver = Resolver::new(engine.clone());

    let resolution = resolver.resolve(&named_request("web", false)).await.unwrap();

    assert_eq!(resolution.outcome, ReconciliationOutcome::Restarted);
    assert_eq!(resolution.handle.id.as_str(), "old");
    assert!(resolution.handle.pid.is_valid());

    // The unit restarts after the workload exits again
    engine.stop("web");
    let again = resolver.resolve(&named_request("web", false)).await.unwrap();

    assert_eq!(again.outcome, ReconciliationOutcome::Restarted);
    assert_eq!(again.handle.id, resolution.handle.id);
    assert!(again.handle.pid.is_valid());
    assert_ne!(again.handle.pid, resolution.handle.pid);
    assert!(
        engine
            .calls()
            .iter()
            .all(|c| !matches!(c, EngineCall::Launch(_) | EngineCall::Remove(_)))
    );
}

#[tokio::test]
async fn test_reattach_spawns_nothing() {
    let engine = Arc::new(MockEngine::new());
    engine.add_container("live", Some("web"), true, 777);
    let resolver = Resolver::new(engine.clone());

    for remove_on_exit in [false, true] {
        let resolution = resolver
            .resolve(&named_request("web", remove_on_exit))
            .await
            .unwrap();
        assert_eq!(resolution.outcome, ReconciliationOutcome::Reattached);
        assert_eq!(resolution.handle.pid, ProcessId::from_raw(777));
    }

    assert!(
        engine
            .calls()
            .iter()
            .all(|c| matches!(c, EngineCall::Inspect(_)))
    );
}

#[tokio::test]
async fn test_zero_pid_after_launch_is_an_error() {
    let engine = Arc::new(MockEngine::new());
    engine.set_launch_pid(0);
    let resolver = Resolver::new(engine);

    let err = resolver
        .resolve(&named_request("web", false))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Resolution { .. }));
    assert!(err.to_string().contains("pid is 0"));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_then_finalize_attached_with_remove() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("web.pid");

    let engine = Arc::new(MockEngine::new());
    let resolver = Resolver::new(engine.clone());
    let resolution = resolver.resolve(&named_request("web", true)).await.unwrap();
    engine.stop_after_polls(resolution.handle.id.as_str(), 5);

    let plan = FinalizePlan {
        pid_file: Some(pid_file.clone()),
        attached: true,
        stream_logs: true,
        remove_on_exit: true,
    };
    Finalizer::new(engine.clone(), Duration::from_secs(1))
        .finalize(&resolution.handle, &plan)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(&pid_file).unwrap(),
        resolution.handle.pid.to_string()
    );
    assert!(!engine.exists("web"));
}

#[tokio::test]
async fn test_keep_alive_surfaces_engine_errors() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_inspect();

    let err = Finalizer::new(engine, Duration::from_millis(1))
        .keep_alive(&ContainerId::new("web").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Engine { .. }));
}
