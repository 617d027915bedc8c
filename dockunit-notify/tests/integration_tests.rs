use dockunit_core::{Liveness, ProcessId};
use dockunit_notify::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UnixDatagram;
use tokio::time::timeout;

/// Counts checks and reports death from check number `dies_at` on
struct ScriptedLiveness {
    checks: AtomicUsize,
    dies_at: usize,
}

impl ScriptedLiveness {
    fn new(dies_at: usize) -> Arc<Self> {
        Arc::new(Self {
            checks: AtomicUsize::new(0),
            dies_at,
        })
    }

    fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl Liveness for ScriptedLiveness {
    fn is_alive(&self, _pid: ProcessId) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst) < self.dies_at
    }
}

/// Every datagram that arrives before the socket goes quiet
async fn drain(socket: &UnixDatagram) -> Vec<String> {
    let mut received = Vec::new();
    let mut buf = [0u8; 256];
    while let Ok(Ok(n)) = timeout(Duration::from_millis(100), socket.recv(&mut buf)).await {
        received.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
    received
}

fn bound_socket(dir: &tempfile::TempDir) -> (UnixDatagram, std::path::PathBuf) {
    let path = dir.path().join("notify.sock");
    let socket = UnixDatagram::bind(&path).unwrap();
    (socket, path)
}

#[tokio::test]
async fn test_mainpid_then_ready() {
    let dir = tempfile::tempdir().unwrap();
    let (server, path) = bound_socket(&dir);
    let liveness = ScriptedLiveness::new(usize::MAX);

    let notifier = Notifier::new(liveness.clone());
    let state = NotificationState {
        socket_path: Some(path),
        main_pid: ProcessId::from_raw(4321),
        delegated: false,
    };
    notifier.notify(&state).await.unwrap();

    assert_eq!(drain(&server).await, vec!["MAINPID=4321", "READY=1"]);
    assert_eq!(liveness.checks(), 2);
}

#[tokio::test]
async fn test_delegated_skips_ready() {
    let dir = tempfile::tempdir().unwrap();
    let (server, path) = bound_socket(&dir);

    let notifier = Notifier::new(ScriptedLiveness::new(usize::MAX));
    let state = NotificationState {
        socket_path: Some(path),
        main_pid: ProcessId::from_raw(4321),
        delegated: true,
    };
    notifier.notify(&state).await.unwrap();

    assert_eq!(drain(&server).await, vec!["MAINPID=4321"]);
}

#[tokio::test]
async fn test_death_between_checks_reclaims_mainpid() {
    let dir = tempfile::tempdir().unwrap();
    let (server, path) = bound_socket(&dir);

    // Alive for the pre-check, gone by the re-check
    let notifier = Notifier::new(ScriptedLiveness::new(1));
    let state = NotificationState {
        socket_path: Some(path),
        main_pid: ProcessId::from_raw(4321),
        delegated: false,
    };
    let err = notifier.notify(&state).await.unwrap_err();

    assert!(err.is_race());
    assert_eq!(
        drain(&server).await,
        vec![
            "MAINPID=4321".to_string(),
            format!("MAINPID={}", notifier.own_pid()),
        ]
    );
}

#[tokio::test]
async fn test_dead_before_handshake_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (server, path) = bound_socket(&dir);

    let notifier = Notifier::new(ScriptedLiveness::new(0));
    let state = NotificationState {
        socket_path: Some(path),
        main_pid: ProcessId::from_raw(4321),
        delegated: false,
    };
    let err = notifier.notify(&state).await.unwrap_err();

    assert!(err.is_race());
    assert!(drain(&server).await.is_empty());
}

#[tokio::test]
async fn test_notifier_over_proc_table() {
    let dir = tempfile::tempdir().unwrap();
    let (server, path) = bound_socket(&dir);

    let proc_root = tempfile::tempdir().unwrap();
    std::fs::create_dir(proc_root.path().join("4321")).unwrap();
    let table = Arc::new(dockunit_core::ProcTable::new(proc_root.path()));

    let notifier = Notifier::new(table);
    let state = NotificationState {
        socket_path: Some(path),
        main_pid: ProcessId::from_raw(4321),
        delegated: false,
    };
    notifier.notify(&state).await.unwrap();

    assert_eq!(drain(&server).await, vec!["MAINPID=4321", "READY=1"]);
}
