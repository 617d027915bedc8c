//! Drives `DockerCli` against a shell script standing in for the client binary.
//!
//! Kept as a single test: spawning a freshly written executable from several
//! threads at once can fail with ETXTBSY.

#![cfg(unix)]

use dockunit_core::{ContainerId, Error, ProcessId};
use dockunit_engine::{ContainerEngine, DockerCli};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const FAKE_DOCKER: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
if [ "$1" = "--host" ]; then shift 2; fi
case "$1" in
  inspect)
    if [ "$4" = "web" ]; then
      echo '[{"Id":"3f4e1b2c9a7d","Name":"/web","State":{"Running":true,"Pid":4321}}]'
    else
      echo "Error: No such container: $4" >&2
      exit 1
    fi
    ;;
  run)
    echo "Unable to find image 'busybox:latest' locally" >&2
    echo "3f4e1b2c9a7d"
    ;;
  rm)
    ;;
  start)
    echo "Error response from daemon: cannot start" >&2
    exit 1
    ;;
  *)
    exit 2
    ;;
esac
"#;

fn install(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("docker");
    std::fs::write(&path, FAKE_DOCKER).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_docker_cli_against_fake_binary() {
    let dir = tempfile::tempdir().unwrap();
    let binary = install(dir.path());
    let docker = DockerCli::new(&binary).with_host("unix:///run/test.sock");

    let web = ContainerId::new("web").unwrap();
    let state = docker.inspect(&web).await.unwrap().unwrap();
    assert_eq!(state.id.as_str(), "3f4e1b2c9a7d");
    assert!(state.running);
    assert_eq!(state.pid, ProcessId::from_raw(4321));

    let missing = ContainerId::new("nope").unwrap();
    assert!(docker.inspect(&missing).await.unwrap().is_none());

    let args = vec!["-d".to_string(), "busybox".to_string()];
    let id = docker.launch(&args).await.unwrap();
    assert_eq!(id.as_str(), "3f4e1b2c9a7d");

    docker.remove(&id).await.unwrap();

    let err = docker.start(&id).await.unwrap_err();
    assert!(matches!(err, Error::Engine { .. }));
    assert!(err.to_string().contains("cannot start"));

    let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(
        calls,
        vec![
            "--host unix:///run/test.sock inspect --type container web",
            "--host unix:///run/test.sock inspect --type container nope",
            "--host unix:///run/test.sock run -d busybox",
            "--host unix:///run/test.sock rm -f 3f4e1b2c9a7d",
            "--host unix:///run/test.sock start 3f4e1b2c9a7d",
        ]
    );

    let unreachable = DockerCli::new(dir.path().join("no-such-binary"));
    assert!(unreachable.inspect(&web).await.is_err());
}
