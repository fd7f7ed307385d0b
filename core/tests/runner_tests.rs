// tests/runner_tests.rs
mod common;
use common::*;
use kubeforge::connector::runner::{sha256_hex, TransferReport};
use kubeforge::{Connection, Dialer, ForgeError, Host, LocalConnection, Runner};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn runner_on(conn: Arc<MockConnection>) -> Runner {
  let conn: Arc<dyn Connection> = conn;
  Runner::new(Some(conn), Arc::new(Host::new("node1", "10.0.0.1")), 0)
}

#[tokio::test]
async fn scp_skips_identical_content() {
  setup_tracing();
  let dir = tempfile::tempdir().unwrap();
  let local = dir.path().join("kubeadm.yaml");
  std::fs::write(&local, b"kind: ClusterConfiguration\n").unwrap();

  let conn = Arc::new(MockConnection::new("node1"));
  let runner = runner_on(conn.clone());

  let first = runner.scp(&local, "/etc/kubernetes/kubeadm.yaml").await.unwrap();
  assert_eq!(first, TransferReport { transferred: 1, skipped: 0 });
  assert!(conn.dirs.lock().contains("/etc/kubernetes"));

  let second = runner.scp(&local, "/etc/kubernetes/kubeadm.yaml").await.unwrap();
  assert_eq!(second, TransferReport { transferred: 0, skipped: 1 });
  assert_eq!(conn.uploads.load(Ordering::SeqCst), 1);

  std::fs::write(&local, b"kind: ClusterConfiguration\nversion: 2\n").unwrap();
  let third = runner.scp(&local, "/etc/kubernetes/kubeadm.yaml").await.unwrap();
  assert_eq!(third.transferred, 1);
  assert_eq!(conn.uploads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn scp_copies_directory_trees() {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path().join("addons");
  std::fs::create_dir_all(root.join("calico/crds")).unwrap();
  std::fs::write(root.join("calico/calico.yaml"), b"calico").unwrap();
  std::fs::write(root.join("calico/crds/ippool.yaml"), b"ippool").unwrap();
  std::fs::write(root.join("coredns.yaml"), b"coredns").unwrap();
  std::fs::create_dir_all(dir.path().join("empty/nested")).unwrap();

  let conn = Arc::new(MockConnection::new("node1"));
  let runner = runner_on(conn.clone());

  let report = runner.scp(&root, "/opt/addons").await.unwrap();
  assert_eq!(report.transferred, 3);
  assert_eq!(conn.file("/opt/addons/calico/crds/ippool.yaml").as_deref(), Some(&b"ippool"[..]));
  assert_eq!(conn.file("/opt/addons/coredns.yaml").as_deref(), Some(&b"coredns"[..]));
  assert!(conn.dirs.lock().contains("/opt/addons/calico/crds"));

  let empty = runner.scp(dir.path().join("empty"), "/opt/empty").await.unwrap();
  assert_eq!(empty, TransferReport::default());
  assert!(!conn.dirs.lock().contains("/opt/empty"));

  let deep = dir.path().join("manifests");
  std::fs::create_dir_all(deep.join("a/b/c")).unwrap();
  std::fs::write(deep.join("a/b/c/only.yaml"), b"only").unwrap();
  let report = runner.scp(&deep, "/opt/manifests").await.unwrap();
  assert_eq!(report.transferred, 1);
  assert_eq!(conn.file("/opt/manifests/a/b/c/only.yaml").as_deref(), Some(&b"only"[..]));
}

#[tokio::test]
async fn scp_reports_corrupted_transfers() {
  let dir = tempfile::tempdir().unwrap();
  let local = dir.path().join("etcd.env");
  std::fs::write(&local, b"ETCD_NAME=etcd-node1").unwrap();

  let conn = Arc::new(MockConnection::corrupting("node1"));
  let err = runner_on(conn).scp(&local, "/etc/etcd.env").await.unwrap_err();
  match err {
    ForgeError::ChecksumMismatch { path, local, remote } => {
      assert_eq!(path, "/etc/etcd.env");
      assert_eq!(local, sha256_hex(b"ETCD_NAME=etcd-node1"));
      assert_ne!(local, remote);
    }
    other => panic!("expected ChecksumMismatch, got {:?}", other),
  }
}

#[tokio::test]
async fn sudo_scp_stages_then_moves_into_place() {
  let dir = tempfile::tempdir().unwrap();
  let local = dir.path().join("kubelet.service");
  std::fs::write(&local, b"[Unit]").unwrap();

  let conn = Arc::new(MockConnection::new("node1"));
  let runner = runner_on(conn.clone()).with_tmp_dir("/tmp/stage");
  runner.sudo_scp(&local, "/etc/systemd/system/kubelet.service").await.unwrap();

  assert!(conn.file("/tmp/stage/etc/systemd/system/kubelet.service").is_some());
  let commands = conn.commands();
  assert!(commands.iter().any(|c| c.starts_with("sudo -E /bin/bash -c") && c.contains("cp -r -f")));
  assert!(commands.iter().any(|c| c.contains("rm -rf")));
}

#[tokio::test]
async fn exec_surfaces_exit_code_and_output() {
  let conn = Arc::new(MockConnection::new("node1"));
  conn.respond("hostname", "node1", 0);
  conn.respond("systemctl is-active docker", "inactive", 3);
  let runner = runner_on(conn.clone());

  assert_eq!(runner.cmd("hostname", false).await.unwrap(), "node1");

  let err = runner.sudo_cmd("systemctl is-active docker", false).await.unwrap_err();
  match err {
    ForgeError::CommandFailed { host, exit_code, stdout, command, .. } => {
      assert_eq!(host, "node1");
      assert_eq!(exit_code, 3);
      assert_eq!(stdout, "inactive");
      assert!(command.starts_with("sudo -E /bin/bash -c"));
    }
    other => panic!("expected CommandFailed, got {:?}", other),
  }
}

#[tokio::test]
async fn fetch_creates_local_directories() {
  let dir = tempfile::tempdir().unwrap();
  let conn = Arc::new(MockConnection::new("node1"));
  conn.put_file("/etc/kubernetes/admin.conf", b"apiVersion: v1");
  let runner = runner_on(conn);

  let target = dir.path().join("node1/kube/admin.conf");
  runner.fetch(&target, "/etc/kubernetes/admin.conf").await.unwrap();
  assert_eq!(std::fs::read(&target).unwrap(), b"apiVersion: v1");

  let missing = runner.fetch(dir.path().join("x"), "/nope").await.unwrap_err();
  assert!(matches!(missing, ForgeError::CommandFailed { .. }));
}

#[tokio::test]
async fn runner_without_connection_reports_it() {
  let runner = Runner::new(None, Arc::new(Host::new("node9", "10.0.0.9")), 0);
  let err = runner.cmd("true", false).await.unwrap_err();
  assert!(matches!(err, ForgeError::NoConnection { ref host } if host == "node9"));
  assert!(err.is_connection_error());
}

#[tokio::test]
async fn dialer_pools_one_connection_per_host() {
  let fx = fixture(&["node1", "node2"]);
  let dialer = Dialer::new(fx.connector.clone());
  let hosts = fx.runtime.all_hosts();

  let a = dialer.connect(&hosts[0]).await.unwrap();
  let b = dialer.connect(&hosts[0]).await.unwrap();
  assert!(Arc::ptr_eq(&a, &b));
  dialer.connect(&hosts[1]).await.unwrap();
  assert_eq!(fx.connector.dial_count(), 2);
  assert_eq!(dialer.len(), 2);

  dialer.close(&hosts[0]).await.unwrap();
  assert!(!dialer.is_connected(hosts[0].index()));
  assert!(fx.connector.connection("node1").unwrap().closed.load(Ordering::SeqCst));

  dialer.connect(&hosts[0]).await.unwrap();
  assert_eq!(fx.connector.dial_count(), 3);

  dialer.close_all().await;
  assert!(dialer.is_empty());
  assert!(fx.connector.connection("node2").unwrap().closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn closing_during_a_dial_keeps_the_connection_pooled() {
  let fx = fixture(&["node1"]);
  fx.connector.slow_dials(Duration::from_secs(1));
  let dialer = Arc::new(Dialer::new(fx.connector.clone()));
  let host = fx.runtime.all_hosts().remove(0);

  let dialing = {
    let dialer = dialer.clone();
    let host = host.clone();
    tokio::spawn(async move { dialer.connect(&host).await })
  };
  while fx.connector.dial_count() == 0 {
    tokio::task::yield_now().await;
  }

  dialer.close(&host).await.unwrap();
  let conn = dialing.await.unwrap().unwrap();
  assert!(dialer.is_connected(host.index()));
  assert_eq!(dialer.len(), 1);

  let again = dialer.connect(&host).await.unwrap();
  assert!(Arc::ptr_eq(&conn, &again));
  assert_eq!(fx.connector.dial_count(), 1);

  dialer.close_all().await;
  assert!(dialer.is_empty());
  assert!(fx.connector.connection("node1").unwrap().closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_dials_are_not_remembered() {
  let fx = fixture(&["node1"]);
  fx.connector.make_unreachable("node1");
  let dialer = Dialer::new(fx.connector.clone());
  let host = fx.runtime.all_hosts().remove(0);

  let err = dialer.connect(&host).await.err().expect("expected connect to fail");
  assert!(err.is_connection_error());
  assert!(dialer.is_empty());

  fx.connector.unreachable.lock().clear();
  dialer.connect(&host).await.unwrap();
  assert_eq!(fx.connector.dial_count(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn local_connection_runs_commands_and_moves_files() {
  let dir = tempfile::tempdir().unwrap();
  let conn = LocalConnection::new();

  let out = conn.exec("echo forge; echo oops >&2; exit 4").await.unwrap();
  assert_eq!(out.stdout, "forge");
  assert_eq!(out.stderr.trim(), "oops");
  assert_eq!(out.code, 4);

  let path = dir.path().join("a/b/c.txt");
  let path = path.to_str().unwrap();
  conn.upload(b"hello", path, 0o600).await.unwrap();
  assert_eq!(conn.download(path).await.unwrap(), b"hello");
  assert_eq!(conn.file_sha256(path).await.unwrap(), Some(sha256_hex(b"hello")));
  assert_eq!(conn.file_sha256("/definitely/not/here").await.unwrap(), None);
}
