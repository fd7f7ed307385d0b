// tests/runtime_tests.rs
mod common;
use common::*;
use kubeforge::{role, ActionFn, Cache, ForgeError, Host, RemoteTask, Runtime, Task};

#[test]
fn build_prepares_the_work_dir() {
  let fx = fixture(&["node1", "node2"]);
  let root = fx.work_dir.path().join("kubeforge");
  assert_eq!(fx.runtime.work_dir(), root.as_path());
  assert!(root.join("logs").is_dir());
  assert!(root.join("node1").is_dir());
  assert!(root.join("node2").is_dir());

  let indexes: Vec<usize> = fx.runtime.all_hosts().iter().map(|h| h.index()).collect();
  assert_eq!(indexes, vec![0, 1]);
  assert!(fx.runtime.local_host().is_localhost());
}

#[test]
fn host_names_must_be_unique_and_present() {
  let dir = tempfile::tempdir().unwrap();
  let duplicate = Runtime::builder("dup")
    .work_dir(dir.path())
    .hosts(hosts(&["node1", "node1"]))
    .connector(MockConnector::new())
    .build();
  assert!(matches!(duplicate, Err(ForgeError::InvalidConfig { ref message }) if message.contains("node1")));

  let unnamed = Runtime::builder("unnamed")
    .work_dir(dir.path())
    .host(Host::new("", "10.0.0.1"))
    .connector(MockConnector::new())
    .build();
  assert!(matches!(unnamed, Err(ForgeError::InvalidConfig { .. })));
}

#[test]
fn deleted_hosts_leave_every_role() {
  let fx = fixture_with(
    vec![
      Host::new("master1", "10.0.0.1").with_roles([role::CONTROL_PLANE, role::ETCD]),
      Host::new("worker1", "10.0.0.2").with_role(role::WORKER),
    ],
    false,
  );
  assert_eq!(fx.runtime.hosts_by_role(role::ETCD).len(), 1);
  assert!(fx.runtime.hosts_by_role(role::REGISTRY).is_empty());

  let master = fx.runtime.hosts_by_role(role::CONTROL_PLANE).remove(0);
  fx.runtime.delete_host(&master);
  assert!(fx.runtime.hosts_by_role(role::CONTROL_PLANE).is_empty());
  assert!(fx.runtime.hosts_by_role(role::ETCD).is_empty());
  assert_eq!(fx.runtime.host_count(), 1);
  assert!(fx.runtime.host_is_deprecated("master1"));
  assert!(!fx.runtime.host_is_deprecated("worker1"));
}

#[test]
fn runtime_without_a_runner_reports_it() {
  let fx = fixture(&["node1"]);
  assert!(matches!(fx.runtime.runner(), Err(ForgeError::NotInitialized { .. })));
  assert!(fx.runtime.remote_host().is_err());
  assert!(matches!(fx.runtime.extension::<String>(), Err(ForgeError::NotInitialized { .. })));
}

#[tokio::test]
async fn host_copies_see_their_own_host() {
  let fx = fixture(&["node1", "node2"]);
  let seen = EventLog::default();
  let sink = seen.clone();

  let mut task = RemoteTask::new("WhoAmI")
    .all_hosts()
    .parallel(true)
    .action(ActionFn::new(move |rt| {
      let sink = sink.clone();
      async move {
        let dir = rt.host_work_dir()?;
        let runner = rt.runner()?;
        sink.push(format!(
          "{}:{}:{}",
          runner.host().name(),
          runner.index(),
          dir.file_name().and_then(|n| n.to_str()).unwrap_or_default()
        ));
        assert!(!rt.is_cancelled());
        Ok(())
      }
    }));
  task.init(fx.runtime.clone(), Cache::new(), Cache::new()).unwrap();
  task.execute().await;

  let mut entries = seen.entries();
  entries.sort();
  assert_eq!(entries, vec!["node1:0:node1", "node2:1:node2"]);
  // The shared runtime itself never gets bound to a host.
  assert!(fx.runtime.runner().is_err());
}
