// tests/error_handling_tests.rs
mod common;
use common::*;
use kubeforge::{ActionFn, Cache, ForgeError, RemoteTask, Task};
use std::error::Error as _;
use std::time::Duration;

#[test]
fn timeout_errors_are_distinguishable() {
  let err = ForgeError::Timeout {
    task: "InitCluster".to_string(),
    host: "node1".to_string(),
    timeout: Duration::from_secs(2),
  };
  assert!(err.is_timeout());
  assert!(!err.is_connection_error());
  let text = err.to_string();
  assert!(text.contains("[InitCluster]"));
  assert!(text.contains("Timeout=2s"));

  let long = ForgeError::Timeout {
    task: "t".to_string(),
    host: "h".to_string(),
    timeout: Duration::from_secs(2 * 60 * 60),
  };
  assert!(long.to_string().ends_with("Timeout=2h"));
}

#[test]
fn connection_errors_are_grouped() {
  let errors = [
    ForgeError::Dial {
      host: "node1".into(),
      address: "10.0.0.1:22".into(),
      source: anyhow::anyhow!("refused"),
    },
    ForgeError::Auth {
      host: "node1".into(),
      user: "root".into(),
    },
    ForgeError::Transport {
      host: "node1".into(),
      source: anyhow::anyhow!("broken pipe"),
    },
    ForgeError::NoConnection { host: "node1".into() },
  ];
  for err in &errors {
    assert!(err.is_connection_error(), "{:?}", err);
    assert!(!err.is_timeout());
  }

  let not_connection = ForgeError::CommandFailed {
    host: "node1".into(),
    command: "false".into(),
    exit_code: 1,
    stdout: String::new(),
    stderr: String::new(),
  };
  assert!(!not_connection.is_connection_error());
}

#[test]
fn anyhow_wrapping_preserves_engine_errors() {
  let wrapped: anyhow::Error = ForgeError::NoConnection { host: "node3".into() }.into();
  assert!(matches!(ForgeError::from(wrapped), ForgeError::NoConnection { .. }));

  let foreign = anyhow::anyhow!("yaml: line 3: mapping values are not allowed");
  match ForgeError::from(foreign) {
    ForgeError::Extension { source } => assert!(source.to_string().starts_with("yaml:")),
    other => panic!("expected Extension, got {:?}", other),
  }
}

#[test]
fn nested_failures_keep_their_source_chain() {
  let err = ForgeError::PipelineFailed {
    pipeline: "CreateCluster".into(),
    source: Box::new(ForgeError::ModuleFailed {
      module: "InitKubernetes".into(),
      source: Box::new(ForgeError::TaskFailed {
        task: "KubeadmInit".into(),
        hosts: vec!["node1".into(), "node2".into()],
        message: "[node1] boom; [node2] boom".into(),
      }),
    }),
  };

  let module = err.source().expect("module error");
  assert!(module.to_string().starts_with("Module[InitKubernetes]"));
  let task = module.source().expect("task error");
  assert!(task.to_string().contains("node1, node2"));
  assert!(err.to_string().starts_with("Pipeline[CreateCluster] execute failed"));
}

#[tokio::test]
async fn errors_returned_by_actions_reach_the_result() {
  setup_tracing();
  let fx = fixture(&["node1"]);
  let mut task = RemoteTask::new("Upload")
    .all_hosts()
    .retry(1)
    .action(ActionFn::new(|rt| async move {
      let host = rt.remote_host()?;
      Err(
        ForgeError::NoConnection {
          host: host.name().to_string(),
        }
        .into(),
      )
    }));
  task.init(fx.runtime.clone(), Cache::new(), Cache::new()).unwrap();
  let result = task.execute().await;

  match result.host_result("node1").and_then(|r| r.error.as_deref()) {
    Some(ForgeError::ActionFailed { source, .. }) => {
      assert!(matches!(source.downcast_ref::<ForgeError>(), Some(ForgeError::NoConnection { .. })));
    }
    other => panic!("expected ActionFailed, got {:?}", other),
  }
}
