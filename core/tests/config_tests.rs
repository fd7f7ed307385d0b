// tests/config_tests.rs
mod common;
use common::*;
use kubeforge::{EngineConfig, ForgeError};
use serial_test::serial;
use std::collections::HashMap;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
  let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
  move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_when_nothing_is_set() {
  let config = EngineConfig::from_lookup(|_| None).unwrap();
  assert_eq!(config, EngineConfig::default());
  assert_eq!(config.task_timeout, Duration::from_secs(2 * 60 * 60));
  assert_eq!(config.retry_delay, Duration::from_secs(5));
  assert_eq!(config.remote_retries, 3);
  assert_eq!(config.local_retries, 1);
  assert_eq!(config.concurrency, 1.0);
  assert_eq!(config.ssh_port, 22);
}

#[test]
fn variables_override_defaults() {
  let config = EngineConfig::from_lookup(lookup(&[
    ("KUBEFORGE_TASK_TIMEOUT_SECS", "600"),
    ("KUBEFORGE_RETRY_DELAY_SECS", "0"),
    ("KUBEFORGE_REMOTE_RETRIES", " 5 "),
    ("KUBEFORGE_CONCURRENCY", "0.5"),
    ("KUBEFORGE_SSH_PORT", "2222"),
    ("KUBEFORGE_TMP_DIR", "/var/tmp/forge"),
  ]))
  .unwrap();

  assert_eq!(config.task_timeout, Duration::from_secs(600));
  assert_eq!(config.retry_delay, Duration::ZERO);
  assert_eq!(config.remote_retries, 5);
  assert_eq!(config.local_retries, 1);
  assert_eq!(config.concurrency, 0.5);
  assert_eq!(config.ssh_port, 2222);
  assert_eq!(config.tmp_dir, "/var/tmp/forge");
}

#[test]
fn invalid_values_are_rejected() {
  let cases = [
    ("KUBEFORGE_TASK_TIMEOUT_SECS", "soon"),
    ("KUBEFORGE_TASK_TIMEOUT_SECS", "0"),
    ("KUBEFORGE_REMOTE_RETRIES", "-1"),
    ("KUBEFORGE_CONCURRENCY", "0"),
    ("KUBEFORGE_CONCURRENCY", "1.5"),
    ("KUBEFORGE_SSH_PORT", "70000"),
    ("KUBEFORGE_TMP_DIR", "  "),
  ];
  for (key, value) in cases {
    match EngineConfig::from_lookup(lookup(&[(key, value)])) {
      Err(ForgeError::InvalidConfig { message }) => assert!(message.contains(key), "{}: {}", key, message),
      other => panic!("{}={} should be rejected, got {:?}", key, value, other),
    }
  }
}

#[test]
#[serial]
fn from_env_reads_process_variables() {
  setup_tracing();
  std::env::set_var("KUBEFORGE_LOCAL_RETRIES", "2");
  std::env::set_var("KUBEFORGE_CONNECT_TIMEOUT_SECS", "15");
  let config = EngineConfig::from_env();
  std::env::remove_var("KUBEFORGE_LOCAL_RETRIES");
  std::env::remove_var("KUBEFORGE_CONNECT_TIMEOUT_SECS");

  let config = config.unwrap();
  assert_eq!(config.local_retries, 2);
  assert_eq!(config.connect_timeout, Duration::from_secs(15));
}

#[test]
#[serial]
fn from_env_surfaces_bad_variables() {
  std::env::set_var("KUBEFORGE_SSH_PORT", "ssh");
  let result = EngineConfig::from_env();
  std::env::remove_var("KUBEFORGE_SSH_PORT");
  assert!(matches!(result, Err(ForgeError::InvalidConfig { .. })));
}
