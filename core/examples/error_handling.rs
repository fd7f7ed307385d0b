// kubeforge/examples/error_handling.rs

use kubeforge::{
  role, ActionFn, EngineConfig, ForgeError, Host, LocalTask, Pipeline, RemoteTask, RollbackFn, Runtime, TaskModule,
};
use std::error::Error as _;
use std::time::Duration;
use tracing::{error, info, warn};

// Demonstrates how failures surface: the nested error returned by `Pipeline::start`
// for an unreachable host, then a retried action with a rollback.
#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Error Handling Example ---");

  let config = EngineConfig {
    retry_delay: Duration::from_millis(200),
    connect_timeout: Duration::from_secs(2),
    ..EngineConfig::default()
  };
  // Nothing listens on port 1, so dialing fails fast.
  let runtime = match Runtime::builder("errors")
    .config(config)
    .work_dir(std::env::temp_dir().join("kubeforge-errors"))
    .host(Host::new("ghost", "127.0.0.1").with_port(1).with_password("x").with_role(role::WORKER))
    .build()
  {
    Ok(rt) => rt,
    Err(e) => {
      error!("runtime setup failed: {}", e);
      return;
    }
  };

  let remote = TaskModule::new("RemoteModule").task(
    RemoteTask::new("Ping")
      .role(role::WORKER)
      .action(ActionFn::new(|rt| async move {
        rt.runner()?.cmd("true", false).await?;
        Ok(())
      })),
  );

  let mut pipeline = Pipeline::new("ErrorPipeline", runtime).with_module(remote);

  match pipeline.start().await {
    Ok(()) => info!("pipeline unexpectedly succeeded"),
    Err(e) => {
      error!("pipeline failed: {}", e);
      let mut source = e.source();
      while let Some(cause) = source {
        error!("  caused by: {}", cause);
        source = cause.source();
      }
      if let ForgeError::PipelineFailed { source, .. } = &e {
        if let ForgeError::ModuleFailed { module, .. } = source.as_ref() {
          info!("first failed module: {}", module);
        }
      }
    }
  }

  // The flaky module on its own: retried twice, then rolled back.
  let runtime = Runtime::builder("flaky")
    .work_dir(std::env::temp_dir().join("kubeforge-flaky"))
    .config(EngineConfig {
      retry_delay: Duration::from_millis(200),
      ..EngineConfig::default()
    })
    .build();
  if let Ok(runtime) = runtime {
    let mut pipeline = Pipeline::new("FlakyPipeline", runtime).with_module(
      TaskModule::new("FlakyModule").task(
        LocalTask::new("Flaky")
          .retry(2)
          .action(ActionFn::new(|_rt| async { anyhow::bail!("simulated failure") }))
          .rollback(RollbackFn::new(|_rt, failed| async move {
            warn!("rolling back after {}", failed.status);
            Ok(())
          })),
      ),
    );
    if let Err(e) = pipeline.start().await {
      error!("{}", e);
    }
  }

  info!("--- Error Handling Example Complete ---");
}
