// kubeforge/examples/basic_pipeline.rs

use kubeforge::{
  ActionFn, EngineConfig, ForgeResult, LocalTask, ModuleOutcome, Pipeline, PostHookFn, Runtime, ShellAction, TaskModule,
};
use tracing::info;

// Runs entirely on the local machine: every task is a LocalTask, so no SSH host is needed.
#[tokio::main]
async fn main() -> ForgeResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Pipeline Example ---");

  // 1. A runtime with no remote hosts and a throwaway work dir
  let work_dir = std::env::temp_dir().join("kubeforge-basic");
  let runtime = Runtime::builder("basic")
    .config(EngineConfig::from_env()?)
    .work_dir(&work_dir)
    .build()?;

  // 2. Gather a fact, then consume it from a later module through the pipeline cache
  let gather = TaskModule::new("GatherModule").desc("Collect local facts").task(
    LocalTask::new("KernelVersion")
      .desc("Read the kernel release")
      .action(ActionFn::new(|rt| async move {
        let release = rt.runner()?.cmd("uname -r", false).await?;
        rt.pipeline_cache().set("kernel", release);
        Ok(())
      })),
  );

  let report = TaskModule::new("ReportModule")
    .desc("Print what was collected")
    .task(LocalTask::new("Hostname").action(ShellAction::new("hostname").print_output()))
    .task(LocalTask::new("Summary").action(ActionFn::new(|rt| async move {
      let kernel = rt.pipeline_cache().get_must_string("kernel").unwrap_or_default();
      info!("kernel release: {}", kernel);
      Ok(())
    })));

  // 3. Assemble and run
  let mut pipeline = Pipeline::new("BasicPipeline", runtime)
    .with_module(gather)
    .with_module(report)
    .with_post_hook(PostHookFn::new(|_rt, outcome: ModuleOutcome| async move {
      info!("module {} finished: {}", outcome.module, outcome.status);
      Ok(())
    }));
  pipeline.start().await?;

  for result in pipeline.module_results() {
    info!("{} -> {} ({} task(s))", result.module, result.status, result.task_results.len());
  }
  info!("--- Basic Pipeline Example Complete ---");
  Ok(())
}
