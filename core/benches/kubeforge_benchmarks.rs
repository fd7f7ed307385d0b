use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kubeforge::{
  ActionFn, Cache, CacheKey, Connection, Connector, EngineConfig, ExecOutput, ForgeResult, Host, LocalTask, Pipeline,
  RemoteTask, Runtime, Task, TaskModule,
};
use std::sync::Arc;
use tokio::runtime::Runtime as TokioRuntime;

// --- A connector that answers instantly, so only engine overhead is measured ---
struct NullConnection;

#[async_trait]
impl Connection for NullConnection {
  async fn exec(&self, _cmd: &str) -> ForgeResult<ExecOutput> {
    Ok(ExecOutput::default())
  }

  async fn upload(&self, _data: &[u8], _remote: &str, _mode: u32) -> ForgeResult<()> {
    Ok(())
  }

  async fn download(&self, _remote: &str) -> ForgeResult<Vec<u8>> {
    Ok(Vec::new())
  }

  async fn close(&self) -> ForgeResult<()> {
    Ok(())
  }
}

struct NullConnector;

#[async_trait]
impl Connector for NullConnector {
  async fn connect(&self, _host: &Host) -> ForgeResult<Arc<dyn Connection>> {
    Ok(Arc::new(NullConnection))
  }
}

fn bench_runtime(hosts: usize) -> Runtime {
  let work_dir = std::env::temp_dir().join(format!("kubeforge-bench-{}", hosts));
  Runtime::builder("bench")
    .hosts((0..hosts).map(|i| Host::new(format!("node{}", i), format!("10.0.{}.{}", i / 250, i % 250 + 1))))
    .connector(Arc::new(NullConnector))
    .work_dir(work_dir)
    .config(EngineConfig::default())
    .build()
    .unwrap()
}

fn echo_task(parallel: bool) -> RemoteTask {
  RemoteTask::new("Echo")
    .all_hosts()
    .parallel(parallel)
    .action(ActionFn::new(|rt| async move {
      rt.runner()?.cmd("echo ok", false).await?;
      Ok(())
    }))
}

// --- Benchmark Functions ---
fn bench_remote_task_fan_out(c: &mut Criterion) {
  let mut group = c.benchmark_group("RemoteTaskFanOut");
  let rt = TokioRuntime::new().unwrap();

  for hosts in [1usize, 10, 50].iter() {
    let runtime = bench_runtime(*hosts);
    for parallel in [false, true] {
      group.throughput(Throughput::Elements(*hosts as u64));
      group.bench_with_input(
        BenchmarkId::new(if parallel { "parallel" } else { "serial" }, hosts),
        hosts,
        |b, _| {
          b.to_async(&rt).iter_batched(
            || {
              let mut task = echo_task(parallel);
              task.init(runtime.clone(), Cache::new(), Cache::new()).unwrap();
              task
            },
            |mut task| async move { criterion::black_box(task.execute().await.status) },
            criterion::BatchSize::SmallInput,
          );
        },
      );
    }
  }
  group.finish();
}

fn bench_local_pipeline(c: &mut Criterion) {
  let mut group = c.benchmark_group("LocalPipeline");
  let rt = TokioRuntime::new().unwrap();
  let runtime = bench_runtime(0);

  for modules in [1usize, 5, 20].iter() {
    group.throughput(Throughput::Elements(*modules as u64));
    group.bench_with_input(BenchmarkId::new("modules", modules), modules, |b, &modules| {
      b.to_async(&rt).iter_batched(
        || {
          let mut pipeline = Pipeline::new("bench", runtime.clone());
          for i in 0..modules {
            pipeline.push_module(Box::new(TaskModule::new(format!("Module{}", i)).task(
              LocalTask::new("Count").action(ActionFn::new(|rt| async move {
                let n = rt.pipeline_cache().get_must_int("n").unwrap_or(0);
                rt.pipeline_cache().set("n", n + 1);
                Ok(())
              })),
            )));
          }
          pipeline
        },
        |mut pipeline| async move { pipeline.start().await.unwrap() },
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

fn bench_cache_access(c: &mut Criterion) {
  const OS_FAMILY: CacheKey<String> = CacheKey::new("osFamily");
  let mut group = c.benchmark_group("CacheAccess");
  let cache = Cache::new();
  cache.set_typed(&OS_FAMILY, "debian".to_string());
  cache.set("ready", true);

  group.bench_function("get_typed", |b| {
    b.iter(|| criterion::black_box(cache.get_typed(&OS_FAMILY)))
  });
  group.bench_function("get_must_bool", |b| {
    b.iter(|| criterion::black_box(cache.get_must_bool("ready")))
  });
  group.bench_function("set", |b| {
    let mut n = 0i64;
    b.iter(|| {
      n += 1;
      cache.set("counter", n);
    })
  });
  group.finish();
}

criterion_group!(benches, bench_remote_task_fan_out, bench_local_pipeline, bench_cache_access);
criterion_main!(benches);
