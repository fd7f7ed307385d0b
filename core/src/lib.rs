// kubeforge/src/lib.rs

//! Kubeforge: an async task-orchestration engine for driving fleets of hosts over SSH.
//!
//! Work is organised in three levels:
//!  - A [`Pipeline`] is one end-to-end operation (create a cluster, add nodes, upgrade).
//!  - A [`Module`] is one phase of it: an ordered list of tasks, optionally looped.
//!  - A task ([`RemoteTask`] or [`LocalTask`]) binds a [`Prepare`], an [`Action`] and an
//!    optional [`Rollback`] to target hosts, with retry, delay, timeout and bounded
//!    per-host concurrency.
//!
//! Actions reach the current host through the [`Runner`] bound to their [`Runtime`],
//! and pass facts to later tasks through three [`Cache`] scopes: per host, per module
//! and per pipeline.
//!
//! ```no_run
//! use kubeforge::{role, ActionFn, EngineConfig, Host, Pipeline, RemoteTask, Runtime, TaskModule};
//!
//! # async fn demo() -> kubeforge::ForgeResult<()> {
//! let runtime = Runtime::builder("create-cluster")
//!   .config(EngineConfig::from_env()?)
//!   .host(Host::new("node1", "192.168.0.2").with_password("secret").with_role(role::WORKER))
//!   .build()?;
//!
//! let greet = TaskModule::new("GreetingModule").desc("Greet every worker").task(
//!   RemoteTask::new("Greet")
//!     .role(role::WORKER)
//!     .parallel(true)
//!     .action(ActionFn::new(|rt| async move {
//!       rt.runner()?.cmd("echo hello", true).await?;
//!       Ok(())
//!     })),
//! );
//!
//! let mut pipeline = Pipeline::new("CreateClusterPipeline", runtime).with_module(greet);
//! pipeline.start().await
//! # }
//! ```
//!
//! Collaborator code returns `anyhow::Result`; the engine reports [`ForgeError`].
//! Logging goes through `tracing`; installing a subscriber is up to the caller.

pub mod cache;
pub mod config;
pub mod connector;
pub mod core;
pub mod error;
pub mod module;
pub mod pipeline;
pub mod runtime;
pub mod task;
pub mod util;

// --- Re-exports for the Public API ---

pub use crate::cache::{Cache, CacheKey};
pub use crate::config::EngineConfig;
pub use crate::connector::{role, Connection, Connector, Dialer, ExecOutput, Host, LocalConnection, Runner, SshConfig, SshConnector, LOCAL_HOST};
pub use crate::core::{
  Action, ActionFn, ActionResult, AlwaysRun, CacheFlag, CacheScope, FirstOfRole, HasRole, ModuleResult, Not, Prepare,
  PrepareCollection, PrepareFn, ResultStatus, RetryPolicy, Rollback, RollbackFn, ShellAction, TaskResult, Verdict,
};
pub use crate::error::{ForgeError, ForgeResult};
pub use crate::module::{execute_tasks, run_module, Module, ModuleBase, ModuleOutcome, PostHook, PostHookFn, TaskModule};
pub use crate::pipeline::Pipeline;
pub use crate::runtime::{Runtime, RuntimeBuilder};
pub use crate::task::{LocalTask, RemoteTask, Task, TaskKind};
