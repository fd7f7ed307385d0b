// kubeforge/src/core/mod.rs

//! The contracts collaborators plug into the engine, and the records it produces.

pub mod action;
pub mod prepare;
pub mod result;
pub mod retry;
pub mod rollback;

pub use action::{Action, ActionFn, ShellAction};
pub use prepare::{AlwaysRun, CacheFlag, CacheScope, FirstOfRole, HasRole, Not, Prepare, PrepareCollection, PrepareFn, Verdict};
pub use result::{ActionResult, ModuleResult, ResultStatus, TaskResult};
pub use retry::RetryPolicy;
pub use rollback::{Rollback, RollbackFn};
