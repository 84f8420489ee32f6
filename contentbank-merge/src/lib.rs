//! Duplicate-entry merge engine for the content bank.
//!
//! Given one entity of a strict duplicate group, the engine picks a canonical
//! entry, rewrites every pointer to the other entries scattered across
//! external tables, verifies that nothing still points at them, and only then
//! deletes them, all inside one transaction.
//!
//! # Components
//!
//! - **Catalog** ([`catalog`]): which tables/columns may hold pointers
//!   (whitelist plus opt-in discovery over a schema snapshot)
//! - **Impact** ([`impact`]): how many rows still reference ids being merged away
//! - **Planner** ([`PlanBuilder`]): read-only construction of a [`MergePlan`]
//! - **Applier** ([`MergeApplier`]): rewrite → post-check → delete → commit
//! - **Lock** ([`LockCoordinator`]): best-effort advisory lock around an apply
//!
//! # Example
//!
//! ```
//! use contentbank_merge::{MergeConfig, MergeEngine};
//! use contentbank_model::MergeOptions;
//! use contentbank_store::{ContentStore, NewEntity};
//!
//! let store = ContentStore::open_in_memory().unwrap();
//! let category = store.create_category("Default", 1).unwrap();
//! let item = NewEntity::html("choice", "Capital", "<p>Capital of France?</p>");
//! let (_, first) = store.create_item(category, &item).unwrap();
//! store.create_item(category, &item).unwrap();
//!
//! let engine = MergeEngine::new(&store, MergeConfig::default());
//! let options = MergeOptions::default();
//! let plan = engine.build_merge_plan(first, &options);
//! assert!(plan.errors.is_empty());
//!
//! let outcome = engine.apply_merge_plan(&plan, &options);
//! assert!(outcome.success, "{}", outcome.message);
//! ```

mod applier;
pub mod catalog;
mod config;
mod engine;
mod error;
pub mod impact;
mod lock;
mod planner;
mod rewrite;

pub use applier::MergeApplier;
pub use catalog::SchemaSnapshot;
pub use config::{DiscoveryPolicy, MergeConfig, WhitelistColumn, WhitelistEntry};
pub use engine::MergeEngine;
pub use error::{MergeError, MergeResult};
pub use lock::{LockCoordinator, LockStatus};
pub use planner::{PlanBuilder, choose_canonical, current_version};
