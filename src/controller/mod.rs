//! # Controller
//!
//! Reconciliation core for Module and ModuleAction resources.
//!
//! ## Sub-modules
//!
//! - `dispatcher` - one reconcile pass: fetch, finalizer gate, action selection
//! - `state_machine` - the fixed lifecycle step sequence
//! - `handler` - per-action handlers and the handler SPI
//! - `tracker` - in-memory lifecycle progress per resource generation
//! - `conditions` - `Ready` condition history and messages
//! - `selection` - lifecycle action selection and version comparison
//! - `actual_state` - release state as seen by Helm
//! - `finalizer` - finalizer add/remove
//! - `status` - status and resource persistence
//! - `predicates` - module class filtering
//! - `watches` - value-source fan-in to owning Modules
//! - `result` - step outcome type
//! - `error` - errors handed back to kube-runtime
//! - `server` - metrics and health endpoints

pub mod actual_state;
pub mod conditions;
pub mod dispatcher;
pub mod error;
pub mod finalizer;
pub mod handler;
pub mod predicates;
pub mod result;
pub mod selection;
pub mod server;
pub mod state_machine;
pub mod status;
pub mod tracker;
pub mod watches;

pub use dispatcher::{reconcile, Reconciler};
pub use error::ReconcilerError;
pub use result::ReconcileResult;
