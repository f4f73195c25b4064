//! Energization-state propagation.
//!
//! [`Propagator`] applies one field change for a batch of devices to the
//! adjacent edges and buses. [`ChangeTriggers`] decides, per device mutation,
//! which batches to run.

pub mod engine;
pub mod triggers;

pub use engine::{BusOutcome, PropagationError, PropagationReport, Propagator, Stage};
pub use triggers::{plan_create, plan_import, plan_update, Batch, ChangeTriggers, Mutation, TriggerSummary};
