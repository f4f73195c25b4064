use itertools::Itertools;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use super::engine::Propagator;
use crate::domain::{Device, DevicePatch, EnergizeField, Subject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Mutation {
    Create,
    Update,
    Import,
}

const ALL_FIELDS: &[EnergizeField] = &[EnergizeField::Energized, EnergizeField::EnergizedToday];
const ENERGIZED_ONLY: &[EnergizeField] = &[EnergizeField::Energized];

/// Fields whose direct edits on a `subject` row start a propagation.
///
/// Panels are sources for both fields on every path. Breakers, bus breakers
/// and transformers only drive `energized`, and only when edited directly.
pub fn source_fields(subject: Subject, mutation: Mutation) -> &'static [EnergizeField] {
    match (subject, mutation) {
        (Subject::Panel, _) => ALL_FIELDS,
        (Subject::Breaker | Subject::BusBreaker | Subject::Transformer, Mutation::Update) => {
            ENERGIZED_ONLY
        }
        _ => &[],
    }
}

/// One `propagate` call: a field, a uniform value, and the ids it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub field: EnergizeField,
    pub value: bool,
    pub ids: Vec<String>,
}

pub fn plan_create(device: &Device) -> Vec<Batch> {
    let Some(subject) = device.kind() else {
        return Vec::new();
    };
    source_fields(subject, Mutation::Create)
        .iter()
        .map(|&field| Batch {
            field,
            value: field.get(device),
            ids: vec![device.id.clone()],
        })
        .collect()
}

/// `device` is the stored row; only fields present in `patch` are planned.
pub fn plan_update(device: &Device, patch: &DevicePatch) -> Vec<Batch> {
    let Some(subject) = device.kind() else {
        return Vec::new();
    };
    source_fields(subject, Mutation::Update)
        .iter()
        .filter_map(|&field| {
            patch.field(field).map(|value| Batch {
                field,
                value,
                ids: vec![device.id.clone()],
            })
        })
        .collect()
}

/// Splits source rows into at most one batch per (field, value) pair.
/// When an id repeats, its last row wins, matching the upsert.
pub fn plan_import(devices: &[Device]) -> Vec<Batch> {
    let latest: Vec<&Device> = devices
        .iter()
        .rev()
        .unique_by(|d| d.id.clone())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut batches = Vec::new();
    for field in EnergizeField::iter() {
        let sources: Vec<&Device> = latest
            .iter()
            .copied()
            .filter(|d| {
                d.kind()
                    .is_some_and(|s| source_fields(s, Mutation::Import).contains(&field))
            })
            .collect();
        for value in [true, false] {
            let ids: Vec<String> = sources
                .iter()
                .filter(|d| field.get(d) == value)
                .map(|d| d.id.clone())
                .collect();
            if !ids.is_empty() {
                batches.push(Batch { field, value, ids });
            }
        }
    }
    batches
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerSummary {
    pub invocations: usize,
    pub failures: usize,
    pub buses_updated: usize,
}

/// Runs propagation after a device mutation has been committed.
///
/// Outcomes are advisory: failures are logged and counted, never returned,
/// so the caller's own write is never undone or reported as failed.
#[derive(Clone)]
pub struct ChangeTriggers {
    propagator: Propagator,
}

impl ChangeTriggers {
    pub fn new(propagator: Propagator) -> Self {
        Self { propagator }
    }

    pub async fn device_created(&self, device: &Device) -> TriggerSummary {
        self.run(Mutation::Create, plan_create(device)).await
    }

    pub async fn device_updated(&self, device: &Device, patch: &DevicePatch) -> TriggerSummary {
        self.run(Mutation::Update, plan_update(device, patch)).await
    }

    pub async fn devices_imported(&self, devices: &[Device]) -> TriggerSummary {
        self.run(Mutation::Import, plan_import(devices)).await
    }

    async fn run(&self, mutation: Mutation, batches: Vec<Batch>) -> TriggerSummary {
        let mut summary = TriggerSummary::default();
        if batches.is_empty() {
            debug!(%mutation, "no propagation sources in mutation");
            return summary;
        }

        for batch in batches {
            summary.invocations += 1;
            match self
                .propagator
                .propagate(batch.field, &batch.ids, batch.value)
                .await
            {
                Ok(report) => summary.buses_updated += report.buses.len(),
                Err(e) => {
                    summary.failures += 1;
                    warn!(
                        %mutation,
                        field = %batch.field,
                        value = batch.value,
                        devices = batch.ids.len(),
                        error = %e,
                        "energization propagation failed"
                    );
                }
            }
        }
        summary
    }
}
