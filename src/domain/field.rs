use serde::{Deserialize, Serialize};

use super::device::Device;

/// Boolean device state that propagates through the diagram.
///
/// Both fields share one propagation algorithm; the variant selects the
/// column and the accessor it reads and writes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnergizeField {
    Energized,
    EnergizedToday,
}

struct FieldAccess {
    column: &'static str,
    get: fn(&Device) -> bool,
    get_mut: fn(&mut Device) -> &mut bool,
}

fn energized(d: &Device) -> bool {
    d.energized
}

fn energized_mut(d: &mut Device) -> &mut bool {
    &mut d.energized
}

fn energized_today(d: &Device) -> bool {
    d.energized_today
}

fn energized_today_mut(d: &mut Device) -> &mut bool {
    &mut d.energized_today
}

static ENERGIZED: FieldAccess = FieldAccess {
    column: "energized",
    get: energized,
    get_mut: energized_mut,
};

static ENERGIZED_TODAY: FieldAccess = FieldAccess {
    column: "energized_today",
    get: energized_today,
    get_mut: energized_today_mut,
};

impl EnergizeField {
    fn access(self) -> &'static FieldAccess {
        match self {
            Self::Energized => &ENERGIZED,
            Self::EnergizedToday => &ENERGIZED_TODAY,
        }
    }

    /// Storage column; always a static identifier, safe to splice into SQL.
    pub fn column(self) -> &'static str {
        self.access().column
    }

    pub fn get(self, device: &Device) -> bool {
        (self.access().get)(device)
    }

    pub fn set(self, device: &mut Device, value: bool) {
        *(self.access().get_mut)(device) = value;
    }
}
