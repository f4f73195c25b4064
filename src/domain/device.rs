use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{field::EnergizeField, subject::Subject};

/// A row of the device relation. Nodes (panels, buses, ...) and edges
/// (`PolyLine`) share the same shape; `from`/`to` are only set on edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Device {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub file_page: i32,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub rect_px: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_points_px: Option<serde_json::Value>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub energized: bool,
    #[serde(default)]
    pub energized_today: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub will_energized_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project: String::new(),
            file_page: 0,
            subject: subject.into(),
            rect_px: Vec::new(),
            polygon_points_px: None,
            text: String::new(),
            comments: String::new(),
            energized: false,
            energized_today: false,
            from: None,
            to: None,
            will_energized_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An edge row connecting `from` to `to`.
    pub fn edge(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut edge = Self::new(id, Subject::PolyLine.canonical_tag());
        edge.from = Some(from.into());
        edge.to = Some(to.into());
        edge
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_field(mut self, field: EnergizeField, value: bool) -> Self {
        field.set(&mut self, value);
        self
    }

    pub fn kind(&self) -> Option<Subject> {
        Subject::from_tag(&self.subject)
    }

    pub fn is_kind(&self, subject: Subject) -> bool {
        subject.tags().contains(&self.subject.as_str())
    }

    pub fn is_edge(&self) -> bool {
        self.is_kind(Subject::PolyLine)
    }
}

/// Field-level update. `None` means "not present in the request"; a present
/// `false` is a real write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePatch {
    pub text: Option<String>,
    pub comments: Option<String>,
    pub energized: Option<bool>,
    pub energized_today: Option<bool>,
    pub will_energized_at: Option<DateTime<Utc>>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.comments.is_none()
            && self.energized.is_none()
            && self.energized_today.is_none()
            && self.will_energized_at.is_none()
    }

    pub fn field(&self, field: EnergizeField) -> Option<bool> {
        match field {
            EnergizeField::Energized => self.energized,
            EnergizeField::EnergizedToday => self.energized_today,
        }
    }

    pub fn apply(&self, device: &mut Device) {
        if let Some(text) = &self.text {
            device.text = text.clone();
        }
        if let Some(comments) = &self.comments {
            device.comments = comments.clone();
        }
        if let Some(v) = self.energized {
            device.energized = v;
        }
        if let Some(v) = self.energized_today {
            device.energized_today = v;
        }
        if let Some(at) = self.will_energized_at {
            device.will_energized_at = Some(at);
        }
        device.updated_at = Utc::now();
    }
}

/// Filters for device listings. Every `Some` narrows the result.
#[derive(Debug, Clone, Default)]
pub struct DeviceQuery {
    pub project: Option<String>,
    pub subjects: Option<Vec<Subject>>,
    pub text_contains: Option<String>,
    pub file_page: Option<i32>,
}

impl DeviceQuery {
    pub fn matches(&self, device: &Device) -> bool {
        if let Some(project) = &self.project {
            if &device.project != project {
                return false;
            }
        }
        if let Some(subjects) = &self.subjects {
            if !subjects.iter().any(|s| device.is_kind(*s)) {
                return false;
            }
        }
        if let Some(needle) = &self.text_contains {
            if !device.text.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(page) = self.file_page {
            if device.file_page != page {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

impl PageRequest {
    /// Falls back to the default page when either value is out of range.
    pub fn checked(page: Option<u32>, size: Option<u32>, max_size: u32) -> Self {
        let page = page.unwrap_or(1);
        let size = size.unwrap_or(20);
        if page >= 1 && (1..=max_size).contains(&size) {
            Self { page, size }
        } else {
            Self::default()
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_apply_keeps_untouched_fields() {
        let mut device = Device::new("P1", "panel board").with_project("LAB25");
        device.text = "LAB25E".into();
        device.rect_px = vec![1, 2, 3, 4];

        let patch = DevicePatch {
            energized: Some(true),
            ..Default::default()
        };
        patch.apply(&mut device);

        assert!(device.energized);
        assert_eq!(device.text, "LAB25E");
        assert_eq!(device.rect_px, vec![1, 2, 3, 4]);
        assert_eq!(device.project, "LAB25");
    }

    #[test]
    fn test_patch_false_is_present() {
        let patch: DevicePatch = serde_json::from_str(r#"{"energized": false}"#).unwrap();
        assert!(!patch.is_empty());
        assert_eq!(patch.field(EnergizeField::Energized), Some(false));
        assert_eq!(patch.field(EnergizeField::EnergizedToday), None);
    }

    #[test]
    fn test_query_text_is_case_insensitive() {
        let mut device = Device::new("P1", "panel board");
        device.text = "LAB25E-PB1".into();
        let query = DeviceQuery {
            text_contains: Some("lab25e".into()),
            subjects: Some(vec![Subject::Panel]),
            ..Default::default()
        };
        assert!(query.matches(&device));
    }

    #[test]
    fn test_edge_shape_serialization() {
        let edge = Device::edge("E1", "BUS1", "P1");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["subject"], "PolyLine");
        assert_eq!(json["from"], "BUS1");

        let node = serde_json::to_value(Device::new("P1", "Panel")).unwrap();
        assert!(node.get("from").is_none());
    }

    #[test]
    fn test_page_checked_falls_back() {
        assert_eq!(PageRequest::checked(Some(2), Some(50), 1000), PageRequest { page: 2, size: 50 });
        assert_eq!(PageRequest::checked(Some(0), Some(50), 1000), PageRequest::default());
        assert_eq!(PageRequest::checked(Some(3), Some(201), 200), PageRequest::default());
        assert_eq!(PageRequest::checked(None, None, 1000), PageRequest::default());
    }

    #[test]
    fn test_id_length_validation() {
        assert!(Device::new("P1", "Panel").validate().is_ok());
        assert!(Device::new("", "Panel").validate().is_err());
        assert!(Device::new("x".repeat(65), "Panel").validate().is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(PageRequest { page: 1, size: 20 }.offset(), 0);
        assert_eq!(PageRequest { page: 3, size: 20 }.offset(), 40);
    }
}
