use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Device kind parsed from the free-form `subject` tag of a device row.
///
/// Drawings exported by different tools spell some tags differently, so each
/// kind owns every spelling it accepts. The first entry of [`Subject::tags`]
/// is the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
pub enum Subject {
    Panel,
    Bus,
    Breaker,
    BusBreaker,
    Transformer,
    Generator,
    PolyLine,
}

impl Subject {
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            Self::Panel => &["Panel", "panel board"],
            Self::Bus => &["Bus"],
            Self::Breaker => &["Breaker"],
            Self::BusBreaker => &["BusBreaker", "Bus Breaker"],
            Self::Transformer => &["Transformer", "transformer"],
            Self::Generator => &["Generator"],
            Self::PolyLine => &["PolyLine"],
        }
    }

    pub fn canonical_tag(self) -> &'static str {
        self.tags()[0]
    }

    /// Tags are matched exactly; unknown tags such as `ATS` yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::iter().find(|s| s.tags().contains(&tag))
    }

    pub fn is_edge(self) -> bool {
        matches!(self, Self::PolyLine)
    }

    /// Every tag string of the given kinds, for `subject IN (...)` filters.
    pub fn tags_of(subjects: &[Subject]) -> Vec<String> {
        subjects
            .iter()
            .flat_map(|s| s.tags().iter().map(|t| t.to_string()))
            .collect()
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("panel board", Some(Subject::Panel))]
    #[case("Panel", Some(Subject::Panel))]
    #[case("Bus Breaker", Some(Subject::BusBreaker))]
    #[case("BusBreaker", Some(Subject::BusBreaker))]
    #[case("transformer", Some(Subject::Transformer))]
    #[case("PolyLine", Some(Subject::PolyLine))]
    #[case("ATS", None)]
    #[case("bus", None)]
    fn test_from_tag(#[case] tag: &str, #[case] expected: Option<Subject>) {
        assert_eq!(Subject::from_tag(tag), expected);
    }

    #[test]
    fn test_tags_of_expands_aliases() {
        let tags = Subject::tags_of(&[Subject::Panel, Subject::Generator]);
        assert_eq!(tags, vec!["Panel", "panel board", "Generator"]);
    }

    #[test]
    fn test_only_polyline_is_edge() {
        assert!(Subject::PolyLine.is_edge());
        assert!(Subject::iter().filter(|s| s.is_edge()).count() == 1);
    }
}
