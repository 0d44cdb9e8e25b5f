use serde::{Deserialize, Serialize};
use std::fmt;

/// How a selector value is interpreted when resolving an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Id,
    Css,
    #[serde(alias = "x_path")]
    Xpath,
    Name,
    Class,
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocatorKind::Id => "id",
            LocatorKind::Css => "css",
            LocatorKind::Xpath => "xpath",
            LocatorKind::Name => "name",
            LocatorKind::Class => "class",
        };
        f.write_str(label)
    }
}

/// A logical reference to one UI element.
///
/// Several descriptors may point at the same node; that is how fallback
/// chains are expressed (see [`CandidateList`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementDescriptor {
    #[serde(rename = "by")]
    pub kind: LocatorKind,
    pub value: String,
}

impl ElementDescriptor {
    pub fn new(kind: LocatorKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(LocatorKind::Id, value)
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(LocatorKind::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(LocatorKind::Xpath, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(LocatorKind::Name, value)
    }

    pub fn class(value: impl Into<String>) -> Self {
        Self::new(LocatorKind::Class, value)
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

/// Ordered alternatives for one logical target. Tried front to back, once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateList(Vec<ElementDescriptor>);

impl CandidateList {
    pub fn new(candidates: Vec<ElementDescriptor>) -> Self {
        Self(candidates)
    }

    pub fn single(descriptor: ElementDescriptor) -> Self {
        Self(vec![descriptor])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementDescriptor> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ElementDescriptor] {
        &self.0
    }
}

impl From<Vec<ElementDescriptor>> for CandidateList {
    fn from(candidates: Vec<ElementDescriptor>) -> Self {
        Self(candidates)
    }
}

impl FromIterator<ElementDescriptor> for CandidateList {
    fn from_iter<I: IntoIterator<Item = ElementDescriptor>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a ElementDescriptor;
    type IntoIter = std::slice::Iter<'a, ElementDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Mechanism used to perform an interaction.
///
/// `Native` goes through the driver's own click/keystroke simulation and
/// requires the element to be visible and enabled. `ScriptInjection` mutates
/// the DOM directly and only requires the element to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionChannel {
    Native,
    ScriptInjection,
}

impl fmt::Display for InteractionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionChannel::Native => f.write_str("native"),
            InteractionChannel::ScriptInjection => f.write_str("script"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_yaml_uses_by_key() {
        let yaml = "by: xpath\nvalue: //aside//nav\n";
        let descriptor: ElementDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor, ElementDescriptor::xpath("//aside//nav"));
        assert_eq!(descriptor.to_string(), "xpath=//aside//nav");
    }

    #[test]
    fn candidate_list_is_a_plain_sequence() {
        let yaml = "- by: id\n  value: data.fromDate\n- by: name\n  value: data.fromDate\n";
        let list: CandidateList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[1].kind, LocatorKind::Name);
    }

    #[test]
    fn channel_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&InteractionChannel::ScriptInjection).unwrap();
        assert_eq!(yaml.trim(), "script_injection");
    }
}
