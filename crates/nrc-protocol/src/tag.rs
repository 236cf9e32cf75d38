//! Event tags: ordered labeled tuples of strings.

use serde::{Deserialize, Serialize};

/// One tag: element 0 is the name (`e`, `p`, `relay`, `challenge`, …), the
/// rest are its values.  A well-formed tag has at least one element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// The tag name, or `""` for a degenerate empty tag.
    pub fn name(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// The first value (element 1).
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// True when the name matches and `value` appears among elements 1…
    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.name() == name && self.0[1..].iter().any(|v| v == value)
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The ordered tag list of an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new<I>(tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        Self(tags.into_iter().collect())
    }

    pub fn push(&mut self, tag: Tag) {
        self.0.push(tag);
    }

    /// True when some tag named `name` carries any of `values`.
    pub fn contains_any<S: AsRef<str>>(&self, name: &str, values: &[S]) -> bool {
        self.0
            .iter()
            .any(|t| values.iter().any(|v| t.contains(name, v.as_ref())))
    }

    /// The first tag with the given name.
    pub fn first_by_name(&self, name: &str) -> Option<&Tag> {
        self.0.iter().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
