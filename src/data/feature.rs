use super::osm::Tags;

/// Boolean test over an element's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPredicate {
    HasKey(String),
    Equals { key: String, value: String },
    OneOf { key: String, values: Vec<String> },
    /// Conjunction. An empty conjunction matches nothing.
    All(Vec<TagPredicate>),
}

impl TagPredicate {
    pub fn has_key(key: impl Into<String>) -> Self {
        TagPredicate::HasKey(key.into())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        TagPredicate::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn evaluate(&self, tags: &Tags) -> bool {
        match self {
            TagPredicate::HasKey(key) => tags.contains_key(key),
            TagPredicate::Equals { key, value } => Self::has_kv_pair(tags, key, value),
            TagPredicate::OneOf { key, values } => {
                values.iter().any(|value| Self::has_kv_pair(tags, key, value))
            }
            TagPredicate::All(parts) => {
                !parts.is_empty() && parts.iter().all(|part| part.evaluate(tags))
            }
        }
    }

    // OSM stores multiple values for one key separated by semicolons.
    fn has_kv_pair(tags: &Tags, key: &str, value: &str) -> bool {
        match tags.get(key) {
            Some(tag_value) => tag_value.split(';').any(|part| part.trim() == value),
            None => false,
        }
    }
}

/// A human-meaningful classification such as "bench" or "park".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub plural: String,
    pub category: String,
    pub predicate: TagPredicate,
}

impl Feature {
    pub fn new(
        name: impl Into<String>,
        plural: impl Into<String>,
        category: impl Into<String>,
        predicate: TagPredicate,
    ) -> Self {
        Feature {
            name: name.into(),
            plural: plural.into(),
            category: category.into(),
            predicate,
        }
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.predicate.evaluate(tags)
    }
}
