use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    sync::OnceLock,
};

use regex::Regex;
use serde::Serialize;

use crate::errors::Error;

pub type OsmId = i64;

pub type Tags = BTreeMap<String, String>;

/// Declaration order is the sort order: nodes, then ways, then relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Node => "node",
            ElementType::Way => "way",
            ElementType::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(ElementType::Node),
            "way" => Ok(ElementType::Way),
            "relation" => Ok(ElementType::Relation),
            other => Err(Error::MalformedElement(format!("unknown element type '{}'", other))),
        }
    }
}

/// Identity of an element regardless of version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ElementKey {
    pub element_type: ElementType,
    pub id: OsmId,
}

impl ElementKey {
    pub fn new(element_type: ElementType, id: OsmId) -> Self {
        ElementKey { element_type, id }
    }
}

fn element_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<type>node|way|relation)[:/](?<id>-?\d+)$")
            .expect("element id regex is valid")
    })
}

/// Parses identifiers such as `node:123` or `way/42`.
impl FromStr for ElementKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = element_id_regex()
            .captures(s.trim())
            .ok_or_else(|| Error::InvalidElementId(s.to_string()))?;
        let element_type = captures["type"].parse()?;
        let id = captures["id"]
            .parse()
            .map_err(|_| Error::InvalidElementId(s.to_string()))?;
        Ok(ElementKey::new(element_type, id))
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.element_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_type: ElementType,
    pub id: OsmId,
    pub role: String,
}

impl Member {
    pub fn key(&self) -> ElementKey {
        ElementKey::new(self.member_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way { nd: Vec<OsmId> },
    Relation { members: Vec<Member> },
}

/// One version of a node, way or relation.
///
/// `parent_ways` and `parent_relations` are only filled in by the graph
/// augmenter. `None` means the references were never computed; `Some` of an
/// empty set means they were looked for and none exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: OsmId,
    pub version: u64,
    pub tags: Tags,
    pub kind: ElementKind,
    pub parent_ways: Option<BTreeSet<OsmId>>,
    pub parent_relations: Option<BTreeSet<OsmId>>,
}

impl Element {
    fn new(id: OsmId, version: u64, tags: Tags, kind: ElementKind) -> Self {
        Element {
            id,
            version,
            tags,
            kind,
            parent_ways: None,
            parent_relations: None,
        }
    }

    pub fn node(id: OsmId, version: u64, tags: Tags) -> Self {
        Element::new(id, version, tags, ElementKind::Node)
    }

    pub fn way(id: OsmId, version: u64, tags: Tags, nd: Vec<OsmId>) -> Self {
        Element::new(id, version, tags, ElementKind::Way { nd })
    }

    pub fn relation(id: OsmId, version: u64, tags: Tags, members: Vec<Member>) -> Self {
        Element::new(id, version, tags, ElementKind::Relation { members })
    }

    pub fn element_type(&self) -> ElementType {
        match self.kind {
            ElementKind::Node => ElementType::Node,
            ElementKind::Way { .. } => ElementType::Way,
            ElementKind::Relation { .. } => ElementType::Relation,
        }
    }

    pub fn key(&self) -> ElementKey {
        ElementKey::new(self.element_type(), self.id)
    }

    pub fn is_tagless(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_parent_ways(&self) -> bool {
        self.parent_ways.as_ref().is_some_and(|ways| !ways.is_empty())
    }

    pub fn has_parent_relations(&self) -> bool {
        self.parent_relations.as_ref().is_some_and(|rels| !rels.is_empty())
    }

    pub fn add_parent_way(&mut self, way_id: OsmId) {
        self.parent_ways.get_or_insert_with(BTreeSet::new).insert(way_id);
    }

    pub fn add_parent_relation(&mut self, relation_id: OsmId) {
        self.parent_relations.get_or_insert_with(BTreeSet::new).insert(relation_id);
    }

    /// Node-before-way-before-relation, then id, then version.
    pub fn canonical_cmp(&self, other: &Element) -> Ordering {
        (self.element_type(), self.id, self.version)
            .cmp(&(other.element_type(), other.id, other.version))
    }

    pub fn same_version(&self, other: &Element) -> bool {
        self.key() == other.key() && self.version == other.version
    }
}

/// Builds a tag mapping from literal pairs.
pub fn tags<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
