pub mod changeset;
pub mod feature;
pub mod osm;

/// Elements as read from the OSM API, one record per (type, id, version).
pub use self::osm::{Element, ElementKey, ElementKind, ElementType, Member, OsmId, Tags};

/// Catalog entries an element can be classified as.
pub use self::feature::{Feature, TagPredicate};

pub use self::changeset::{Action, ChangeKind, ChangesetHeader, ChangesetView};
