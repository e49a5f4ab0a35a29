//! Classifies OpenStreetMap elements against a catalog of features and turns
//! the elements of a changeset into a short English sentence such as
//! "alice created three benches and a park".
//!
//! Pipeline: fetch changeset -> [`augment`] tagless elements with their
//! parents -> [`features::Matcher`] -> [`describe`] (group, sort, render).

pub mod augment;
pub mod config;
pub mod data;
pub mod describe;
pub mod english;
pub mod errors;
pub mod etl;
pub mod features;
pub mod osm_api;

pub use augment::{ElementSource, GraphAugmenter, InMemorySource};
pub use errors::{Error, Result};
pub use features::{FeatureCatalog, Matcher};
