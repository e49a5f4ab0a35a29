use std::{collections::BTreeMap, fs, path::Path};

use log::info;
use serde::Deserialize;
use serde_yaml::Value;

use super::FeatureCatalog;
use crate::data::{Feature, TagPredicate};
use crate::english;
use crate::errors::{Error, Result};

const DEFAULT_CATEGORY: &str = "uncategorized";
const ANY_VALUE: &str = "*";

#[derive(Deserialize)]
struct FeatureEntry {
    name: String,
    plural: Option<String>,
    category: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "yes".to_string() } else { "no".to_string() }),
        _ => Err(Error::MalformedCatalog(format!(
            "tag '{}' must be a string, number or list of strings",
            key
        ))),
    }
}

fn tag_predicate(key: &str, value: &Value) -> Result<TagPredicate> {
    if let Value::Sequence(values) = value {
        let values = values
            .iter()
            .map(|v| scalar_to_string(key, v))
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            return Err(Error::MalformedCatalog(format!("tag '{}' has an empty value list", key)));
        }
        return Ok(TagPredicate::OneOf {
            key: key.to_string(),
            values,
        });
    }

    let value = scalar_to_string(key, value)?;
    if value == ANY_VALUE {
        Ok(TagPredicate::has_key(key))
    } else {
        Ok(TagPredicate::equals(key, value))
    }
}

fn entry_to_feature(entry: FeatureEntry) -> Result<Feature> {
    if entry.name.trim().is_empty() {
        return Err(Error::MalformedCatalog("feature without a name".to_string()));
    }
    if entry.tags.is_empty() {
        return Err(Error::MalformedCatalog(format!(
            "feature '{}' declares no tags",
            entry.name
        )));
    }

    let predicate = TagPredicate::All(
        entry
            .tags
            .iter()
            .map(|(key, value)| tag_predicate(key, value))
            .collect::<Result<Vec<_>>>()?,
    );
    let plural = entry.plural.unwrap_or_else(|| english::pluralize(&entry.name));
    let category = entry.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    Ok(Feature::new(entry.name, plural, category, predicate))
}

/// Parses a YAML list of features, keeping document order.
pub fn parse_catalog(yaml: &str) -> Result<FeatureCatalog> {
    let entries: Vec<FeatureEntry> = serde_yaml::from_str(yaml)?;
    let mut catalog = FeatureCatalog::new();
    for entry in entries {
        catalog.add_feature(entry_to_feature(entry)?);
    }
    Ok(catalog)
}

pub fn load_catalog(path: &Path) -> Result<FeatureCatalog> {
    let yaml = fs::read_to_string(path)?;
    let catalog = parse_catalog(&yaml)?;
    let stats = catalog.stats();
    let path_str = path.display().to_string();
    info!(
        path = path_str.as_str(),
        features = stats.features,
        categories = stats.categories;
        "Loaded feature catalog"
    );
    Ok(catalog)
}
