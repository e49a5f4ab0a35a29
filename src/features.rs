pub mod catalog_yaml;

use serde::Serialize;

use crate::data::{Element, Feature};
use crate::errors::{Error, Result};

/// Features in load order, grouped into categories.
///
/// Order is priority: when an element matches several features the earliest
/// one is its best match, so features are never re-sorted after loading.
#[derive(Debug, Default, Clone)]
pub struct FeatureCatalog {
    features: Vec<Feature>,
    categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub features: usize,
    pub categories: usize,
}

impl FeatureCatalog {
    pub fn new() -> Self {
        FeatureCatalog::default()
    }

    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut catalog = FeatureCatalog::new();
        for feature in features {
            catalog.add_feature(feature);
        }
        catalog
    }

    pub fn add_feature(&mut self, feature: Feature) {
        if !self.categories.contains(&feature.category) {
            self.categories.push(feature.category.clone());
        }
        self.features.push(feature);
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Categories in the order they were first seen.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            features: self.features.len(),
            categories: self.categories.len(),
        }
    }
}

/// Classifies elements against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    catalog: &'a FeatureCatalog,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a FeatureCatalog) -> Self {
        Matcher { catalog }
    }

    /// Every matching feature, in catalog order.
    pub fn match_all(&self, element: &Element) -> Vec<&'a Feature> {
        if element.is_tagless() {
            return Vec::new();
        }
        self.catalog
            .features
            .iter()
            .filter(|feature| feature.matches(&element.tags))
            .collect()
    }

    pub fn match_best(&self, element: &Element) -> Result<&'a Feature> {
        self.catalog
            .features
            .iter()
            .find(|feature| !element.is_tagless() && feature.matches(&element.tags))
            .ok_or(Error::NoFeatureMatched {
                element: element.key(),
            })
    }

    /// One `match_all` result per input element, in input order.
    pub fn match_each(&self, elements: &[Element]) -> Vec<Vec<&'a Feature>> {
        elements.iter().map(|element| self.match_all(element)).collect()
    }
}
