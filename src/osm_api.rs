use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::augment::ElementSource;
use crate::config::UserConfig;
use crate::data::{ChangeKind, ChangesetHeader, Element, ElementKey, ElementType, OsmId};
use crate::errors::{Error, Result};
use crate::etl::describe_changeset::ChangesetSource;
use crate::etl::parse_osm;

/// Blocking client for the OSM API v0.6.
#[derive(Debug, Clone)]
pub struct OsmApi {
    client: Client,
    base_url: String,
}

impl OsmApi {
    pub fn new(config: &UserConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(OsmApi {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(path);
        debug!(url = url.as_str(); "GET");
        let response = self.client.get(&url).send()?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(Error::NotFound(url)),
            status if !status.is_success() => {
                Err(Error::Message(format!("{} returned {}", url, status)))
            }
            _ => Ok(response.bytes()?.to_vec()),
        }
    }

    /// Latest version of one element.
    pub fn element(&self, key: ElementKey) -> Result<Element> {
        let body = self.get(&format!("{}/{}", key.element_type, key.id))?;
        parse_osm::parse_elements(&body)?
            .into_iter()
            .find(|element| element.key() == key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}

impl ElementSource for OsmApi {
    fn ways_containing_node(&self, node_id: OsmId) -> Result<Vec<Element>> {
        let lookup = format!("ways containing node {}", node_id);
        let body = self
            .get(&format!("node/{}/ways", node_id))
            .map_err(|err| Error::lookup_failed(lookup.as_str(), err))?;
        let elements = parse_osm::parse_elements(&body)?;
        Ok(elements.into_iter().filter(|e| e.element_type() == ElementType::Way).collect())
    }

    fn relations_containing(&self, key: ElementKey) -> Result<Vec<Element>> {
        let lookup = format!("relations containing {}", key);
        let body = self
            .get(&format!("{}/{}/relations", key.element_type, key.id))
            .map_err(|err| Error::lookup_failed(lookup.as_str(), err))?;
        let elements = parse_osm::parse_elements(&body)?;
        Ok(elements
            .into_iter()
            .filter(|e| e.element_type() == ElementType::Relation)
            .collect())
    }
}

impl ChangesetSource for OsmApi {
    fn changeset(&self, changeset_id: i64) -> Result<ChangesetHeader> {
        let body = self.get(&format!("changeset/{}", changeset_id))?;
        parse_osm::parse_changeset(&body)
    }

    fn change(&self, changeset_id: i64) -> Result<Vec<(ChangeKind, Vec<Element>)>> {
        let body = self.get(&format!("changeset/{}/download", changeset_id))?;
        parse_osm::parse_change(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_ignore_trailing_slash() {
        let config = UserConfig {
            api_url: "https://example.org/api/0.6/".to_string(),
            ..UserConfig::default()
        };
        let api = OsmApi::new(&config).unwrap();
        assert_eq!(api.url("node/1/ways"), "https://example.org/api/0.6/node/1/ways");
    }
}
