//! Indexers registered with the indexer manager, keyed by name.

use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

/// One registered indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexerRecord {
    /// Manager-assigned id used in API paths.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Site URLs the indexer serves.
    #[serde(rename = "indexerUrls", default)]
    pub indexer_urls: Vec<String>,
}

/// Snapshot of the registered indexers, rebuilt on every login.
#[derive(Debug, Clone, Default)]
pub struct IndexerCatalog {
    by_name: BTreeMap<String, IndexerRecord>,
}

impl IndexerCatalog {
    /// Build the catalog from the manager's indexer listing.
    #[must_use]
    pub fn from_records(records: Vec<IndexerRecord>) -> Self {
        Self {
            by_name: records
                .into_iter()
                .map(|record| (record.name.clone(), record))
                .collect(),
        }
    }

    /// Indexer names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Number of indexers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// The indexer whose site URL shares the network location of `announcement_url`.
    ///
    /// Scheme and path are ignored; the authority is compared as written, so
    /// `host` and `host:443` differ whatever the scheme.
    #[must_use]
    pub fn resolve(&self, announcement_url: &str) -> Option<&IndexerRecord> {
        let wanted = netloc(announcement_url)?;
        self.by_name.values().find(|record| {
            record
                .indexer_urls
                .iter()
                .any(|candidate| netloc(candidate).as_deref() == Some(wanted.as_str()))
        })
    }
}

/// Authority text of `raw` (`host[:port]`, lower-cased).
///
/// `Url::port` drops ports equal to the scheme default, so the authority is
/// sliced from the raw text once the URL is known to carry a host.
fn netloc(raw: &str) -> Option<String> {
    let raw = raw.trim();
    Url::parse(raw).ok()?.host_str()?;
    let (_, rest) = raw.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    (!authority.is_empty()).then(|| authority.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> IndexerCatalog {
        IndexerCatalog::from_records(vec![
            IndexerRecord {
                id: 1,
                name: "alpha".to_string(),
                indexer_urls: vec!["https://alpha.example/".to_string()],
            },
            IndexerRecord {
                id: 2,
                name: "beta".to_string(),
                indexer_urls: vec![
                    "https://beta.example:8443/".to_string(),
                    "https://mirror.beta.example/".to_string(),
                ],
            },
        ])
    }

    #[test]
    fn resolution_ignores_scheme_and_path() {
        let catalog = catalog();
        let found = catalog.resolve("http://alpha.example/torrents.php?id=42");
        assert_eq!(found.map(|record| record.id), Some(1));
        let mirror = catalog.resolve("https://mirror.beta.example/details/7");
        assert_eq!(mirror.map(|record| record.id), Some(2));
    }

    #[test]
    fn explicit_ports_must_match() {
        let catalog = catalog();
        assert_eq!(
            catalog
                .resolve("https://beta.example:8443/x")
                .map(|record| record.id),
            Some(2)
        );
        assert!(catalog.resolve("https://beta.example/x").is_none());
    }

    #[test]
    fn default_ports_are_compared_as_written() {
        let catalog = IndexerCatalog::from_records(vec![IndexerRecord {
            id: 9,
            name: "delta".to_string(),
            indexer_urls: vec!["http://delta.example:443/".to_string()],
        }]);
        assert_eq!(
            catalog
                .resolve("https://delta.example:443/details/1")
                .map(|record| record.id),
            Some(9)
        );
        assert!(catalog.resolve("https://delta.example/details/1").is_none());
        assert!(catalog.resolve("http://delta.example:80/details/1").is_none());
    }

    #[test]
    fn non_urls_resolve_to_nothing() {
        assert!(catalog().resolve("torrent:movie.torrent").is_none());
        assert!(catalog().resolve("not a url").is_none());
    }

    #[test]
    fn records_deserialize_from_manager_listing() -> anyhow::Result<()> {
        let records: Vec<IndexerRecord> = serde_json::from_str(
            r#"[{"id":5,"name":"gamma","indexerUrls":["https://gamma.example/"],"enable":true}]"#,
        )?;
        let catalog = IndexerCatalog::from_records(records);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["gamma"]);
        Ok(())
    }
}
