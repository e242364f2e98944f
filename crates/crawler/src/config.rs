//
// config.rs
//
// Configuration for the solution crawler and reference search
//

use std::time::Duration;

use crate::find_symbols::{CascadeDirection, FindReferencesSearchOptions};

/// Crawler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerConfig {
    /// Whether the workspace event listener subscribes at all
    pub enabled: bool,
    /// Debounce delay, measured from the first unflushed event, in milliseconds
    pub debounce_ms: u64,
    /// Maximum events per flush (0 = unbounded)
    pub max_batch_size: usize,
    /// Whether to try the remote worker before falling back to local paths
    pub prefer_remote: bool,
    /// Default cascade direction for reference searches
    pub search_cascade: CascadeDirection,
}

impl Default for CrawlerConfig {
    /// Defaults match an interactive host: crawler on, a medium debounce
    /// window, remote preferred and bidirectional cascading.
    ///
    /// # Examples
    ///
    /// ```
    /// use crawler::CrawlerConfig;
    ///
    /// let cfg = CrawlerConfig::default();
    /// assert!(cfg.enabled);
    /// assert_eq!(cfg.debounce_ms, 500);
    /// assert!(cfg.prefer_remote);
    /// ```
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            max_batch_size: 0,
            prefer_remote: true,
            search_cascade: CascadeDirection::Bidirectional,
        }
    }
}

impl CrawlerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Default options for reference searches started by the host
    pub fn search_options(&self) -> FindReferencesSearchOptions {
        FindReferencesSearchOptions::default().with_direction(self.search_cascade)
    }
}

/// Parse crawler configuration from host settings.
///
/// Reads the top-level `crawler` section. Only fields present in the JSON are
/// applied; absent fields keep their defaults. Returns `None` when the section
/// is missing.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use crawler::config::parse_crawler_config;
///
/// let settings = json!({
///     "crawler": {
///         "enabled": true,
///         "debounceMs": 250,
///         "search": { "cascade": "unidirectional" }
///     }
/// });
/// let cfg = parse_crawler_config(&settings).unwrap();
/// assert_eq!(cfg.debounce_ms, 250);
/// ```
pub fn parse_crawler_config(settings: &serde_json::Value) -> Option<CrawlerConfig> {
    let crawler = settings.get("crawler")?;
    let mut config = CrawlerConfig::default();

    if let Some(v) = crawler.get("enabled").and_then(|v| v.as_bool()) {
        config.enabled = v;
    }
    if let Some(v) = crawler.get("debounceMs").and_then(|v| v.as_u64()) {
        config.debounce_ms = v;
    }
    if let Some(v) = crawler.get("maxBatchSize").and_then(|v| v.as_u64()) {
        config.max_batch_size = v as usize;
    }
    if let Some(v) = crawler.get("preferRemote").and_then(|v| v.as_bool()) {
        config.prefer_remote = v;
    }

    if let Some(search) = crawler.get("search") {
        if let Some(v) = search.get("cascade").and_then(|v| v.as_str()) {
            config.search_cascade = match v {
                "unidirectional" => CascadeDirection::Unidirectional,
                "bidirectional" => CascadeDirection::Bidirectional,
                other => {
                    log::warn!("Unknown cascade direction '{}', keeping default", other);
                    config.search_cascade
                }
            };
        }
    }

    log::trace!("Parsed crawler config: {:?}", config);
    Some(config)
}
