use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::book::{TermAliases, default_aliases};
use crate::crawl::RetryPolicy;
use crate::formats::Language;
use crate::lexicon::{self, LexiconSettings};
use crate::session::{Browser, Locator};
use crate::verses::{self, Timings, VerseSelectors, VerseSettings};

pub const WEBDRIVER_URL_ENV: &str = "WEBDRIVER_URL";
pub const ES_HOST_ENV: &str = "ES_HOST";
pub const ES_API_KEY_ENV: &str = "ES_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub webdriver: WebDriverConfig,
    pub lexicon: LexiconConfig,
    pub verses: VersesConfig,
    pub elasticsearch: ElasticConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebDriverConfig {
    pub url: String,
    pub browser: Browser,
    pub headless: bool,
    pub request_timeout_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4444".to_owned(),
            browser: Browser::default(),
            headless: true,
            request_timeout_secs: 120,
        }
    }
}

impl WebDriverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `max_attempts: null` (the default) retries forever. An unset `backoff_secs`
/// takes the crawl's own default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub backoff_secs: Option<u64>,
}

impl RetryConfig {
    pub fn policy(&self, default_backoff: Duration) -> RetryPolicy {
        let backoff = self
            .backoff_secs
            .map_or(default_backoff, Duration::from_secs);
        match self.max_attempts {
            Some(max) => RetryPolicy::bounded(max, backoff),
            None => RetryPolicy::unbounded(backoff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LexiconConfig {
    pub home_url: String,
    pub languages: Vec<Language>,
    pub retry: RetryConfig,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            home_url: lexicon::DEFAULT_HOME_URL.to_owned(),
            languages: Language::ALL.to_vec(),
            retry: RetryConfig::default(),
        }
    }
}

impl LexiconConfig {
    pub fn settings(&self) -> LexiconSettings {
        LexiconSettings {
            home_url: self.home_url.clone(),
            languages: self.languages.clone(),
            entry_retry: self.retry.policy(lexicon::DEFAULT_ENTRY_BACKOFF),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingsConfig {
    pub search_settle_secs: u64,
    pub detail_settle_secs: u64,
    pub close_settle_secs: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        let timings = Timings::default();
        Self {
            search_settle_secs: timings.search_settle.as_secs(),
            detail_settle_secs: timings.detail_settle.as_secs(),
            close_settle_secs: timings.close_settle.as_secs(),
        }
    }
}

/// Element locators; a leading `/` or `(` marks XPath, anything else is CSS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorsConfig {
    pub search_input: String,
    pub version_select: String,
    pub close_button: String,
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        let selectors = VerseSelectors::default();
        Self {
            search_input: selectors.search_input.expr().to_owned(),
            version_select: selectors.version_select.expr().to_owned(),
            close_button: selectors.close_button.expr().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersesConfig {
    pub home_url: String,
    /// Substring rewrites applied to each search term before it is submitted.
    pub aliases: BTreeMap<String, String>,
    pub timings: TimingsConfig,
    pub selectors: SelectorsConfig,
    pub retry: RetryConfig,
    pub empty_result_backoff_secs: u64,
}

impl Default for VersesConfig {
    fn default() -> Self {
        Self {
            home_url: verses::DEFAULT_HOME_URL.to_owned(),
            aliases: default_aliases(),
            timings: TimingsConfig::default(),
            selectors: SelectorsConfig::default(),
            retry: RetryConfig::default(),
            empty_result_backoff_secs: 0,
        }
    }
}

impl VersesConfig {
    pub fn settings(&self) -> VerseSettings {
        VerseSettings {
            home_url: self.home_url.clone(),
            aliases: TermAliases::new(self.aliases.clone()),
            timings: Timings {
                search_settle: Duration::from_secs(self.timings.search_settle_secs),
                detail_settle: Duration::from_secs(self.timings.detail_settle_secs),
                close_settle: Duration::from_secs(self.timings.close_settle_secs),
            },
            selectors: VerseSelectors {
                search_input: Locator::parse(&self.selectors.search_input),
                version_select: Locator::parse(&self.selectors.version_select),
                close_button: Locator::parse(&self.selectors.close_button),
            },
            term_retry: self.retry.policy(verses::DEFAULT_TERM_BACKOFF),
            empty_result_backoff: Duration::from_secs(self.empty_result_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ElasticConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub verse_index: String,
    pub strongs_index: String,
    pub timeout_secs: u64,
    pub ping_attempts: u32,
    pub ping_interval_secs: u64,
    pub bulk_chunk_size: usize,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9200".to_owned(),
            api_key: None,
            verse_index: "verse_index".to_owned(),
            strongs_index: "strongs_id_index".to_owned(),
            timeout_secs: 30,
            ping_attempts: 30,
            ping_interval_secs: 2,
            bulk_chunk_size: 500,
        }
    }
}

impl Config {
    /// Reads `path` when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Overrides endpoints and credentials from `WEBDRIVER_URL`, `ES_HOST` and `ES_API_KEY`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| var(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(WEBDRIVER_URL_ENV) {
            self.webdriver.url = url;
        }
        if let Some(host) = lookup(ES_HOST_ENV) {
            self.elasticsearch.host = host;
        }
        if let Some(key) = lookup(ES_API_KEY_ENV) {
            self.elasticsearch.api_key = Some(key);
        }
    }
}
