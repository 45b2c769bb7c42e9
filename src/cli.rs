use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crawl::CrawlOptions;
use crate::formats::{Language, LitType, Testament};
use crate::session::Browser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML config file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape Strong's lexical entries into `id_lookups/<Language>/`.
    Lexicon(LexiconArgs),
    /// Scrape verse parts for one or more books into `verse_data/<version>/`.
    Verses(VersesArgs),
    /// Load scraped CSVs into Elasticsearch.
    Ingest(IngestArgs),
    /// Run the explorer queries for a Strong's id or an English word.
    Query(QueryArgs),
}

#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Data directory that receives `id_lookups/` and `verse_data/`.
    #[arg(long, default_value = "scraped_docs")]
    pub out: PathBuf,

    /// Leave units whose output file already exists untouched.
    #[arg(long)]
    pub skip_existing: bool,
}

impl OutputArgs {
    pub fn crawl_options(&self, cancel: CancellationToken) -> CrawlOptions {
        CrawlOptions {
            out_dir: self.out.clone(),
            skip_existing: self.skip_existing,
            cancel,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct BrowserArgs {
    /// WebDriver endpoint (overrides config and `WEBDRIVER_URL`).
    #[arg(long)]
    pub webdriver_url: Option<String>,

    #[arg(long, value_enum)]
    pub browser: Option<Browser>,

    /// Show the browser window.
    #[arg(long)]
    pub headed: bool,
}

impl BrowserArgs {
    /// Flags win over the config file and environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.webdriver_url {
            config.webdriver.url = url.clone();
        }
        if let Some(browser) = self.browser {
            config.webdriver.browser = browser;
        }
        if self.headed {
            config.webdriver.headless = false;
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RetryArgs {
    /// Give up on a page or term after this many failed attempts (default: retry forever).
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

impl RetryArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(max) = self.max_attempts {
            config.lexicon.retry.max_attempts = Some(max);
            config.verses.retry.max_attempts = Some(max);
        }
    }
}

#[derive(Debug, Args)]
pub struct LexiconArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub browser: BrowserArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Languages to crawl (default: from config, both).
    #[arg(long = "language", value_enum)]
    pub languages: Vec<Language>,

    /// Strong's home page.
    #[arg(long)]
    pub home_url: Option<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("terms_source").required(true).multiple(true)))]
#[command(group(ArgGroup::new("versions_source").required(true).multiple(true)))]
pub struct VersesArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub browser: BrowserArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    /// Search term for a single book, e.g. "Genesis 1" (repeatable).
    #[arg(long = "term", group = "terms_source")]
    pub terms: Vec<String>,

    /// CSV with a `search_terms` column; one book per file (repeatable).
    #[arg(long = "terms-file", group = "terms_source")]
    pub terms_files: Vec<PathBuf>,

    /// Directory of `search_terms` CSVs, crawled in file-name order.
    #[arg(long, group = "terms_source")]
    pub terms_dir: Option<PathBuf>,

    /// Bible versions, e.g. `KJV,ASV`.
    #[arg(long, value_delimiter = ',', group = "versions_source")]
    pub versions: Vec<String>,

    /// CSV with a `versions` column.
    #[arg(long, group = "versions_source")]
    pub versions_file: Option<PathBuf>,

    /// Lexicon search page.
    #[arg(long)]
    pub home_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Data directory written by `lexicon` and `verses`.
    #[arg(long, default_value = "scraped_docs")]
    pub data_dir: PathBuf,

    /// Elasticsearch URL (overrides config and `ES_HOST`).
    #[arg(long)]
    pub es_host: Option<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("needle").required(true).args(["id", "word"])))]
pub struct QueryArgs {
    /// Strong's id, e.g. `G1411`.
    #[arg(long)]
    pub id: Option<String>,

    /// English word or phrase.
    #[arg(long)]
    pub word: Option<String>,

    #[arg(long)]
    pub bible_version: Option<String>,

    #[arg(long)]
    pub book: Option<String>,

    /// `Old Testament` or `New Testament`.
    #[arg(long)]
    pub testament: Option<Testament>,

    /// Literature type label, e.g. `Gospels`.
    #[arg(long)]
    pub lit_type: Option<LitType>,

    /// Also count the most frequent surrounding words and their co-occurrence.
    #[arg(long)]
    pub surrounding: bool,

    #[arg(long, default_value_t = 50)]
    pub top_words: usize,

    /// Print the request bodies instead of sending them.
    #[arg(long)]
    pub dry_run: bool,

    /// Elasticsearch URL (overrides config and `ES_HOST`).
    #[arg(long)]
    pub es_host: Option<String>,
}
