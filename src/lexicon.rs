use std::time::Duration;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::classify;
use crate::cli::LexiconArgs;
use crate::config::Config;
use crate::crawl::{
    Attempts, CrawlError, CrawlOptions, CrawlReport, RetryPolicy, UnitOutcome, checkpoint,
    fetch_page, finish, pause,
};
use crate::formats::{CrawlUnit, Language, LexicalEntry};
use crate::session::{Session, WebDriverSession};
use crate::sink::ResultSink;

pub const DEFAULT_HOME_URL: &str = "https://biblehub.com/strongs.htm";
pub const DEFAULT_ENTRY_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LexiconSettings {
    pub home_url: String,
    pub languages: Vec<Language>,
    /// Applies to the home page, catalog pages and each entry page.
    pub entry_retry: RetryPolicy,
}

impl Default for LexiconSettings {
    fn default() -> Self {
        Self {
            home_url: DEFAULT_HOME_URL.to_owned(),
            languages: Language::ALL.to_vec(),
            entry_retry: RetryPolicy::unbounded(DEFAULT_ENTRY_BACKOFF),
        }
    }
}

pub async fn run(
    args: LexiconArgs,
    mut config: Config,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    args.browser.apply(&mut config);
    args.retry.apply(&mut config);
    if let Some(home_url) = args.home_url {
        config.lexicon.home_url = home_url;
    }
    if !args.languages.is_empty() {
        config.lexicon.languages = args.languages;
    }
    let settings = config.lexicon.settings();
    let options = args.output.crawl_options(cancel);

    let mut session = WebDriverSession::connect(&config.webdriver)
        .await
        .with_context(|| format!("start webdriver session at {}", config.webdriver.url))?;
    match crawl(&mut session, &settings, &options).await {
        Ok(report) => finish(&mut session, report, None).await,
        Err(err) => finish(&mut session, CrawlReport::default(), Some(err)).await,
    }
}

pub async fn crawl<S: Session + ?Sized>(
    session: &mut S,
    settings: &LexiconSettings,
    options: &CrawlOptions,
) -> Result<CrawlReport, CrawlError> {
    let home_url = Url::parse(&settings.home_url)
        .map_err(|err| CrawlError::InvalidInput(format!("home url {}: {err}", settings.home_url)))?;
    if settings.languages.is_empty() {
        return Err(CrawlError::InvalidInput("no languages selected".to_owned()));
    }

    let mut report = CrawlReport::default();
    let mut pending = Vec::new();
    for &language in &settings.languages {
        let unit = CrawlUnit::Lexicon { language };
        if options.should_skip(&unit) {
            report.skipped.push(unit);
        } else {
            pending.push(language);
        }
    }
    if pending.is_empty() {
        return Ok(report);
    }

    tracing::info!(url = %home_url, "loading lexicon home page");
    let home_html = fetch_page(
        session,
        home_url.as_str(),
        &settings.entry_retry,
        &options.cancel,
    )
    .await?;

    for language in pending {
        checkpoint(&options.cancel)?;
        let unit = CrawlUnit::Lexicon { language };
        let catalogs = classify::classify_lexical_links(&home_html, language);
        tracing::info!(%language, catalogs = catalogs.len(), "crawling lexicon");

        match crawl_language(session, settings, options, &home_url, language, &catalogs).await {
            Ok(outcome) => report.completed.push(outcome),
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(err) => {
                tracing::error!(%unit, error = %err, "lexicon unit failed");
                report.failed.push((unit, err));
            }
        }
    }

    Ok(report)
}

async fn crawl_language<S: Session + ?Sized>(
    session: &mut S,
    settings: &LexiconSettings,
    options: &CrawlOptions,
    home_url: &Url,
    language: Language,
    catalogs: &[String],
) -> Result<UnitOutcome, CrawlError> {
    let mut sink = ResultSink::new(CrawlUnit::Lexicon { language });

    for catalog in catalogs {
        checkpoint(&options.cancel)?;
        let Some(catalog_url) = classify::resolve_href(home_url, catalog) else {
            tracing::warn!(href = %catalog, "unresolvable catalog link; skipping");
            continue;
        };

        let html = fetch_page(
            session,
            catalog_url.as_str(),
            &settings.entry_retry,
            &options.cancel,
        )
        .await?;
        let entries = classify::entry_links(&html, language);
        tracing::info!(url = %catalog_url, entries = entries.len(), "catalog page");

        for href in entries {
            checkpoint(&options.cancel)?;
            let Some(entry_url) = classify::resolve_href(&catalog_url, &href) else {
                tracing::warn!(%href, "unresolvable entry link; skipping");
                continue;
            };
            if let Some(entry) =
                scrape_entry(session, entry_url.as_str(), language, settings, options).await?
            {
                sink.append(entry);
            }
        }
    }

    if sink.is_empty() {
        return Err(CrawlError::EmptyUnit {
            unit: sink.unit().clone(),
        });
    }
    let path = sink.flush(&options.out_dir)?;
    Ok(UnitOutcome {
        unit: sink.unit().clone(),
        path,
        records: sink.len(),
    })
}

/// Loads one entry page until it parses. An entry whose URL carries no id is skipped.
async fn scrape_entry<S: Session + ?Sized>(
    session: &mut S,
    url: &str,
    language: Language,
    settings: &LexiconSettings,
    options: &CrawlOptions,
) -> Result<Option<LexicalEntry>, CrawlError> {
    if let Err(err) = classify::strongs_id_from_url(url, language) {
        tracing::warn!(url, error = %err, "skipping entry");
        return Ok(None);
    }

    let policy = &settings.entry_retry;
    let mut attempts = Attempts::new(policy);
    loop {
        checkpoint(&options.cancel)?;
        tracing::info!(url, "scraping entry");

        let result = load_entry(session, url, language, attempts.failures() > 0).await;
        match result {
            Ok(entry) => return Ok(Some(entry)),
            Err(CrawlError::Extraction(err)) => {
                tracing::warn!(url, error = %err, "skipping entry");
                return Ok(None);
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    url,
                    attempt = attempts.failures() + 1,
                    backoff_secs = policy.backoff.as_secs_f64(),
                    error = %err,
                    "entry failed; retrying"
                );
                attempts.fail(err)?;
                pause(&options.cancel, policy.backoff).await?;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn load_entry<S: Session + ?Sized>(
    session: &mut S,
    url: &str,
    language: Language,
    refresh_first: bool,
) -> Result<LexicalEntry, CrawlError> {
    if refresh_first {
        session.refresh().await?;
    }
    session.navigate(url).await?;
    let html = session.page_source().await?;
    Ok(classify::extract_lexical_fields(&html, url, language)?)
}
