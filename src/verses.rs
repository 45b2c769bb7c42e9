use std::time::Duration;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::book::{SearchTerm, TermAliases, book_metadata, parse_search_term};
use crate::classify;
use crate::cli::VersesArgs;
use crate::config::Config;
use crate::crawl::{
    Attempts, CrawlError, CrawlOptions, CrawlReport, RetryPolicy, UnitOutcome, checkpoint, finish,
    pause,
};
use crate::formats::{BookMetadata, CrawlUnit, VersePart, VerseRecord};
use crate::inputs::{self, SEARCH_TERMS_COLUMN, VERSIONS_COLUMN};
use crate::session::{Locator, Session, WebDriverSession};
use crate::sink::ResultSink;

pub const DEFAULT_HOME_URL: &str = "https://www.eliyah.com/lexicon.html";
pub const DEFAULT_TERM_BACKOFF: Duration = Duration::from_secs(300);

const SEARCH_INPUT_XPATH: &str = "/html/body/main/div/div[1]/div/form/div/div/div[2]/div/input";
const VERSION_SELECT_XPATH: &str = "/html/body/main/div/div[1]/div/form/div/div/div[1]/select";
const CLOSE_BUTTON_XPATH: &str = "//*[@id=\"interClose\"]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub search_settle: Duration,
    pub detail_settle: Duration,
    pub close_settle: Duration,
}

impl Timings {
    pub const NONE: Timings = Timings {
        search_settle: Duration::ZERO,
        detail_settle: Duration::ZERO,
        close_settle: Duration::ZERO,
    };
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            search_settle: Duration::from_secs(15),
            detail_settle: Duration::from_secs(5),
            close_settle: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseSelectors {
    pub search_input: Locator,
    pub version_select: Locator,
    pub close_button: Locator,
}

impl Default for VerseSelectors {
    fn default() -> Self {
        Self {
            search_input: Locator::xpath(SEARCH_INPUT_XPATH),
            version_select: Locator::xpath(VERSION_SELECT_XPATH),
            close_button: Locator::xpath(CLOSE_BUTTON_XPATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerseSettings {
    pub home_url: String,
    pub aliases: TermAliases,
    pub timings: Timings,
    pub selectors: VerseSelectors,
    /// Session and extraction failures back off by `term_retry.backoff`.
    pub term_retry: RetryPolicy,
    /// Wait before resubmitting a term whose search came back empty.
    pub empty_result_backoff: Duration,
}

impl Default for VerseSettings {
    fn default() -> Self {
        Self {
            home_url: DEFAULT_HOME_URL.to_owned(),
            aliases: TermAliases::default(),
            timings: Timings::default(),
            selectors: VerseSelectors::default(),
            term_retry: RetryPolicy::unbounded(DEFAULT_TERM_BACKOFF),
            empty_result_backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    pub book: BookMetadata,
    pub version: String,
}

impl UnitContext {
    pub fn unit(&self) -> CrawlUnit {
        CrawlUnit::Book {
            book: self.book.bible_book.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPlan {
    pub book: BookMetadata,
    pub terms: Vec<SearchTerm>,
}

/// Parses every term before any navigation. Book metadata comes from the first term.
pub fn plan_book(terms: &[String], versions: &[String]) -> Result<BookPlan, CrawlError> {
    if terms.is_empty() {
        return Err(CrawlError::InvalidInput("no search terms".to_owned()));
    }
    if versions.is_empty() {
        return Err(CrawlError::InvalidInput("no versions".to_owned()));
    }
    if versions.iter().any(|version| version.trim().is_empty()) {
        return Err(CrawlError::InvalidInput("blank version".to_owned()));
    }

    let parsed = terms
        .iter()
        .map(|term| parse_search_term(term))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CrawlError::InvalidInput(err.to_string()))?;

    let book = book_metadata(&parsed[0].book);
    for term in &parsed[1..] {
        if term.book != book.bible_book {
            tracing::warn!(
                term = %term.raw,
                book = %book.bible_book,
                "term names a different book; records are stamped with the first term's book"
            );
        }
    }

    Ok(BookPlan {
        book,
        terms: parsed,
    })
}

#[derive(Debug, Clone)]
struct BookTerms {
    source: String,
    terms: Vec<String>,
}

fn collect_books(args: &VersesArgs) -> anyhow::Result<Vec<BookTerms>> {
    let mut books = Vec::new();
    if !args.terms.is_empty() {
        books.push(BookTerms {
            source: "--term".to_owned(),
            terms: args.terms.clone(),
        });
    }
    let mut files = args.terms_files.clone();
    if let Some(dir) = &args.terms_dir {
        files.extend(inputs::term_files(dir)?);
    }
    for path in files {
        books.push(BookTerms {
            source: path.display().to_string(),
            terms: inputs::read_column(&path, SEARCH_TERMS_COLUMN)?,
        });
    }
    Ok(books)
}

fn collect_versions(args: &VersesArgs) -> anyhow::Result<Vec<String>> {
    let mut versions: Vec<String> = args
        .versions
        .iter()
        .map(|version| version.trim().to_owned())
        .filter(|version| !version.is_empty())
        .collect();
    if let Some(path) = &args.versions_file {
        versions.extend(inputs::read_column(path, VERSIONS_COLUMN)?);
    }
    Ok(versions)
}

pub async fn run(
    args: VersesArgs,
    mut config: Config,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    args.browser.apply(&mut config);
    args.retry.apply(&mut config);
    if let Some(home_url) = &args.home_url {
        config.verses.home_url = home_url.clone();
    }
    let settings = config.verses.settings();
    let options = args.output.crawl_options(cancel);

    let books = collect_books(&args)?;
    let versions = collect_versions(&args)?;
    for book in &books {
        plan_book(&book.terms, &versions).with_context(|| format!("terms from {}", book.source))?;
    }

    let mut session = WebDriverSession::connect(&config.webdriver)
        .await
        .with_context(|| format!("start webdriver session at {}", config.webdriver.url))?;
    let mut report = CrawlReport::default();
    for book in &books {
        tracing::info!(source = %book.source, "starting book");
        match crawl(&mut session, &settings, &book.terms, &versions, &options).await {
            Ok(book_report) => report.merge(book_report),
            Err(err) => return finish(&mut session, report, Some(err)).await,
        }
    }
    finish(&mut session, report, None).await
}

pub async fn crawl<S: Session + ?Sized>(
    session: &mut S,
    settings: &VerseSettings,
    terms: &[String],
    versions: &[String],
    options: &CrawlOptions,
) -> Result<CrawlReport, CrawlError> {
    Url::parse(&settings.home_url)
        .map_err(|err| CrawlError::InvalidInput(format!("home url {}: {err}", settings.home_url)))?;
    let plan = plan_book(terms, versions)?;
    tracing::info!(
        book = %plan.book.bible_book,
        lit_type = %plan.book.lit_type,
        testament = %plan.book.testament_type,
        terms = plan.terms.len(),
        versions = versions.len(),
        "crawling verses"
    );

    let mut report = CrawlReport::default();
    for version in versions {
        checkpoint(&options.cancel)?;
        let context = UnitContext {
            book: plan.book.clone(),
            version: version.trim().to_owned(),
        };
        let unit = context.unit();
        if options.should_skip(&unit) {
            report.skipped.push(unit);
            continue;
        }

        match crawl_book_version(session, settings, &plan, &context, options).await {
            Ok(outcome) => report.completed.push(outcome),
            Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
            Err(err) => {
                tracing::error!(%unit, error = %err, "verse unit failed");
                report.failed.push((unit, err));
            }
        }
    }

    Ok(report)
}

async fn crawl_book_version<S: Session + ?Sized>(
    session: &mut S,
    settings: &VerseSettings,
    plan: &BookPlan,
    context: &UnitContext,
    options: &CrawlOptions,
) -> Result<UnitOutcome, CrawlError> {
    let mut sink = ResultSink::new(context.unit());

    for term in &plan.terms {
        checkpoint(&options.cancel)?;
        let parts = scrape_term(session, settings, context, term, options).await?;
        tracing::info!(
            term = %term.raw,
            version = %context.version,
            parts = parts.len(),
            "term complete"
        );
        for part in parts {
            sink.append(VerseRecord::stamp(part, &context.book, &context.version));
        }
    }

    let path = sink.flush(&options.out_dir)?;
    Ok(UnitOutcome {
        unit: sink.unit().clone(),
        path,
        records: sink.len(),
    })
}

/// Repeats one term until it yields verse parts. Empty results are never accepted.
async fn scrape_term<S: Session + ?Sized>(
    session: &mut S,
    settings: &VerseSettings,
    context: &UnitContext,
    term: &SearchTerm,
    options: &CrawlOptions,
) -> Result<Vec<VersePart>, CrawlError> {
    let query = settings.aliases.apply(&term.raw);
    let policy = &settings.term_retry;
    let mut attempts = Attempts::new(policy);

    loop {
        checkpoint(&options.cancel)?;
        tracing::info!(term = %query, version = %context.version, "scraping term");

        match parse_term(session, settings, context, term, &query, options).await {
            Ok(parts) => return Ok(parts),
            Err(err) if err.is_retryable() => {
                let backoff = match &err {
                    CrawlError::EmptyResults { .. } => settings.empty_result_backoff,
                    _ => policy.backoff,
                };
                tracing::warn!(
                    term = %query,
                    version = %context.version,
                    attempt = attempts.failures() + 1,
                    backoff_secs = backoff.as_secs_f64(),
                    error = %err,
                    "term failed; retrying"
                );
                attempts.fail(err)?;
                pause(&options.cancel, backoff).await?;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn parse_term<S: Session + ?Sized>(
    session: &mut S,
    settings: &VerseSettings,
    context: &UnitContext,
    term: &SearchTerm,
    query: &str,
    options: &CrawlOptions,
) -> Result<Vec<VersePart>, CrawlError> {
    let empty = || CrawlError::EmptyResults {
        term: query.to_owned(),
        version: context.version.clone(),
    };

    search_on_term(session, settings, query, &context.version, options).await?;
    let rows = classify::verse_rows(&session.page_source().await?)?;
    if rows.is_empty() {
        return Err(empty());
    }

    let mut parts = Vec::new();
    for row in rows {
        checkpoint(&options.cancel)?;
        let link = Locator::xpath(format!("//a[@href={}]", xpath_literal(&row.detail_href)));
        let link = session.find_element(&link).await?;
        session.click(&link).await?;
        pause(&options.cancel, settings.timings.detail_settle).await?;

        tracing::info!(verse = %row.verse_label, "parsing verse");
        let detail = session.page_source().await?;
        let bible_verse = format!("{}{}", context.book.bible_book, row.verse_label);
        parts.extend(
            classify::extract_verse_parts(&detail)
                .into_iter()
                .map(|token| VersePart::new(token, term.chapter, bible_verse.clone())),
        );

        let close = session.find_element(&settings.selectors.close_button).await?;
        session.click(&close).await?;
        pause(&options.cancel, settings.timings.close_settle).await?;
    }

    if parts.is_empty() {
        return Err(empty());
    }
    Ok(parts)
}

async fn search_on_term<S: Session + ?Sized>(
    session: &mut S,
    settings: &VerseSettings,
    query: &str,
    version: &str,
    options: &CrawlOptions,
) -> Result<(), CrawlError> {
    session.navigate(&settings.home_url).await?;
    let input = session.find_element(&settings.selectors.search_input).await?;
    let select = session.find_element(&settings.selectors.version_select).await?;
    session.select_option(&select, version).await?;
    session.fill_and_submit(&input, query).await?;
    pause(&options.cancel, settings.timings.search_settle).await
}

fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let pieces = value.split('\'').collect::<Vec<_>>().join("', \"'\", '");
        format!("concat('{pieces}')")
    }
}
