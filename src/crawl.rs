use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::classify::ExtractionError;
use crate::formats::CrawlUnit;
use crate::session::{Session, SessionError};
use crate::sink::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("no results for {term:?} ({version})")]
    EmptyResults { term: String, version: String },

    #[error("{unit} produced no records")]
    EmptyUnit { unit: CrawlUnit },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<CrawlError>,
    },

    #[error("crawl cancelled")]
    Cancelled,

    #[error("invalid crawl input: {0}")]
    InvalidInput(String),
}

impl CrawlError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::Session(_) | CrawlError::Extraction(_) | CrawlError::EmptyResults { .. }
        )
    }
}

/// `max_attempts: None` retries forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }
}

#[derive(Debug)]
pub struct Attempts<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl<'a> Attempts<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt and returns its number, or `Exhausted` once the ceiling is hit.
    pub fn fail(&mut self, err: CrawlError) -> Result<u32, CrawlError> {
        self.failures = self.failures.saturating_add(1);
        match self.policy.max_attempts {
            Some(max) if self.failures >= max => Err(CrawlError::Exhausted {
                attempts: self.failures,
                last: Box::new(err),
            }),
            _ => Ok(self.failures),
        }
    }
}

pub fn checkpoint(cancel: &CancellationToken) -> Result<(), CrawlError> {
    if cancel.is_cancelled() {
        return Err(CrawlError::Cancelled);
    }
    Ok(())
}

pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), CrawlError> {
    if duration.is_zero() {
        return checkpoint(cancel);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(CrawlError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub out_dir: PathBuf,
    /// Leave units whose output file already exists untouched.
    pub skip_existing: bool,
    pub cancel: CancellationToken,
}

impl CrawlOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            skip_existing: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn unit_path(&self, unit: &CrawlUnit) -> PathBuf {
        self.out_dir.join(unit.relative_path())
    }

    pub fn should_skip(&self, unit: &CrawlUnit) -> bool {
        self.skip_existing && self.unit_path(unit).exists()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: CrawlUnit,
    pub path: PathBuf,
    pub records: usize,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub completed: Vec<UnitOutcome>,
    pub skipped: Vec<CrawlUnit>,
    pub failed: Vec<(CrawlUnit, CrawlError)>,
}

impl CrawlReport {
    pub fn merge(&mut self, other: CrawlReport) {
        self.completed.extend(other.completed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn log_summary(&self) {
        for unit in &self.skipped {
            tracing::info!(%unit, "skipped (output exists)");
        }
        for (unit, err) in &self.failed {
            tracing::error!(%unit, error = %err, "unit failed");
        }
        tracing::info!(
            completed = self.completed.len(),
            skipped = self.skipped.len(),
            failed = self.failed.len(),
            "crawl finished"
        );
    }

    pub fn ensure_complete(&self) -> anyhow::Result<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        let units = self
            .failed
            .iter()
            .map(|(unit, _)| unit.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("{} unit(s) failed: {units}", self.failed.len());
    }
}

/// Closes the browser, logs the report and decides the exit status.
///
/// `aborted` is the error that stopped the run early (cancellation, bad input).
pub async fn finish<S: Session + ?Sized>(
    session: &mut S,
    report: CrawlReport,
    aborted: Option<CrawlError>,
) -> anyhow::Result<()> {
    if let Err(err) = session.close().await {
        tracing::warn!(error = %err, "closing browser session failed");
    }
    report.log_summary();
    if let Some(err) = aborted {
        return Err(anyhow::Error::new(err));
    }
    report.ensure_complete()
}

pub async fn fetch_page<S: Session + ?Sized>(
    session: &mut S,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, CrawlError> {
    let mut attempts = Attempts::new(policy);
    loop {
        checkpoint(cancel)?;
        match load_page(session, url).await {
            Ok(html) => return Ok(html),
            Err(err) => {
                tracing::warn!(
                    url,
                    attempt = attempts.failures() + 1,
                    backoff_secs = policy.backoff.as_secs_f64(),
                    error = %err,
                    "page load failed; retrying"
                );
                attempts.fail(err.into())?;
                pause(cancel, policy.backoff).await?;
            }
        }
    }
}

pub async fn load_page<S: Session + ?Sized>(
    session: &mut S,
    url: &str,
) -> Result<String, SessionError> {
    session.navigate(url).await?;
    session.page_source().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_err() -> CrawlError {
        CrawlError::Session(SessionError::Other("stale element".to_owned()))
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let policy = RetryPolicy::unbounded(Duration::ZERO);
        let mut attempts = Attempts::new(&policy);
        for expected in 1..=1000 {
            assert_eq!(attempts.fail(session_err()).unwrap(), expected);
        }
    }

    #[test]
    fn bounded_policy_exhausts_at_ceiling() {
        let policy = RetryPolicy::bounded(3, Duration::ZERO);
        let mut attempts = Attempts::new(&policy);
        assert_eq!(attempts.fail(session_err()).unwrap(), 1);
        assert_eq!(attempts.fail(session_err()).unwrap(), 2);
        let err = attempts.fail(session_err()).unwrap_err();
        assert!(matches!(err, CrawlError::Exhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("stale element"));
    }

    #[test]
    fn only_page_level_failures_are_retryable() {
        assert!(session_err().is_retryable());
        assert!(
            CrawlError::EmptyResults {
                term: "Genesis 1".to_owned(),
                version: "KJV".to_owned()
            }
            .is_retryable()
        );
        assert!(!CrawlError::Cancelled.is_retryable());
        assert!(!CrawlError::InvalidInput("no terms".to_owned()).is_retryable());
    }

    #[tokio::test]
    async fn pause_returns_early_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        let result = pause(&cancel, Duration::from_secs(300)).await;
        assert!(matches!(result, Err(CrawlError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn report_fails_when_any_unit_failed() {
        let mut report = CrawlReport::default();
        assert!(report.ensure_complete().is_ok());
        report.failed.push((
            CrawlUnit::Book {
                book: "Genesis".to_owned(),
                version: "KJV".to_owned(),
            },
            session_err(),
        ));
        let err = report.ensure_complete().unwrap_err().to_string();
        assert!(err.contains("Genesis (KJV)"));
    }
}
