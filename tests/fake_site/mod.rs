use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use verselex::session::{ElementHandle, Locator, Session, SessionError};
use verselex::verses::VerseSelectors;

const SEARCH_HANDLE: &str = "search-input";
const SELECT_HANDLE: &str = "version-select";
const CLOSE_HANDLE: &str = "close-button";
const LINK_PREFIX: &str = "link:";

pub const EMPTY_PAGE: &str = "<html><body></body></html>";

/// A browser stand-in that serves canned pages and records every call.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    /// Remaining navigation failures per url.
    flaky: HashMap<String, u32>,
    /// Urls whose navigation always fails.
    broken: Vec<String>,
    /// Result pages per `version|query`; the last one repeats once the queue drains.
    results: HashMap<String, VecDeque<String>>,
    /// Detail popups per result link href.
    details: HashMap<String, String>,
    selectors: Option<VerseSelectors>,

    current: String,
    last_results: String,
    version: Option<String>,
    input_text: Option<String>,
    cancel_on_navigate: Option<(usize, CancellationToken)>,
    navigations: usize,

    pub calls: Vec<String>,
    pub closed: bool,
}

#[allow(dead_code)]
impl FakeSite {
    pub fn new() -> Self {
        Self {
            current: EMPTY_PAGE.to_owned(),
            ..Self::default()
        }
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_owned(), html.to_owned());
        self
    }

    pub fn flaky(mut self, url: &str, failures: u32) -> Self {
        self.flaky.insert(url.to_owned(), failures);
        self
    }

    pub fn broken(mut self, url: &str) -> Self {
        self.broken.push(url.to_owned());
        self
    }

    /// Serves the verse search form at `home_url`.
    pub fn search_form(mut self, home_url: &str) -> Self {
        self.selectors = Some(VerseSelectors::default());
        self.pages.insert(home_url.to_owned(), "<form></form>".to_owned());
        self
    }

    pub fn results(mut self, version: &str, query: &str, pages: &[&str]) -> Self {
        self.results.insert(
            format!("{version}|{query}"),
            pages.iter().map(|page| (*page).to_owned()).collect(),
        );
        self
    }

    pub fn detail(mut self, href: &str, html: &str) -> Self {
        self.details.insert(href.to_owned(), html.to_owned());
        self
    }

    /// Cancels `token` as the `nth` navigation (1-based) starts.
    pub fn cancel_on_navigation(mut self, nth: usize, token: CancellationToken) -> Self {
        self.cancel_on_navigate = Some((nth, token));
        self
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|call| call.starts_with(prefix)).count()
    }

    pub fn navigated(&self, url: &str) -> bool {
        self.calls.iter().any(|call| call == &format!("navigate {url}"))
    }

    fn fail(detail: &str) -> SessionError {
        SessionError::Other(detail.to_owned())
    }
}

fn link_href(expr: &str) -> Option<String> {
    let inner = expr.strip_prefix("//a[@href=")?.strip_suffix(']')?;
    let unquoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(unquoted.to_owned())
}

#[async_trait]
impl Session for FakeSite {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.calls.push(format!("navigate {url}"));
        self.navigations += 1;
        if let Some((nth, token)) = &self.cancel_on_navigate
            && *nth == self.navigations
        {
            token.cancel();
        }

        if self.broken.iter().any(|broken| broken == url) {
            return Err(Self::fail("connection reset"));
        }
        if let Some(remaining) = self.flaky.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Self::fail("timeout"));
        }
        self.current = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| EMPTY_PAGE.to_owned());
        self.version = None;
        self.input_text = None;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.calls.push("page_source".to_owned());
        Ok(self.current.clone())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError> {
        self.calls.push(format!("find {}", locator.expr()));
        if let Some(selectors) = &self.selectors {
            if locator == &selectors.search_input {
                return Ok(ElementHandle::new(SEARCH_HANDLE));
            }
            if locator == &selectors.version_select {
                return Ok(ElementHandle::new(SELECT_HANDLE));
            }
            if locator == &selectors.close_button {
                return Ok(ElementHandle::new(CLOSE_HANDLE));
            }
        }
        if let Some(href) = link_href(locator.expr())
            && self.current.contains(&format!("href=\"{href}\""))
        {
            return Ok(ElementHandle::new(format!("{LINK_PREFIX}{href}")));
        }
        Err(SessionError::NoSuchElement(locator.clone()))
    }

    async fn fill_and_submit(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), SessionError> {
        self.calls.push(format!("submit {text}"));
        if element.id() != SEARCH_HANDLE {
            return Err(Self::fail("not a text input"));
        }
        let version = self.version.clone().unwrap_or_default();
        self.input_text = Some(text.to_owned());
        let page = match self.results.get_mut(&format!("{version}|{text}")) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => EMPTY_PAGE.to_owned(),
        };
        self.current = page.clone();
        self.last_results = page;
        Ok(())
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError> {
        self.calls.push(format!("select {value}"));
        if element.id() != SELECT_HANDLE {
            return Err(Self::fail("not a select"));
        }
        self.version = Some(value.to_owned());
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.calls.push(format!("click {}", element.id()));
        if element.id() == CLOSE_HANDLE {
            self.current = self.last_results.clone();
            return Ok(());
        }
        let href = element
            .id()
            .strip_prefix(LINK_PREFIX)
            .ok_or_else(|| Self::fail("not clickable"))?;
        self.current = self
            .details
            .get(href)
            .cloned()
            .ok_or_else(|| Self::fail("detail popup did not open"))?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), SessionError> {
        self.calls.push("refresh".to_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.calls.push("close".to_owned());
        self.closed = true;
        Ok(())
    }
}
