use std::fmt;

use async_trait::async_trait;

pub mod webdriver;

pub use webdriver::{Browser, WebDriverSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// Expressions starting with `/` or `(` are XPath, anything else is CSS.
    pub fn parse(expr: &str) -> Self {
        let trimmed = expr.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('(') {
            Locator::xpath(trimmed)
        } else {
            Locator::css(trimmed)
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    pub fn expr(&self) -> &str {
        match self {
            Locator::Css(expr) | Locator::XPath(expr) => expr,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.strategy(), self.expr())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Transient automation failure. The crawl layer retries every variant.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{method} {endpoint}: {source}")]
    Transport {
        method: String,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status} ({error}): {message}")]
    Protocol {
        endpoint: String,
        status: u16,
        error: String,
        message: String,
    },

    #[error("no element matches {0}")]
    NoSuchElement(Locator),

    #[error("malformed response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },

    #[error("{0}")]
    Other(String),
}

/// A single browser tab. Every call fully replaces or reads the current page state;
/// `&mut self` keeps one crawl driving it at a time.
#[async_trait]
pub trait Session: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    async fn page_source(&mut self) -> Result<String, SessionError>;

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError>;

    /// Clears the field, types `text` and presses Enter.
    async fn fill_and_submit(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), SessionError>;

    /// Picks the `<option>` of a `<select>` whose value is exactly `value`.
    async fn select_option(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn refresh(&mut self) -> Result<(), SessionError>;

    async fn close(&mut self) -> Result<(), SessionError>;
}
