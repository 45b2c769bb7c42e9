use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ElementHandle, Locator, Session, SessionError};
use crate::config::WebDriverConfig;

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const ENTER_KEY: char = '\u{E007}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    fn capabilities(self, headless: bool) -> Value {
        match self {
            Browser::Chrome => {
                let mut args = vec!["--disable-gpu", "--window-size=1920,1080"];
                if headless {
                    args.push("--headless=new");
                }
                json!({ "browserName": "chrome", "goog:chromeOptions": { "args": args } })
            }
            Browser::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { Vec::new() };
                json!({ "browserName": "firefox", "moz:firefoxOptions": { "args": args } })
            }
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Browser::Chrome => f.write_str("chrome"),
            Browser::Firefox => f.write_str("firefox"),
        }
    }
}

/// A browser session driven over the W3C WebDriver HTTP protocol (chromedriver, geckodriver).
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
}

impl WebDriverSession {
    pub async fn start(
        endpoint: &str,
        browser: Browser,
        headless: bool,
        request_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| SessionError::Other(format!("build webdriver http client: {err}")))?;

        let sessions_url = format!("{}/session", endpoint.trim_end_matches('/'));
        let body = json!({
            "capabilities": { "alwaysMatch": browser.capabilities(headless) }
        });
        let value = send(&client, Method::POST, &sessions_url, Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Malformed {
                endpoint: sessions_url.clone(),
                detail: "missing sessionId".to_owned(),
            })?;

        tracing::info!(%browser, headless, session_id, "webdriver session started");
        Ok(Self {
            session_url: format!("{sessions_url}/{session_id}"),
            client,
        })
    }

    pub async fn connect(config: &WebDriverConfig) -> Result<Self, SessionError> {
        Self::start(
            &config.url,
            config.browser,
            config.headless,
            config.request_timeout(),
        )
        .await
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let endpoint = format!("{}{path}", self.session_url);
        send(&self.client, method, &endpoint, body).await
    }

    async fn find_from(
        &self,
        path: &str,
        locator: &Locator,
    ) -> Result<ElementHandle, SessionError> {
        let body = json!({ "using": locator.strategy(), "value": locator.expr() });
        let value = match self.command(Method::POST, path, Some(body)).await {
            Ok(value) => value,
            Err(SessionError::Protocol { error, .. }) if error == "no such element" => {
                return Err(SessionError::NoSuchElement(locator.clone()));
            }
            Err(err) => return Err(err),
        };
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(ElementHandle::new)
            .ok_or_else(|| SessionError::Malformed {
                endpoint: format!("{}{path}", self.session_url),
                detail: format!("no element reference in {value}"),
            })
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        let value = self.command(Method::GET, "/source", None).await?;
        match value {
            Value::String(source) => Ok(source),
            other => Err(SessionError::Malformed {
                endpoint: format!("{}/source", self.session_url),
                detail: format!("expected string, got {other}"),
            }),
        }
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle, SessionError> {
        self.find_from("/element", locator).await
    }

    async fn fill_and_submit(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), SessionError> {
        let path = format!("/element/{}", element.id());
        self.command(Method::POST, &format!("{path}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("{path}/value"),
            Some(json!({ "text": format!("{text}{ENTER_KEY}") })),
        )
        .await?;
        Ok(())
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), SessionError> {
        let option = Locator::css(format!("option[value=\"{}\"]", css_string_escape(value)));
        let handle = self
            .find_from(&format!("/element/{}/element", element.id()), &option)
            .await?;
        self.click(&handle).await
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.id()),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), SessionError> {
        self.command(Method::POST, "/refresh", Some(json!({})))
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        send(&self.client, Method::DELETE, &self.session_url, None).await?;
        tracing::info!("webdriver session closed");
        Ok(())
    }
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
) -> Result<Value, SessionError> {
    let transport = |source| SessionError::Transport {
        method: method.as_str().to_owned(),
        endpoint: endpoint.to_owned(),
        source,
    };

    let mut request = client.request(method.clone(), endpoint);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let raw = response.text().await.map_err(transport)?;

    let parsed: Value = serde_json::from_str(&raw).map_err(|err| SessionError::Malformed {
        endpoint: endpoint.to_owned(),
        detail: format!("{err}: {raw}"),
    })?;
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        return Err(SessionError::Protocol {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            error: field("error"),
            message: field("message"),
        });
    }

    tracing::trace!(%method, endpoint, "webdriver command ok");
    Ok(value)
}

fn css_string_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
