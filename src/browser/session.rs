use crate::actions::BehaviorRegistry;
use crate::browser::navigation::NavigationManager;
use crate::browser::page::Page;
use crate::core::{Config, Transport};
use crate::errors::{AgentError, Result};
use crate::types::{Method, Request, Response};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};
use url::form_urlencoded;
use url::Url;

const CRLF: &str = "\r\n";

/// The test client: a transport, a behaviour registry and configuration,
/// shared by every page it produces.
#[derive(Clone)]
pub struct Agent {
    inner: Rc<AgentInner>,
}

struct AgentInner {
    transport: Box<dyn Transport>,
    registry: Rc<BehaviorRegistry>,
    config: Config,
}

impl Agent {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, Config::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: Config) -> Self {
        Self::with_registry(transport, config, BehaviorRegistry::with_defaults())
    }

    /// An agent whose elements behave according to `registry`.
    pub fn with_registry(
        transport: impl Transport + 'static,
        config: Config,
        registry: BehaviorRegistry,
    ) -> Self {
        Self {
            inner: Rc::new(AgentInner {
                transport: Box::new(transport),
                registry: Rc::new(registry),
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> Rc<BehaviorRegistry> {
        Rc::clone(&self.inner.registry)
    }

    pub fn base_url(&self) -> Result<Url> {
        let base = &self.inner.config.agent.base_url;
        Url::parse(base).map_err(|err| AgentError::invalid_url(base, err))
    }

    /// A request to `url`, resolved against the configured base URL.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let url = NavigationManager::resolve(&self.base_url()?, url)?;
        Ok(RequestBuilder::new(self.clone(), method, url))
    }

    pub fn get(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::Get, url)
    }

    pub fn post(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::Post, url)
    }

    /// Wraps `response` as a page fetched from `url`, without a round trip.
    pub fn page_from_response(&self, url: &str, response: Response) -> Result<Page> {
        let url = NavigationManager::resolve(&self.base_url()?, url)?;
        Ok(Page::new(
            self.clone(),
            Request::new(Method::Get, url),
            response,
            Vec::new(),
        ))
    }

    fn execute(&self, request: &Request) -> Result<Response> {
        debug!("{} {}", request.method, request.url);
        let response = self.inner.transport.send(request)?;
        debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.url,
            response.status,
            response.body.len()
        );
        Ok(response)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// A request being prepared. Nothing is sent until [`RequestBuilder::send`].
#[derive(Debug)]
pub struct RequestBuilder {
    agent: Agent,
    request: Request,
    origin: Option<Page>,
    record_history: bool,
    follow: bool,
    expected: Vec<u16>,
}

impl RequestBuilder {
    pub(crate) fn new(agent: Agent, method: Method, url: Url) -> Self {
        Self {
            agent,
            request: Request::new(method, url),
            origin: None,
            record_history: true,
            follow: false,
            expected: Vec::new(),
        }
    }

    /// Marks the request as made from `page`, which becomes part of the new
    /// page's history.
    pub(crate) fn from_page(mut self, page: Page) -> Self {
        self.origin = Some(page);
        self
    }

    pub(crate) fn record_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the query string with the encoded `pairs`.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        self.request.url.set_query(None);
        if !pairs.is_empty() {
            self.request
                .url
                .query_pairs_mut()
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
        }
        self
    }

    /// An `application/x-www-form-urlencoded` body.
    pub fn form<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();
        self.request.body = body.into_bytes();
        self.content_type("application/x-www-form-urlencoded")
    }

    /// A `multipart/form-data` body of `pairs` followed by `files`.
    pub fn multipart<K: AsRef<str>, V: AsRef<str>>(
        mut self,
        pairs: &[(K, V)],
        files: &[FileUpload],
    ) -> Self {
        let boundary = format!("----------------{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::new();
        for (name, value) in pairs {
            write_part_head(&mut body, &boundary);
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"{CRLF}{CRLF}",
                    name.as_ref()
                )
                .as_bytes(),
            );
            body.extend_from_slice(value.as_ref().as_bytes());
            body.extend_from_slice(CRLF.as_bytes());
        }
        for file in files {
            write_part_head(&mut body, &boundary);
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"{CRLF}Content-Type: {}{CRLF}{CRLF}",
                    file.name, file.filename, file.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(&file.data);
            body.extend_from_slice(CRLF.as_bytes());
        }
        body.extend_from_slice(format!("--{}--{CRLF}", boundary).as_bytes());
        self.request.body = body;
        self.content_type(&format!("multipart/form-data; boundary={}", boundary))
    }

    /// A raw body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Follow redirects after sending.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Accept `status` even if it is configured as an error status.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected.push(status);
        self
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }

    fn content_type(mut self, value: &str) -> Self {
        self.request
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("Content-Type"));
        self.request
            .headers
            .push(("Content-Type".to_string(), value.to_string()));
        self
    }

    pub fn send(self) -> Result<Page> {
        let RequestBuilder {
            agent,
            mut request,
            origin,
            record_history,
            follow,
            expected,
        } = self;

        let config = agent.config();
        for (name, value) in &config.agent.default_headers {
            if request.header(name).is_none() {
                request.headers.push((name.clone(), value.clone()));
            }
        }

        let response = agent.execute(&request)?;
        if config.navigation.error_statuses.contains(&response.status)
            && !expected.contains(&response.status)
        {
            warn!(
                "{} {} returned unexpected HTTP {}",
                request.method, request.url, response.status
            );
            return Err(AgentError::HttpStatus {
                status: response.status,
                method: request.method.to_string(),
                url: request.url.to_string(),
            });
        }

        let history = match origin {
            Some(page) if record_history && config.navigation.record_history => {
                let mut history = page.history().to_vec();
                history.push(page);
                history
            }
            Some(page) => page.history().to_vec(),
            None => Vec::new(),
        };

        let page = Page::new(agent.clone(), request, response, history);
        if follow {
            page.follow_all()
        } else {
            Ok(page)
        }
    }
}

fn write_part_head(body: &mut Vec<u8>, boundary: &str) {
    body.extend_from_slice(format!("--{}{CRLF}", boundary).as_bytes());
}
