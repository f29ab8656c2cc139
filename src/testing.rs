use crate::actions::BehaviorRegistry;
use crate::browser::{Agent, Page};
use crate::core::{Config, Transport};
use crate::errors::{AgentError, Result};
use crate::types::{Method, Request, Response};
use regex::Regex;
use tracing_subscriber::EnvFilter;

type Handler = Box<dyn Fn(&Request) -> Result<Response>>;

struct Route {
    method: Method,
    // A bad pattern is reported when a request reaches the route
    pattern: std::result::Result<Regex, regex::Error>,
    handler: Handler,
}

/// An in-process application to point an [`Agent`] at.
///
/// Routes match the request path against an anchored regular expression.
/// A path no route matches gets a 404, and a path matched only for other
/// methods gets a 405.
#[derive(Default)]
pub struct MockApp {
    routes: Vec<Route>,
}

impl MockApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&Request) -> Result<Response> + 'static,
    ) -> Self {
        self.routes.push(Route {
            method,
            pattern: Regex::new(&format!("^{}$", pattern)),
            handler: Box::new(handler),
        });
        self
    }

    /// Serves `html` for GET requests to `path`.
    pub fn page(self, path: &str, html: &str) -> Self {
        let html = html.to_string();
        self.route(Method::Get, &regex::escape(path), move |_| {
            Ok(Response::html(html.clone()))
        })
    }

    /// Answers GET requests to `path` with a 302 to `location`.
    pub fn redirect(self, path: &str, location: &str) -> Self {
        let location = location.to_string();
        self.route(Method::Get, &regex::escape(path), move |_| {
            Ok(Response::redirect(location.clone()))
        })
    }

    pub fn into_agent(self) -> Agent {
        Agent::new(self)
    }

    pub fn into_agent_with(self, config: Config) -> Agent {
        Agent::with_config(self, config)
    }
}

impl Transport for MockApp {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut path_matched = false;
        for route in &self.routes {
            let pattern = route
                .pattern
                .as_ref()
                .map_err(|err| AgentError::Transport(format!("bad route pattern: {}", err)))?;
            if !pattern.is_match(request.path()) {
                continue;
            }
            if route.method == request.method {
                return (route.handler)(request);
            }
            path_matched = true;
        }
        Ok(Response::new(if path_matched { 405 } else { 404 }))
    }
}

/// A handler that lists the submitted form pairs, in order, as
/// `<pre id="echo">name:value; ...</pre>`.
pub fn echo_form(request: &Request) -> Result<Response> {
    let pairs = request
        .form_pairs()
        .into_iter()
        .map(|(name, value)| format!("{}:{}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    Ok(Response::html(format!(
        "<pre id=\"echo\">{}</pre>",
        escape(&pairs)
    )))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub struct TestHelper;

impl TestHelper {
    /// A page at `http://localhost/` holding `html`. Requests made from it
    /// all get 404s.
    pub fn page(html: &str) -> Page {
        Self::page_at("http://localhost/", html)
    }

    pub fn page_at(url: &str, html: &str) -> Page {
        Self::page_from(MockApp::new().into_agent(), url, html)
    }

    pub fn page_with_registry(html: &str, registry: BehaviorRegistry) -> Page {
        let agent = Agent::with_registry(MockApp::new(), Config::default(), registry);
        Self::page_from(agent, "http://localhost/", html)
    }

    fn page_from(agent: Agent, url: &str, html: &str) -> Page {
        match agent.page_from_response(url, Response::html(html)) {
            Ok(page) => page,
            Err(err) => panic!("cannot build test page at {}: {}", url, err),
        }
    }

    /// Installs a fmt subscriber filtered by `RUST_LOG`. Safe to call from
    /// every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}
