use crate::browser::page::Page;
use crate::errors::{AgentError, Result};
use crate::types::Method;
use tracing::debug;
use url::Url;

pub struct NavigationManager;

/// Where a redirect chain stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectState {
    /// The last response was a redirect; `hops` redirects followed so far.
    Following { hops: usize },
    /// A non-redirect response was reached. Never left once entered.
    Terminal,
}

impl RedirectState {
    pub fn start(page: &Page) -> Self {
        if page.response().is_redirect() {
            RedirectState::Following { hops: 0 }
        } else {
            RedirectState::Terminal
        }
    }

    /// The state after `page` was fetched as hop number `hops`.
    pub fn advance(self, page: &Page, hops: usize) -> Self {
        match self {
            RedirectState::Terminal => RedirectState::Terminal,
            RedirectState::Following { .. } if page.response().is_redirect() => {
                RedirectState::Following { hops }
            }
            RedirectState::Following { .. } => RedirectState::Terminal,
        }
    }
}

impl NavigationManager {
    /// Joins `target` onto `base` and drops any fragment.
    pub fn resolve(base: &Url, target: &str) -> Result<Url> {
        let mut url = base
            .join(target)
            .map_err(|err| AgentError::invalid_url(target, err))?;
        url.set_fragment(None);
        Ok(url)
    }

    /// Like [`NavigationManager::resolve`], but the result must share scheme,
    /// host and port with `base`.
    pub fn resolve_same_origin(base: &Url, target: &str) -> Result<Url> {
        let url = Self::resolve(base, target)?;
        if !Self::same_origin(base, &url) {
            return Err(AgentError::CrossOrigin {
                url: url.to_string(),
            });
        }
        Ok(url)
    }

    pub fn same_origin(a: &Url, b: &Url) -> bool {
        a.scheme() == b.scheme()
            && a.host_str() == b.host_str()
            && a.port_or_known_default() == b.port_or_known_default()
    }

    /// Resolved `Location` of a redirect response.
    pub fn redirect_target(page: &Page) -> Result<Url> {
        let response = page.response();
        if !response.is_redirect() {
            return Err(AgentError::NotRedirect {
                status: response.status,
                method: page.method().to_string(),
                url: page.url().to_string(),
            });
        }
        let location = response.header("Location").ok_or_else(|| {
            AgentError::Transport(format!(
                "{} response for {} has no Location header",
                response.status,
                page.url()
            ))
        })?;
        Self::resolve_same_origin(page.url(), location)
    }

    /// GETs the target of a redirect response. The hop is not recorded in
    /// history.
    pub fn follow(page: &Page) -> Result<Page> {
        let target = Self::redirect_target(page)?;
        debug!("Following {} redirect: {} -> {}", page.status(), page.url(), target);
        page.request_url(Method::Get, target)
            .record_history(false)
            .send()
    }

    /// Follows redirects until a non-redirect response, which is returned.
    /// A page that is not a redirect comes back as is.
    pub fn follow_all(page: &Page) -> Result<Page> {
        let limit = page.config().navigation.max_redirects;
        let mut current = page.clone();
        let mut state = RedirectState::start(&current);
        loop {
            match state {
                RedirectState::Terminal => return Ok(current),
                RedirectState::Following { hops } => {
                    if hops >= limit {
                        return Err(AgentError::TooManyRedirects {
                            limit,
                            url: current.url().to_string(),
                        });
                    }
                    current = Self::follow(&current)?;
                    state = state.advance(&current, hops + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::testing::MockApp;
    use crate::types::Response;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_drops_fragment() {
        let base = url("http://localhost/a/b");
        assert_eq!(
            NavigationManager::resolve(&base, "c#top").unwrap().as_str(),
            "http://localhost/a/c"
        );
        assert_eq!(
            NavigationManager::resolve(&base, "/x?y=1").unwrap().as_str(),
            "http://localhost/x?y=1"
        );
    }

    #[test]
    fn test_same_origin_checks_scheme_host_and_port() {
        let base = url("http://localhost/foo");
        assert!(NavigationManager::resolve_same_origin(&base, "http://localhost:80/bar").is_ok());
        for other in [
            "http://example.org/bar",
            "https://localhost/bar",
            "http://localhost:8080/bar",
        ] {
            assert!(matches!(
                NavigationManager::resolve_same_origin(&base, other).unwrap_err(),
                AgentError::CrossOrigin { .. }
            ));
        }
    }

    #[test]
    fn test_redirect_state_machine() {
        let app = MockApp::new()
            .redirect("/a", "/b")
            .page("/b", "<p>done</p>");
        let agent = app.into_agent();
        let redirect = agent.get("/a").unwrap().send().unwrap();
        let done = agent.get("/b").unwrap().send().unwrap();

        let state = RedirectState::start(&redirect);
        assert_eq!(state, RedirectState::Following { hops: 0 });
        assert_eq!(state.advance(&redirect, 1), RedirectState::Following { hops: 1 });
        assert_eq!(state.advance(&done, 1), RedirectState::Terminal);
        assert_eq!(RedirectState::Terminal.advance(&redirect, 2), RedirectState::Terminal);
        assert_eq!(RedirectState::start(&done), RedirectState::Terminal);
    }

    #[test]
    fn test_follow_requires_redirect() {
        let agent = MockApp::new().page("/", "<p>home</p>").into_agent();
        let page = agent.get("/").unwrap().send().unwrap();
        match page.follow().unwrap_err() {
            AgentError::NotRedirect { status, method, url } => {
                assert_eq!(status, 200);
                assert_eq!(method, "GET");
                assert_eq!(url, "http://localhost/");
            }
            other => panic!("unexpected {:?}", other),
        }
        // follow_all on a terminal page is the page itself
        assert!(Page::ptr_eq(&page.follow_all().unwrap(), &page));
    }

    #[test]
    fn test_follow_chain_without_history() {
        let agent = MockApp::new()
            .page("/", "<p>home</p>")
            .redirect("/one", "/two")
            .redirect("/two", "/three#frag")
            .page("/three", "<p>three</p>")
            .into_agent();
        let home = agent.get("/").unwrap().send().unwrap();
        let redirect = home.get("/one").unwrap().send().unwrap();
        assert_eq!(redirect.status(), 302);

        let once = redirect.follow().unwrap();
        assert_eq!(once.url().path(), "/two");
        let last = redirect.follow_all().unwrap();
        assert_eq!(last.url().as_str(), "http://localhost/three");
        assert!(last.has_text("three").unwrap());
        // hops inherit the history of the page that started the chain
        assert_eq!(last.history().len(), redirect.history().len());
    }

    #[test]
    fn test_redirect_limit() {
        let config = Config::default();
        let mut limited = config.clone();
        limited.navigation.max_redirects = 2;
        let app = || {
            MockApp::new()
                .redirect("/r1", "/r2")
                .redirect("/r2", "/r3")
                .redirect("/r3", "/end")
                .page("/end", "end")
        };

        let page = app().into_agent_with(limited).get("/r1").unwrap().send().unwrap();
        match page.follow_all().unwrap_err() {
            AgentError::TooManyRedirects { limit, url } => {
                assert_eq!(limit, 2);
                assert_eq!(url, "http://localhost/r3");
            }
            other => panic!("unexpected {:?}", other),
        }

        let page = app().into_agent_with(config).get("/r1").unwrap().send().unwrap();
        assert_eq!(page.follow_all().unwrap().url().path(), "/end");
    }

    #[test]
    fn test_cross_origin_redirect_and_missing_location() {
        let agent = MockApp::new()
            .redirect("/away", "http://example.org/")
            .route(Method::Get, "/broken", |_| Ok(Response::new(301)))
            .into_agent();
        let away = agent.get("/away").unwrap().send().unwrap();
        assert!(matches!(
            away.follow().unwrap_err(),
            AgentError::CrossOrigin { .. }
        ));
        let broken = agent.get("/broken").unwrap().send().unwrap();
        assert!(matches!(
            broken.follow().unwrap_err(),
            AgentError::Transport(_)
        ));
    }
}
