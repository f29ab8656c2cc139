use crate::actions::BehaviorRegistry;
use crate::browser::form::Form;
use crate::browser::handle::{collapse_whitespace, ElementHandle};
use crate::browser::navigation::NavigationManager;
use crate::browser::session::{Agent, RequestBuilder};
use crate::core::Config;
use crate::dom::{Document, Query};
use crate::errors::{AgentError, Result};
use crate::types::{Method, Request, Response};
use ego_tree::NodeId;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use url::Url;

/// One response from the application, with its parsed document.
///
/// `Page` is a shared handle: clones see the same document, so an edit made
/// through any [`ElementHandle`] is visible to every other handle of the page.
#[derive(Clone)]
pub struct Page {
    inner: Rc<PageInner>,
}

struct PageInner {
    agent: Agent,
    request: Request,
    response: Response,
    document: RefCell<Document>,
    // Extra fields set on forms, keyed by form node
    extras: RefCell<Vec<(NodeId, String, Vec<String>)>>,
    history: Vec<Page>,
}

impl Page {
    pub(crate) fn new(
        agent: Agent,
        request: Request,
        response: Response,
        history: Vec<Page>,
    ) -> Self {
        let document = Document::new(response.text());
        Self {
            inner: Rc::new(PageInner {
                agent,
                request,
                response,
                document: RefCell::new(document),
                extras: RefCell::new(Vec::new()),
                history,
            }),
        }
    }

    /// True when both handles refer to the same page.
    pub fn ptr_eq(a: &Page, b: &Page) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn agent(&self) -> &Agent {
        &self.inner.agent
    }

    pub fn config(&self) -> &Config {
        self.inner.agent.config()
    }

    pub fn registry(&self) -> Rc<BehaviorRegistry> {
        self.inner.agent.registry()
    }

    /// Borrows the document mutably for the duration of `f`.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> Result<R>) -> Result<R> {
        let mut document = self.inner.document.borrow_mut();
        f(&mut document)
    }

    pub fn handle(&self, node: NodeId) -> ElementHandle {
        ElementHandle::new(self.clone(), node)
    }

    // Response data

    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let url = NavigationManager::resolve_same_origin(self.url(), url)?;
        Ok(self.request_url(method, url))
    }

    pub(crate) fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        RequestBuilder::new(self.agent().clone(), method, url).from_page(self.clone())
    }

    /// A GET relative to this page. Other servers are refused.
    pub fn get(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::Get, url)
    }

    pub fn post(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::Post, url)
    }

    pub fn status(&self) -> u16 {
        self.inner.response.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.response.header(name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.response.headers
    }

    pub fn url(&self) -> &Url {
        &self.inner.request.url
    }

    pub fn method(&self) -> Method {
        self.inner.request.method
    }

    /// The request that produced this page.
    pub fn sent(&self) -> &Request {
        &self.inner.request
    }

    pub fn response(&self) -> &Response {
        &self.inner.response
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.response.body
    }

    pub fn text(&self) -> String {
        self.inner.response.text()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.body())?)
    }

    // Selection

    pub(crate) fn select(&self, query: &Query, scope: Option<NodeId>) -> Result<Vec<ElementHandle>> {
        let nodes = self.with_document(|document| document.select(query, scope))?;
        Ok(nodes.into_iter().map(|node| self.handle(node)).collect())
    }

    pub(crate) fn select_one(&self, query: &Query, scope: Option<NodeId>) -> Result<ElementHandle> {
        let mut found = self.select(query, scope)?;
        match found.len() {
            0 => Err(AgentError::NoMatch {
                query: query.to_string(),
            }),
            1 => Ok(found.remove(0)),
            count => Err(AgentError::AmbiguousMatch {
                query: query.to_string(),
                count,
            }),
        }
    }

    /// The single element matching `query`.
    pub fn one(&self, query: impl Into<Query>) -> Result<ElementHandle> {
        self.select_one(&query.into(), None)
    }

    /// Every match in document order. No match is an empty list.
    pub fn all(&self, query: impl Into<Query>) -> Result<Vec<ElementHandle>> {
        self.select(&query.into(), None)
    }

    /// True when exactly one element matches.
    pub fn has_one(&self, query: impl Into<Query>) -> Result<bool> {
        Ok(self.all(query)?.len() == 1)
    }

    /// True when the page's text contains `text`.
    pub fn has_text(&self, text: &str) -> Result<bool> {
        Ok(self.striptags()?.contains(&collapse_whitespace(text)))
    }

    /// The document element.
    pub fn root(&self) -> Result<ElementHandle> {
        let node = self.with_document(|document| Ok(document.root_element()))?;
        Ok(self.handle(node))
    }

    // Forms

    /// The page's only form.
    pub fn form(&self) -> Result<Form> {
        Form::new(self.one(Query::css("form"))?)
    }

    pub fn form_at(&self, index: usize) -> Result<Form> {
        let form = self
            .all(Query::css("form"))?
            .into_iter()
            .nth(index)
            .ok_or_else(|| AgentError::NoMatch {
                query: format!("form[{}]", index),
            })?;
        Form::new(form)
    }

    pub fn forms(&self) -> Result<Vec<Form>> {
        self.all(Query::css("form"))?
            .into_iter()
            .map(Form::new)
            .collect()
    }

    pub(crate) fn set_extra(&self, form: NodeId, name: &str, values: Vec<String>) {
        let mut extras = self.inner.extras.borrow_mut();
        extras.retain(|(node, existing, _)| !(*node == form && existing == name));
        extras.push((form, name.to_string(), values));
    }

    pub(crate) fn extras(&self, form: NodeId) -> Vec<(String, String)> {
        self.inner
            .extras
            .borrow()
            .iter()
            .filter(|(node, _, _)| *node == form)
            .flat_map(|(_, name, values)| {
                values
                    .iter()
                    .map(move |value| (name.clone(), value.clone()))
            })
            .collect()
    }

    // Navigation

    /// Clicks the single element matching `query`.
    pub fn click(&self, query: impl Into<Query>) -> Result<Page> {
        self.one(query)?.click()
    }

    /// Clicks the `index`th match of `query`.
    pub fn click_nth(&self, query: impl Into<Query>, index: usize) -> Result<Page> {
        let query = query.into();
        let target = self
            .all(query.clone())?
            .into_iter()
            .nth(index)
            .ok_or_else(|| AgentError::NoMatch {
                query: format!("{}[{}]", query, index),
            })?;
        target.click()
    }

    /// Clicks the single link whose text is `text`.
    pub fn click_link(&self, text: &str) -> Result<Page> {
        let wanted = collapse_whitespace(text);
        let mut links = Vec::new();
        for link in self.all(Query::css("a[href]"))? {
            if link.striptags()? == wanted {
                links.push(link);
            }
        }
        let query = format!("link {:?}", wanted);
        match links.len() {
            0 => Err(AgentError::NoMatch { query }),
            1 => links[0].click(),
            count => Err(AgentError::AmbiguousMatch { query, count }),
        }
    }

    pub fn follow(&self) -> Result<Page> {
        NavigationManager::follow(self)
    }

    pub fn follow_all(&self) -> Result<Page> {
        NavigationManager::follow_all(self)
    }

    /// Pages visited before this one, oldest first.
    pub fn history(&self) -> &[Page] {
        &self.inner.history
    }

    /// The page `steps` navigations back.
    pub fn back(&self, steps: usize) -> Result<Page> {
        let history = self.history();
        if steps == 0 || steps > history.len() {
            return Err(AgentError::NoMatch {
                query: format!("back({})", steps),
            });
        }
        Ok(history[history.len() - steps].clone())
    }

    // Document

    /// Re-parses the response body, abandoning edits and extra form fields.
    pub fn reset(&self) {
        debug!("Resetting document for {}", self.url());
        self.inner.document.borrow_mut().reset();
        self.inner.extras.borrow_mut().clear();
    }

    /// Runs `f`, then resets the page whatever `f` returned.
    pub fn scoped<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        let result = f(self);
        self.reset();
        result
    }

    /// The current markup, edits included.
    pub fn html(&self) -> String {
        self.inner.document.borrow_mut().to_html()
    }

    /// Text of the whole document with whitespace collapsed.
    pub fn striptags(&self) -> Result<String> {
        self.root()?.striptags()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("method", &self.method())
            .field("url", &self.url().as_str())
            .field("status", &self.status())
            .finish()
    }
}
