use crate::dom::element::ElementView;
use crate::dom::query::{Query, QueryKind};
use crate::dom::xpath::XPath;
use crate::errors::{AgentError, Result};
use ego_tree::NodeId;
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

/// Markup of one response plus its parsed tree.
///
/// Parsing happens on first access. Edits made through the mutation methods
/// live only in the parsed tree; [`Document::reset`] throws them away by
/// parsing the source again. Node ids are stable for a given source, so ids
/// taken before a reset still point at the equivalent node afterwards.
#[derive(Debug)]
pub struct Document {
    source: String,
    parsed: Option<Html>,
}

impl Document {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            parsed: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn reset(&mut self) {
        debug!("Re-parsing document ({} bytes)", self.source.len());
        self.parsed = Some(Html::parse_document(&self.source));
    }

    pub fn html(&mut self) -> &Html {
        self.html_mut()
    }

    fn html_mut(&mut self) -> &mut Html {
        let source = &self.source;
        self.parsed.get_or_insert_with(|| {
            debug!("Parsing document ({} bytes)", source.len());
            Html::parse_document(source)
        })
    }

    pub fn root_element(&mut self) -> NodeId {
        self.html().root_element().id()
    }

    pub fn view(&mut self, node: NodeId) -> Result<ElementView<'_>> {
        self.html()
            .tree
            .get(node)
            .and_then(ElementRef::wrap)
            .map(ElementView::new)
            .ok_or_else(|| stale(node))
    }

    /// Runs `query` against the whole document, or inside `scope` when given.
    /// Results are in document order.
    pub fn select(&mut self, query: &Query, scope: Option<NodeId>) -> Result<Vec<NodeId>> {
        let html = self.html();
        let context = scope.unwrap_or_else(|| html.root_element().id());
        let invalid = |reason: String| AgentError::InvalidSelector {
            query: query.to_string(),
            reason,
        };

        match query.kind() {
            QueryKind::Css => {
                let selector =
                    Selector::parse(query.as_str()).map_err(|e| invalid(format!("{:?}", e)))?;
                match scope {
                    Some(scope) => {
                        let element = html
                            .tree
                            .get(scope)
                            .and_then(ElementRef::wrap)
                            .ok_or_else(|| stale(scope))?;
                        Ok(element.select(&selector).map(|el| el.id()).collect())
                    }
                    None => Ok(html.select(&selector).map(|el| el.id()).collect()),
                }
            }
            QueryKind::XPath => {
                let xpath = XPath::parse(query.as_str()).map_err(invalid)?;
                if html.tree.get(context).is_none() {
                    return Err(stale(context));
                }
                xpath.select(&html.tree, context, query.vars()).map_err(invalid)
            }
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.with_element_mut(node, |element| put_attr(element, name, value))
    }

    /// Returns whether the attribute was present.
    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<bool> {
        self.with_element_mut(node, |element| {
            let before = element.attrs.len();
            element.attrs.retain(|key, _| &*key.local != name);
            let removed = element.attrs.len() != before;
            if removed {
                rebuild(element);
            }
            removed
        })
    }

    /// Replaces the children of `node` with a single text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<()> {
        let html = self.html_mut();
        let children: Vec<NodeId> = html
            .tree
            .get(node)
            .ok_or_else(|| stale(node))?
            .children()
            .map(|child| child.id())
            .collect();
        for child in children {
            if let Some(mut child) = html.tree.get_mut(child) {
                child.detach();
            }
        }
        let mut target = html.tree.get_mut(node).ok_or_else(|| stale(node))?;
        target.append(Node::Text(Text {
            text: StrTendril::from_slice(text),
        }));
        Ok(())
    }

    /// Appends a new `<tag>` element as the last child of `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId> {
        let fragment = Html::parse_fragment(&format!("<{0}></{0}>", tag));
        let mut element = fragment
            .tree
            .root()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == tag)
            .map(|el| el.value().clone())
            .ok_or_else(|| AgentError::InvalidValue {
                element: format!("<{}>", tag),
                reason: "cannot create an element with this tag".to_string(),
            })?;
        for (name, value) in attrs {
            put_attr(&mut element, name, value);
        }

        let html = self.html_mut();
        let mut parent_node = html.tree.get_mut(parent).ok_or_else(|| stale(parent))?;
        Ok(parent_node.append(Node::Element(element)).id())
    }

    /// Outer markup of one element, reflecting in-place edits.
    pub fn outer_html(&mut self, node: NodeId) -> Result<String> {
        Ok(self.view(node)?.underlying().html())
    }

    /// The whole document, reflecting in-place edits.
    pub fn to_html(&mut self) -> String {
        self.html().html()
    }

    fn with_element_mut<R>(
        &mut self,
        node: NodeId,
        edit: impl FnOnce(&mut Element) -> R,
    ) -> Result<R> {
        let html = self.html_mut();
        let mut target = html.tree.get_mut(node).ok_or_else(|| stale(node))?;
        match target.value() {
            Node::Element(element) => Ok(edit(element)),
            _ => Err(stale(node)),
        }
    }
}

fn put_attr(element: &mut Element, name: &str, value: &str) {
    // An existing key keeps its position in the attribute list
    let key = element
        .attrs
        .keys()
        .find(|key| &*key.local == name)
        .cloned()
        .unwrap_or_else(|| QualName::new(None, Namespace::from(""), LocalName::from(name)));
    element.attrs.insert(key, StrTendril::from_slice(value));
    rebuild(element);
}

/// Builds `element` afresh from its name and attributes. scraper caches
/// `id` and `class` on first use, and selectors match against that cache.
fn rebuild(element: &mut Element) {
    let attributes = element
        .attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    *element = Element::new(element.name.clone(), attributes);
}

fn stale(node: NodeId) -> AgentError {
    AgentError::StaleHandle {
        node: format!("{:?}", node),
    }
}
