use ego_tree::NodeId;
use scraper::ElementRef;

/// Read-only view of one element in a parsed document.
///
/// This is the whole surface behaviour predicates and implementations get to
/// see: tag name, attributes, text and tree navigation. Code that needs the
/// parser's own node type goes through [`ElementView::underlying`].
#[derive(Debug, Clone, Copy)]
pub struct ElementView<'a> {
    inner: ElementRef<'a>,
}

impl<'a> ElementView<'a> {
    pub(crate) fn new(inner: ElementRef<'a>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    /// Lower-case local name, e.g. `input`.
    pub fn tag_name(&self) -> &'a str {
        self.inner.value().name()
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag_name().eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.inner.value().attr(name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.inner.value().attrs()
    }

    pub fn name(&self) -> Option<&'a str> {
        self.attr("name")
    }

    /// The `type` of an `input` or `button`, lower-cased and defaulted the way
    /// HTML does (`text` for inputs, `submit` for buttons). Empty for other
    /// elements.
    pub fn control_type(&self) -> String {
        let declared = self.attr("type").map(|t| t.trim().to_ascii_lowercase());
        match (self.tag_name(), declared) {
            ("input", Some(t)) if !t.is_empty() => t,
            ("input", _) => "text".to_string(),
            ("button", Some(t)) if !t.is_empty() => t,
            ("button", _) => "submit".to_string(),
            _ => String::new(),
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        self.inner.text().collect()
    }

    pub fn parent(&self) -> Option<ElementView<'a>> {
        self.inner
            .parent()
            .and_then(ElementRef::wrap)
            .map(ElementView::new)
    }

    pub fn children(&self) -> impl Iterator<Item = ElementView<'a>> + 'a {
        self.inner
            .children()
            .filter_map(ElementRef::wrap)
            .map(ElementView::new)
    }

    /// Enclosing elements, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = ElementView<'a>> + 'a {
        self.inner
            .ancestors()
            .filter_map(ElementRef::wrap)
            .map(ElementView::new)
    }

    /// Descendant elements in document order, not including `self`.
    pub fn descendants(&self) -> impl Iterator<Item = ElementView<'a>> + 'a {
        self.inner
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .map(ElementView::new)
    }

    /// Nearest enclosing `<form>`, not counting `self`.
    pub fn enclosing_form(&self) -> Option<ElementView<'a>> {
        self.ancestors().find(|el| el.is("form"))
    }

    pub fn underlying(&self) -> ElementRef<'a> {
        self.inner
    }

    /// Short start-tag rendering used in error messages.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag_name());
        for key in ["id", "type", "name", "value", "href"] {
            if let Some(value) = self.attr(key) {
                out.push_str(&format!(" {}=\"{}\"", key, value));
            }
        }
        out.push('>');
        out
    }
}
