use crate::actions::{BehaviorRegistry, SubmitContext};
use crate::browser::form::Form;
use crate::browser::page::Page;
use crate::dom::{ElementView, Query};
use crate::errors::Result;
use crate::types::FieldValue;
use ego_tree::NodeId;
use std::fmt;

/// One element of a page.
///
/// Handles are cheap to clone. Two handles are equal when they point at the
/// same node of the same page; element contents are never compared.
#[derive(Clone)]
pub struct ElementHandle {
    page: Page,
    node: NodeId,
}

impl ElementHandle {
    pub(crate) fn new(page: Page, node: NodeId) -> Self {
        Self { page, node }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Runs `f` against the element while the document is borrowed. `f` must
    /// not call back into the page.
    pub fn with_view<R>(&self, f: impl FnOnce(ElementView<'_>) -> R) -> Result<R> {
        self.page
            .with_document(|document| document.view(self.node).map(f))
    }

    pub fn tag_name(&self) -> Result<String> {
        self.with_view(|view| view.tag_name().to_string())
    }

    pub fn attr(&self, name: &str) -> Result<Option<String>> {
        self.with_view(|view| view.attr(name).map(str::to_string))
    }

    pub fn has_attr(&self, name: &str) -> Result<bool> {
        self.with_view(|view| view.has_attr(name))
    }

    pub fn set_attr(&self, name: &str, value: &str) -> Result<()> {
        self.page
            .with_document(|document| document.set_attr(self.node, name, value))
    }

    pub fn remove_attr(&self, name: &str) -> Result<bool> {
        self.page
            .with_document(|document| document.remove_attr(self.node, name))
    }

    /// Sets or clears a boolean attribute such as `checked`.
    pub fn set_flag(&self, name: &str, on: bool) -> Result<()> {
        if on {
            self.set_attr(name, name)
        } else {
            self.remove_attr(name).map(|_| ())
        }
    }

    /// The `name` attribute, if present and non-empty.
    pub fn name(&self) -> Result<Option<String>> {
        Ok(self.attr("name")?.filter(|name| !name.is_empty()))
    }

    pub fn text(&self) -> Result<String> {
        self.with_view(|view| view.text())
    }

    /// Replaces the element's children with `text`.
    pub fn set_text(&self, text: &str) -> Result<()> {
        self.page
            .with_document(|document| document.set_text(self.node, text))
    }

    /// Outer markup, including any edits made since the page was parsed.
    pub fn html(&self) -> Result<String> {
        self.page
            .with_document(|document| document.outer_html(self.node))
    }

    /// Text content with every run of whitespace collapsed to one space.
    pub fn striptags(&self) -> Result<String> {
        Ok(collapse_whitespace(&self.text()?))
    }

    pub fn contains_text(&self, needle: &str) -> Result<bool> {
        Ok(self.striptags()?.contains(needle))
    }

    pub fn describe(&self) -> Result<String> {
        self.with_view(|view| view.describe())
    }

    pub fn parent(&self) -> Result<Option<ElementHandle>> {
        let parent = self.with_view(|view| view.parent().map(|p| p.id()))?;
        Ok(parent.map(|node| self.page.handle(node)))
    }

    /// Nearest enclosing element called `tag`, not counting this one.
    pub fn closest(&self, tag: &str) -> Result<Option<ElementHandle>> {
        let found = self.with_view(|view| {
            view.ancestors()
                .find(|el| el.is(tag))
                .map(|el| el.id())
        })?;
        Ok(found.map(|node| self.page.handle(node)))
    }

    /// `disabled` on the element or on an enclosing `<fieldset>`.
    pub fn is_disabled(&self) -> Result<bool> {
        self.with_view(|view| {
            view.has_attr("disabled")
                || view
                    .ancestors()
                    .any(|el| el.is("fieldset") && el.has_attr("disabled"))
        })
    }

    /// Exactly one match inside this element.
    pub fn one(&self, query: impl Into<Query>) -> Result<ElementHandle> {
        self.page.select_one(&query.into(), Some(self.node))
    }

    pub fn all(&self, query: impl Into<Query>) -> Result<Vec<ElementHandle>> {
        self.page.select(&query.into(), Some(self.node))
    }

    /// Inputs of the same type and name in the same form (or, outside any
    /// form, in the same document), in document order. Includes `self`.
    pub fn group(&self) -> Result<Vec<ElementHandle>> {
        let nodes = self.page.with_document(|document| {
            let view = document.view(self.node)?;
            let name = view.name().unwrap_or_default();
            let kind = view.control_type();
            let form = view.enclosing_form();
            let scope = form.or_else(|| view.ancestors().last()).unwrap_or(view);
            Ok(scope
                .descendants()
                .filter(|el| el.is("input") && el.control_type() == kind)
                .filter(|el| el.name().unwrap_or_default() == name)
                .filter(|el| el.enclosing_form().map(|f| f.id()) == form.map(|f| f.id()))
                .map(|el| el.id())
                .collect::<Vec<_>>())
        })?;
        Ok(nodes.into_iter().map(|node| self.page.handle(node)).collect())
    }

    /// `<option>` descendants in document order, optgroups included.
    pub fn options(&self) -> Result<Vec<ElementHandle>> {
        let nodes = self.with_view(|view| {
            view.descendants()
                .filter(|el| el.is("option"))
                .map(|el| el.id())
                .collect::<Vec<_>>()
        })?;
        Ok(nodes.into_iter().map(|node| self.page.handle(node)).collect())
    }

    pub fn value(&self) -> Result<FieldValue> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.get_value, self)?;
        behavior(self)
    }

    pub fn set_value(&self, value: impl Into<FieldValue>) -> Result<()> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.set_value, self)?;
        behavior(self, value.into())
    }

    pub fn checked(&self) -> Result<bool> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.get_checked, self)?;
        behavior(self)
    }

    pub fn set_checked(&self, checked: bool) -> Result<()> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.set_checked, self)?;
        behavior(self, checked)
    }

    /// The pairs this element adds to a submission made with `clicked`.
    pub fn submit_contribution(
        &self,
        clicked: Option<&ElementHandle>,
    ) -> Result<Vec<(String, String)>> {
        let context = SubmitContext {
            clicked: clicked.map(|button| button.node),
        };
        self.contribution(&context)
    }

    pub(crate) fn contribution(&self, context: &SubmitContext) -> Result<Vec<(String, String)>> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.submit_contribution, self)?;
        behavior(self, context)
    }

    /// The form this element belongs to, or for a container its single form.
    pub fn form_element(&self) -> Result<ElementHandle> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.get_form, self)?;
        behavior(self)
    }

    pub fn form(&self) -> Result<Form> {
        Form::new(self.form_element()?)
    }

    pub fn submit(&self) -> Result<Page> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.submit, self)?;
        behavior(self)
    }

    pub fn click(&self) -> Result<Page> {
        let registry = self.page.registry();
        let behavior = BehaviorRegistry::dispatch(&registry.click, self)?;
        behavior(self)
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PartialEq for ElementHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && Page::ptr_eq(&self.page, &other.page)
    }
}

impl Eq for ElementHandle {}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let element = self
            .describe()
            .unwrap_or_else(|_| format!("{:?}", self.node));
        write!(f, "ElementHandle({} in {})", element, self.page.url())
    }
}
