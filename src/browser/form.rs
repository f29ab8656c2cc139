use crate::actions::builtin::option_text_value;
use crate::actions::{predicates, SubmitContext};
use crate::browser::handle::{collapse_whitespace, ElementHandle};
use crate::browser::navigation::NavigationManager;
use crate::browser::page::Page;
use crate::dom::Query;
use crate::errors::{AgentError, Result};
use crate::types::{FieldValue, Method};
use tracing::debug;
use url::Url;

/// A `<form>` element and the operations that fill and submit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    element: ElementHandle,
}

/// How a form body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    UrlEncoded,
    Multipart,
}

impl Form {
    pub fn new(element: ElementHandle) -> Result<Self> {
        if element.tag_name()? != "form" {
            return Err(AgentError::InvalidValue {
                element: element.describe()?,
                reason: "not a <form> element".to_string(),
            });
        }
        Ok(Self { element })
    }

    pub fn element(&self) -> &ElementHandle {
        &self.element
    }

    pub fn page(&self) -> &Page {
        self.element.page()
    }

    pub fn method(&self) -> Result<Method> {
        Ok(Method::from_form_attr(self.element.attr("method")?.as_deref()))
    }

    pub fn encoding(&self) -> Result<Encoding> {
        let enctype = self.element.attr("enctype")?.unwrap_or_default();
        if enctype.trim().eq_ignore_ascii_case("multipart/form-data") {
            Ok(Encoding::Multipart)
        } else {
            Ok(Encoding::UrlEncoded)
        }
    }

    /// The `action` resolved against the page. Missing or empty means the
    /// page's own URL.
    pub fn action(&self) -> Result<Url> {
        let page_url = self.page().url();
        match self.element.attr("action")? {
            Some(action) if !action.trim().is_empty() => {
                NavigationManager::resolve_same_origin(page_url, action.trim())
            }
            _ => Ok(page_url.clone()),
        }
    }

    /// `input`, `textarea`, `select` and `button` elements owned by this form,
    /// in document order. Controls of a nested form are left out.
    pub fn controls(&self) -> Result<Vec<ElementHandle>> {
        let form = self.element.node();
        let nodes = self.element.with_view(|view| {
            view.descendants()
                .filter(|el| matches!(el.tag_name(), "input" | "textarea" | "select" | "button"))
                .filter(|el| el.enclosing_form().map(|f| f.id()) == Some(form))
                .map(|el| el.id())
                .collect::<Vec<_>>()
        })?;
        Ok(nodes
            .into_iter()
            .map(|node| self.page().handle(node))
            .collect())
    }

    /// Controls named `name`, in document order. May be empty.
    pub fn fields(&self, name: &str) -> Result<Vec<ElementHandle>> {
        let mut fields = Vec::new();
        for control in self.controls()? {
            if control.name()?.as_deref() == Some(name) {
                fields.push(control);
            }
        }
        Ok(fields)
    }

    pub fn field(&self, name: &str) -> Result<ElementHandle> {
        self.fields(name)?
            .into_iter()
            .next()
            .ok_or_else(|| field_not_found(name))
    }

    /// Aggregate value of the field(s) called `name`: checked values of a
    /// checkbox group, the checked value of a radio group, otherwise the first
    /// field's value.
    pub fn value(&self, name: &str) -> Result<FieldValue> {
        let fields = self.fields(name)?;
        let first = fields.first().ok_or_else(|| field_not_found(name))?;
        let kind = first.with_view(|view| view.control_type())?;
        if kind != "checkbox" {
            return first.value();
        }
        let mut values = Vec::new();
        for field in &fields {
            values.extend(field.value()?.into_list());
        }
        Ok(FieldValue::List(values))
    }

    /// Sets an existing field. Unknown names are an error.
    pub fn set_value(&self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.field(name)?.set_value(value)
    }

    /// Sets an existing field, or records an extra hidden field that only
    /// appears in the submitted payload. Extras are dropped by
    /// [`Page::reset`].
    pub fn set(&self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        if let Some(field) = self.fields(name)?.into_iter().next() {
            return field.set_value(value);
        }
        let values = match value {
            FieldValue::Empty => vec![String::new()],
            FieldValue::Bool(_) => {
                return Err(AgentError::InvalidValue {
                    element: format!("extra field {:?}", name),
                    reason: "extra fields take text values".to_string(),
                })
            }
            other => other.into_list(),
        };
        debug!("Recording extra field {:?} on form", name);
        self.page().set_extra(self.element.node(), name, values);
        Ok(())
    }

    /// Sets several fields by name. A list given for a name shared by several
    /// plain fields is spread over them in document order.
    pub fn fill<I, K, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        for (name, value) in values {
            let name = name.as_ref();
            let fields = self.fields(name)?;
            if fields.is_empty() {
                return Err(field_not_found(name));
            }
            match value.into() {
                FieldValue::List(items) if fields.len() > 1 && all_plain(&fields)? => {
                    for (field, item) in fields.iter().zip(items) {
                        field.set_value(item)?;
                    }
                }
                value => fields[0].set_value(value)?,
            }
        }
        Ok(())
    }

    /// Sets fields located by query. Each query must match exactly one
    /// element inside the form.
    pub fn fill_by<I, Q, V>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (Q, V)>,
        Q: Into<Query>,
        V: Into<FieldValue>,
    {
        for (query, value) in values {
            self.element.one(query)?.set_value(value)?;
        }
        Ok(())
    }

    /// Toggles the checkbox or radio labelled `label_text`.
    pub fn check(&self, label_text: &str) -> Result<()> {
        let wanted = collapse_whitespace(label_text);
        let mut labels = Vec::new();
        for label in self.page().all(Query::css("label"))? {
            if label.striptags()? == wanted {
                labels.push(label);
            }
        }
        let query = format!("label {:?}", wanted);
        let label = match labels.len() {
            0 => return Err(AgentError::NoMatch { query }),
            1 => labels.remove(0),
            count => return Err(AgentError::AmbiguousMatch { query, count }),
        };

        let target = match label.attr("for")? {
            Some(id) if !id.is_empty() => self
                .page()
                .one(Query::xpath("//*[@id=$id]").bind("id", id))?,
            _ => label.one(Query::css("input[type=checkbox], input[type=radio]"))?,
        };
        let checkable = target.with_view(|view| {
            view.is("input") && matches!(view.control_type().as_str(), "checkbox" | "radio")
        })?;
        if !checkable {
            return Err(AgentError::InvalidValue {
                element: target.describe()?,
                reason: format!("{} does not label a checkbox or radio", query),
            });
        }
        let checked = target.checked()?;
        target.set_checked(!checked)
    }

    /// Selects `value` in the `<select>` called `name`. With `force`, an
    /// option is added first when none has that value.
    pub fn select(&self, name: &str, value: &str, force: bool) -> Result<()> {
        let select = self.select_field(name)?;
        let mut target = None;
        for option in select.options()? {
            if option_text_value(&option)? == value {
                target = Some(option);
                break;
            }
        }
        let option = match target {
            Some(option) => option,
            None if force => {
                debug!("Adding option {:?} to select {:?}", value, name);
                let node = self.page().with_document(|document| {
                    let node = document.append_element(select.node(), "option", &[("value", value)])?;
                    document.set_text(node, value)?;
                    Ok(node)
                })?;
                self.page().handle(node)
            }
            None => {
                return Err(AgentError::ValueNotFound {
                    field: name.to_string(),
                    value: value.to_string(),
                })
            }
        };
        option.set_checked(true)
    }

    /// Selects the option whose visible text is `text`.
    pub fn select_by_text(&self, name: &str, text: &str) -> Result<()> {
        let select = self.select_field(name)?;
        let wanted = collapse_whitespace(text);
        let mut matches = Vec::new();
        for option in select.options()? {
            if option.striptags()? == wanted {
                matches.push(option);
            }
        }
        match matches.len() {
            0 => Err(AgentError::ValueNotFound {
                field: name.to_string(),
                value: text.to_string(),
            }),
            1 => matches[0].set_checked(true),
            count => Err(AgentError::AmbiguousMatch {
                query: format!("option text {:?} in {}", wanted, name),
                count,
            }),
        }
    }

    fn select_field(&self, name: &str) -> Result<ElementHandle> {
        for field in self.fields(name)? {
            if field.tag_name()? == "select" {
                return Ok(field);
            }
        }
        Err(field_not_found(name))
    }

    /// Submit-capable controls of this form, in document order.
    pub fn buttons(&self) -> Result<Vec<ElementHandle>> {
        let mut buttons = Vec::new();
        for control in self.controls()? {
            if control.with_view(|view| predicates::is_submit_button(&view))? {
                buttons.push(control);
            }
        }
        Ok(buttons)
    }

    /// The ordered name/value pairs a submission sends.
    ///
    /// `overrides` are applied with [`Form::set`] first. Every control then
    /// contributes in document order, extra fields follow, and the clicked
    /// button (or, when none is given, the first submit button) comes last.
    pub fn build_submission(
        &self,
        clicked: Option<&ElementHandle>,
        overrides: &[(&str, FieldValue)],
    ) -> Result<Vec<(String, String)>> {
        for (name, value) in overrides {
            self.set(name, value.clone())?;
        }

        let buttons = self.buttons()?;
        let button = match clicked {
            Some(button) if buttons.contains(button) => Some(button.clone()),
            Some(button) => {
                return Err(AgentError::FieldNotFound {
                    name: match button.name()? {
                        Some(name) => name,
                        None => button.describe()?,
                    },
                })
            }
            None => buttons.into_iter().next(),
        };

        let mut pairs = Vec::new();
        let unclicked = SubmitContext::default();
        for control in self.controls()? {
            match control.contribution(&unclicked) {
                Ok(contribution) => pairs.extend(contribution),
                Err(err) if err.is_unsupported() => continue,
                Err(err) => return Err(err),
            }
        }
        pairs.extend(self.page().extras(self.element.node()));
        if let Some(button) = button {
            pairs.extend(button.contribution(&SubmitContext::clicked(button.node()))?);
        }
        Ok(pairs)
    }

    /// Pairs for a submission with the default button.
    pub fn submission(&self) -> Result<Vec<(String, String)>> {
        self.build_submission(None, &[])
    }

    pub fn submit(&self) -> Result<Page> {
        self.send(None)
    }

    pub fn submit_with(&self, button: &ElementHandle) -> Result<Page> {
        self.send(Some(button))
    }

    fn send(&self, clicked: Option<&ElementHandle>) -> Result<Page> {
        let pairs = self.build_submission(clicked, &[])?;
        let method = self.method()?;
        let action = self.action()?;
        debug!("Submitting form: {} {} ({} fields)", method, action, pairs.len());

        let request = self.page().request(method, action.as_str())?;
        let request = match (method, self.encoding()?) {
            (Method::Get, _) => request.query(&pairs),
            (_, Encoding::Multipart) => request.multipart(&pairs, &[]),
            (_, Encoding::UrlEncoded) => request.form(&pairs),
        };
        request.send()
    }
}

fn field_not_found(name: &str) -> AgentError {
    AgentError::FieldNotFound {
        name: name.to_string(),
    }
}

/// Text inputs and textareas, the fields a list of values is spread over.
fn all_plain(fields: &[ElementHandle]) -> Result<bool> {
    for field in fields {
        let plain =
            field.with_view(|view| predicates::is_text_input(&view) || view.is("textarea"))?;
        if !plain {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHelper;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_document_order_with_repeated_names() {
        let page = TestHelper::page(
            r#"<form><input name="a" value="a"/><input name="a" value=""/><input name="b" value=""/></form>"#,
        );
        let form = page.form().unwrap();
        assert_eq!(
            form.submission().unwrap(),
            pairs(&[("a", "a"), ("a", ""), ("b", "")])
        );
    }

    #[test]
    fn test_checkbox_submission() {
        let page = TestHelper::page(
            r#"<form>
                <input type="checkbox" name="a" value="1">
                <input type="checkbox" name="a" value="2">
                <input type="checkbox" name="b" value="A" checked>
            </form>"#,
        );
        let form = page.form().unwrap();
        assert_eq!(form.submission().unwrap(), pairs(&[("b", "A")]));

        for checkbox in page.all("input[name=a]").unwrap() {
            checkbox.set_checked(true).unwrap();
        }
        form.field("b").unwrap().set_checked(false).unwrap();
        assert_eq!(form.submission().unwrap(), pairs(&[("a", "1"), ("a", "2")]));
        assert_eq!(form.value("a").unwrap(), FieldValue::from(["1", "2"]));
    }

    #[test]
    fn test_default_and_explicit_buttons() {
        let page = TestHelper::page(
            r#"<form>
                <input name="q" value="x">
                <input type="submit" name="go" value="first">
                <button name="go" value="second">Second</button>
                <button type="button" name="noop">No-op</button>
            </form>
            <form><input type="submit" name="elsewhere"></form>"#,
        );
        let form = page.form_at(0).unwrap();
        assert_eq!(
            form.submission().unwrap(),
            pairs(&[("q", "x"), ("go", "first")])
        );
        let second = page.one("button[value=second]").unwrap();
        assert_eq!(
            form.build_submission(Some(&second), &[]).unwrap(),
            pairs(&[("q", "x"), ("go", "second")])
        );

        let noop = page.one("button[name=noop]").unwrap();
        assert!(matches!(
            form.build_submission(Some(&noop), &[]).unwrap_err(),
            AgentError::FieldNotFound { ref name } if name == "noop"
        ));
        let foreign = page.one("input[name=elsewhere]").unwrap();
        assert!(matches!(
            form.build_submission(Some(&foreign), &[]).unwrap_err(),
            AgentError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn test_form_without_buttons() {
        let page = TestHelper::page(r#"<form><textarea name="t">x</textarea></form>"#);
        assert_eq!(page.form().unwrap().submission().unwrap(), pairs(&[("t", "x")]));
    }

    #[test]
    fn test_overrides_and_extras() {
        let page = TestHelper::page(
            r#"<form><input name="a" value="1"><input type="submit" name="s" value="S"></form>"#,
        );
        let form = page.form().unwrap();
        let built = form
            .build_submission(None, &[("a", "2".into()), ("token", "t".into())])
            .unwrap();
        assert_eq!(built, pairs(&[("a", "2"), ("token", "t"), ("s", "S")]));
        // extras live outside the markup
        assert!(!page.html().contains("token"));

        page.reset();
        assert_eq!(
            form.submission().unwrap(),
            pairs(&[("a", "1"), ("s", "S")])
        );
    }

    #[test]
    fn test_fill_spreads_lists_over_plain_fields() {
        let page = TestHelper::page(
            r#"<form>
                <input name="x"><input name="x"><input name="x" value="keep">
                <input type="checkbox" name="c" value="1"><input type="checkbox" name="c" value="2">
                <select name="s"><option>a</option><option>b</option></select>
            </form>"#,
        );
        let form = page.form().unwrap();
        form.fill(vec![
            ("x", FieldValue::from(["1", "2"])),
            ("c", FieldValue::from(["2"])),
            ("s", FieldValue::from("b")),
        ])
        .unwrap();
        assert_eq!(
            form.submission().unwrap(),
            pairs(&[("x", "1"), ("x", "2"), ("x", "keep"), ("c", "2"), ("s", "b")])
        );
        assert!(matches!(
            form.fill([("missing", "v")]).unwrap_err(),
            AgentError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn test_fill_by_query() {
        let page = TestHelper::page(
            r#"<form><input id="first" name="a"><input id="second" name="a"></form>"#,
        );
        let form = page.form().unwrap();
        form.fill_by([("#second", "2"), ("//input[@id='first']", "1")]).unwrap();
        assert_eq!(form.submission().unwrap(), pairs(&[("a", "1"), ("a", "2")]));
        assert!(matches!(
            form.fill_by([("input", "x")]).unwrap_err(),
            AgentError::AmbiguousMatch { count: 2, .. }
        ));
    }

    #[test]
    fn test_set_value_is_strict() {
        let page = TestHelper::page(r#"<form><input name="a"></form>"#);
        let form = page.form().unwrap();
        form.set_value("a", "1").unwrap();
        assert_eq!(form.value("a").unwrap(), "1");
        assert!(matches!(
            form.set_value("b", "1").unwrap_err(),
            AgentError::FieldNotFound { .. }
        ));
        assert!(matches!(
            form.value("b").unwrap_err(),
            AgentError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn test_check_by_label() {
        let page = TestHelper::page(
            r#"<form>
                <label for="agree">I   agree</label><input type="checkbox" id="agree" name="agree">
                <label><input type="radio" name="r" value="x"> Pick x</label>
                <label>Dup</label><label>Dup</label>
                <label for="t">Name</label><input id="t" name="t" value="v">
            </form>"#,
        );
        let form = page.form().unwrap();
        form.check("I agree").unwrap();
        assert!(form.field("agree").unwrap().checked().unwrap());
        form.check("I agree").unwrap();
        assert!(!form.field("agree").unwrap().checked().unwrap());

        form.check("Pick x").unwrap();
        assert_eq!(form.value("r").unwrap(), "x");

        assert!(matches!(form.check("Nope").unwrap_err(), AgentError::NoMatch { .. }));
        assert!(matches!(
            form.check("Dup").unwrap_err(),
            AgentError::AmbiguousMatch { count: 2, .. }
        ));

        // a label for a text input is not something to toggle
        assert!(matches!(
            form.check("Name").unwrap_err(),
            AgentError::InvalidValue { .. }
        ));
        assert!(!form.field("t").unwrap().has_attr("checked").unwrap());
    }

    #[test]
    fn test_select_with_force() {
        let page = TestHelper::page(
            r#"<form><select name="s"><option value="1" selected>One</option></select>
               <select name="m" multiple><option value="a" selected>A</option><option value="b">B</option></select></form>"#,
        );
        let form = page.form().unwrap();
        assert!(matches!(
            form.select("s", "2", false).unwrap_err(),
            AgentError::ValueNotFound { .. }
        ));
        form.select("s", "2", true).unwrap();
        assert_eq!(form.value("s").unwrap(), "2");
        assert_eq!(page.all("select[name=s] option").unwrap().len(), 2);

        form.select("m", "b", false).unwrap();
        assert_eq!(form.value("m").unwrap(), FieldValue::from(["a", "b"]));

        form.select_by_text("s", "One").unwrap();
        assert_eq!(form.value("s").unwrap(), "1");
        assert!(matches!(
            form.select("q", "x", true).unwrap_err(),
            AgentError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn test_action_and_method() {
        let page = TestHelper::page_at(
            "http://localhost/app/page",
            r#"<form action="submit" method="POST" enctype="multipart/form-data"></form>
               <form></form>
               <form action="http://elsewhere.example/x"></form>"#,
        );
        let forms = page.forms().unwrap();
        assert_eq!(forms[0].method().unwrap(), Method::Post);
        assert_eq!(forms[0].encoding().unwrap(), Encoding::Multipart);
        assert_eq!(forms[0].action().unwrap().as_str(), "http://localhost/app/submit");
        assert_eq!(forms[1].method().unwrap(), Method::Get);
        assert_eq!(forms[1].action().unwrap().as_str(), "http://localhost/app/page");
        assert!(matches!(
            forms[2].action().unwrap_err(),
            AgentError::CrossOrigin { .. }
        ));
    }
}
