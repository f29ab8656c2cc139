//! Default behaviours: how standard HTML controls read, write and submit.

use crate::actions::base::SubmitContext;
use crate::actions::predicates::{self, FORM_ASSOCIATED_TAGS};
use crate::actions::registry::BehaviorRegistry;
use crate::browser::{ElementHandle, Form, Page};
use crate::dom::Query;
use crate::errors::{AgentError, Result};
use crate::types::FieldValue;
use ego_tree::NodeId;

pub(crate) fn install(registry: &mut BehaviorRegistry) {
    registry
        .get_value
        .register(predicates::text_input(), Box::new(attr_value))
        .register(predicates::checkbox(), Box::new(checkbox_value))
        .register(predicates::radio(), Box::new(radio_value))
        .register(predicates::select_multiple(), Box::new(multi_select_value))
        .register(predicates::select_single(), Box::new(select_value))
        .register(predicates::tag("textarea"), Box::new(textarea_value))
        .register(predicates::submit_button(), Box::new(attr_value))
        .register(predicates::push_button(), Box::new(attr_value))
        .register(predicates::tag("option"), Box::new(option_value));

    registry
        .set_value
        .register(predicates::text_input(), Box::new(set_attr_value))
        .register(predicates::checkbox(), Box::new(set_checkbox_value))
        .register(predicates::radio(), Box::new(set_radio_value))
        .register(predicates::select_multiple(), Box::new(set_multi_select_value))
        .register(predicates::select_single(), Box::new(set_select_value))
        .register(predicates::tag("textarea"), Box::new(set_textarea_value))
        .register(predicates::tag("option"), Box::new(set_attr_value));

    registry
        .get_checked
        .register(predicates::tag("input"), Box::new(input_checked))
        .register(predicates::tag("option"), Box::new(option_selected));

    registry
        .set_checked
        .register(predicates::radio(), Box::new(set_radio_checked))
        .register(predicates::tag("input"), Box::new(set_input_checked))
        .register(predicates::tag("option"), Box::new(set_option_selected));

    registry
        .submit_contribution
        .register(predicates::submit_button(), Box::new(button_contribution))
        .register(predicates::push_button(), Box::new(no_contribution))
        .register(
            predicates::any_of(vec![predicates::checkbox(), predicates::radio()]),
            Box::new(checkable_contribution),
        )
        .register(predicates::file_input(), Box::new(file_contribution))
        .register(predicates::text_input(), Box::new(value_contribution))
        .register(predicates::tags(&["select", "textarea"]), Box::new(value_contribution));

    registry
        .get_form
        .register(predicates::tag("form"), Box::new(form_itself))
        .register(predicates::tags(FORM_ASSOCIATED_TAGS), Box::new(enclosing_form))
        .register(predicates::any_element(), Box::new(descendant_form));

    registry
        .submit
        .register(predicates::tag("form"), Box::new(submit_form))
        .register(predicates::submit_button(), Box::new(submit_with_button));

    registry
        .click
        .register(predicates::link(), Box::new(follow_link))
        .register(predicates::submit_button(), Box::new(submit_with_button));
}

/// An option's value: its `value` attribute, or else its whitespace-collapsed
/// text.
pub(crate) fn option_text_value(option: &ElementHandle) -> Result<String> {
    match option.attr("value")? {
        Some(value) => Ok(value),
        None => option.striptags(),
    }
}

/// What a checked checkbox or radio submits.
pub(crate) fn checkable_value(handle: &ElementHandle) -> Result<String> {
    match handle.attr("value")? {
        Some(value) => Ok(value),
        None => Ok(handle.page().config().dom.checkbox_default_value.clone()),
    }
}

fn field_name(handle: &ElementHandle) -> String {
    match handle.name() {
        Ok(Some(name)) => name,
        _ => handle.describe().unwrap_or_default(),
    }
}

fn invalid(handle: &ElementHandle, value: &FieldValue, expected: &str) -> AgentError {
    AgentError::InvalidValue {
        element: handle.describe().unwrap_or_default(),
        reason: format!("expected {}, got {}", expected, value),
    }
}

fn value_not_found(handle: &ElementHandle, value: &str) -> AgentError {
    AgentError::ValueNotFound {
        field: field_name(handle),
        value: value.to_string(),
    }
}

/// Accepts `Text`, `Empty` and one-element lists.
fn single_text(handle: &ElementHandle, value: FieldValue) -> Result<Option<String>> {
    match value {
        FieldValue::Text(text) => Ok(Some(text)),
        FieldValue::Empty => Ok(None),
        FieldValue::List(mut items) if items.len() == 1 => Ok(items.pop()),
        other => Err(invalid(handle, &other, "a single value")),
    }
}

fn attr_value(handle: &ElementHandle) -> Result<FieldValue> {
    Ok(FieldValue::Text(handle.attr("value")?.unwrap_or_default()))
}

fn checkbox_value(handle: &ElementHandle) -> Result<FieldValue> {
    if handle.has_attr("checked")? {
        Ok(FieldValue::Text(checkable_value(handle)?))
    } else {
        Ok(FieldValue::Empty)
    }
}

fn radio_value(handle: &ElementHandle) -> Result<FieldValue> {
    for member in handle.group()? {
        if member.has_attr("checked")? {
            return Ok(FieldValue::Text(checkable_value(&member)?));
        }
    }
    Ok(FieldValue::Empty)
}

fn selected_options(select: &ElementHandle) -> Result<Vec<ElementHandle>> {
    let mut selected = Vec::new();
    for option in select.options()? {
        if option.has_attr("selected")? {
            selected.push(option);
        }
    }
    Ok(selected)
}

fn multi_select_value(handle: &ElementHandle) -> Result<FieldValue> {
    let values = selected_options(handle)?
        .iter()
        .map(option_text_value)
        .collect::<Result<Vec<_>>>()?;
    Ok(FieldValue::List(values))
}

fn select_value(handle: &ElementHandle) -> Result<FieldValue> {
    match selected_options(handle)?.first() {
        Some(option) => Ok(FieldValue::Text(option_text_value(option)?)),
        None => Ok(FieldValue::Empty),
    }
}

fn textarea_value(handle: &ElementHandle) -> Result<FieldValue> {
    Ok(FieldValue::Text(handle.text()?))
}

fn option_value(handle: &ElementHandle) -> Result<FieldValue> {
    Ok(FieldValue::Text(option_text_value(handle)?))
}

fn set_attr_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let text = single_text(handle, value)?.unwrap_or_default();
    handle.set_attr("value", &text)
}

fn set_textarea_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let text = single_text(handle, value)?.unwrap_or_default();
    handle.set_text(&text)
}

fn set_checkbox_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let wanted = match value {
        FieldValue::Bool(on) => return handle.set_flag("checked", on),
        FieldValue::Empty => Vec::new(),
        FieldValue::Text(text) => vec![text],
        FieldValue::List(items) => items,
    };

    let group = handle.group()?;
    let values = group
        .iter()
        .map(checkable_value)
        .collect::<Result<Vec<_>>>()?;
    if let Some(missing) = wanted.iter().find(|w| !values.contains(w)) {
        return Err(value_not_found(handle, missing));
    }
    for (member, value) in group.iter().zip(&values) {
        member.set_flag("checked", wanted.contains(value))?;
    }
    Ok(())
}

fn set_radio_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let wanted = match value {
        FieldValue::Bool(on) => return set_radio_checked(handle, on),
        other => single_text(handle, other)?,
    };

    let group = handle.group()?;
    let mut target = None;
    if let Some(wanted) = &wanted {
        for member in &group {
            if checkable_value(member)? == *wanted {
                target = Some(member.node());
                break;
            }
        }
        if target.is_none() {
            return Err(value_not_found(handle, wanted));
        }
    }
    for member in &group {
        member.set_flag("checked", Some(member.node()) == target)?;
    }
    Ok(())
}

fn find_option(select: &ElementHandle, options: &[ElementHandle], value: &str) -> Result<NodeId> {
    for option in options {
        if option_text_value(option)? == value {
            return Ok(option.node());
        }
    }
    Err(value_not_found(select, value))
}

fn set_select_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let wanted = single_text(handle, value)?;
    let options = handle.options()?;
    let target = match &wanted {
        Some(wanted) => Some(find_option(handle, &options, wanted)?),
        None => None,
    };
    for option in &options {
        option.set_flag("selected", Some(option.node()) == target)?;
    }
    Ok(())
}

fn set_multi_select_value(handle: &ElementHandle, value: FieldValue) -> Result<()> {
    let wanted = match value {
        FieldValue::Empty => Vec::new(),
        FieldValue::Text(text) => vec![text],
        FieldValue::List(items) => items,
        other => return Err(invalid(handle, &other, "a list of option values")),
    };
    let options = handle.options()?;
    let targets = wanted
        .iter()
        .map(|w| find_option(handle, &options, w))
        .collect::<Result<Vec<_>>>()?;
    for option in &options {
        option.set_flag("selected", targets.contains(&option.node()))?;
    }
    Ok(())
}

fn input_checked(handle: &ElementHandle) -> Result<bool> {
    handle.has_attr("checked")
}

fn option_selected(handle: &ElementHandle) -> Result<bool> {
    handle.has_attr("selected")
}

fn set_radio_checked(handle: &ElementHandle, on: bool) -> Result<()> {
    for member in handle.group()? {
        member.set_flag("checked", false)?;
    }
    handle.set_flag("checked", on)
}

fn set_input_checked(handle: &ElementHandle, on: bool) -> Result<()> {
    handle.set_flag("checked", on)
}

fn set_option_selected(handle: &ElementHandle, on: bool) -> Result<()> {
    if on {
        if let Some(select) = handle.closest("select")? {
            if !select.has_attr("multiple")? {
                for option in select.options()? {
                    option.set_flag("selected", false)?;
                }
            }
        }
    }
    handle.set_flag("selected", on)
}

/// Name of a control that is allowed to submit: named and not disabled.
fn submitting_name(handle: &ElementHandle) -> Result<Option<String>> {
    match handle.name()? {
        Some(name) if !handle.is_disabled()? => Ok(Some(name)),
        _ => Ok(None),
    }
}

fn value_contribution(handle: &ElementHandle, _: &SubmitContext) -> Result<Vec<(String, String)>> {
    let name = match submitting_name(handle)? {
        Some(name) => name,
        None => return Ok(Vec::new()),
    };
    Ok(handle
        .value()?
        .into_list()
        .into_iter()
        .map(|value| (name.clone(), value))
        .collect())
}

fn checkable_contribution(
    handle: &ElementHandle,
    _: &SubmitContext,
) -> Result<Vec<(String, String)>> {
    match submitting_name(handle)? {
        Some(name) if handle.has_attr("checked")? => Ok(vec![(name, checkable_value(handle)?)]),
        _ => Ok(Vec::new()),
    }
}

fn button_contribution(
    handle: &ElementHandle,
    context: &SubmitContext,
) -> Result<Vec<(String, String)>> {
    if !context.is_clicked(handle.node()) || handle.is_disabled()? {
        return Ok(Vec::new());
    }
    let name = handle.name()?;
    if handle.with_view(|view| predicates::is_image_button(&view))? {
        let (x, y) = handle.page().config().dom.image_click;
        let (x_key, y_key) = match &name {
            Some(name) => (format!("{}.x", name), format!("{}.y", name)),
            None => ("x".to_string(), "y".to_string()),
        };
        return Ok(vec![(x_key, x.to_string()), (y_key, y.to_string())]);
    }
    match name {
        Some(name) => Ok(vec![(name, handle.attr("value")?.unwrap_or_default())]),
        None => Ok(Vec::new()),
    }
}

/// No file is ever attached, so a file input sends its name with an empty
/// value.
fn file_contribution(handle: &ElementHandle, _: &SubmitContext) -> Result<Vec<(String, String)>> {
    Ok(submitting_name(handle)?
        .map(|name| vec![(name, String::new())])
        .unwrap_or_default())
}

fn no_contribution(_: &ElementHandle, _: &SubmitContext) -> Result<Vec<(String, String)>> {
    Ok(Vec::new())
}

fn form_itself(handle: &ElementHandle) -> Result<ElementHandle> {
    Ok(handle.clone())
}

fn enclosing_form(handle: &ElementHandle) -> Result<ElementHandle> {
    handle
        .closest("form")?
        .ok_or_else(|| AgentError::NoMatch {
            query: format!("form enclosing {}", handle.describe().unwrap_or_default()),
        })
}

fn descendant_form(handle: &ElementHandle) -> Result<ElementHandle> {
    handle.one(Query::css("form"))
}

fn submit_form(handle: &ElementHandle) -> Result<Page> {
    Form::new(handle.clone())?.submit()
}

fn submit_with_button(handle: &ElementHandle) -> Result<Page> {
    handle.form()?.submit_with(handle)
}

fn follow_link(handle: &ElementHandle) -> Result<Page> {
    let href = handle.attr("href")?.unwrap_or_default();
    handle.page().get(&href)?.send()
}

#[cfg(test)]
mod tests {
    use crate::errors::AgentError;
    use crate::testing::TestHelper;
    use crate::types::FieldValue;

    #[test]
    fn test_text_like_inputs() {
        let page = TestHelper::page(
            r#"<form>
                <input name="plain" value="p">
                <input name="empty">
                <input type="hidden" name="h" value="hidden">
                <input type="password" name="pw">
            </form>"#,
        );
        assert_eq!(page.one("input[name=plain]").unwrap().value().unwrap(), "p");
        assert_eq!(page.one("input[name=empty]").unwrap().value().unwrap(), "");
        assert_eq!(page.one("input[name=h]").unwrap().value().unwrap(), "hidden");

        let pw = page.one("input[name=pw]").unwrap();
        pw.set_value("secret").unwrap();
        assert_eq!(pw.value().unwrap(), "secret");
        assert!(matches!(
            pw.set_value(true).unwrap_err(),
            AgentError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_checkbox_value_and_default() {
        let page = TestHelper::page(
            r#"<form>
                <input type="checkbox" name="a" value="1" checked>
                <input type="checkbox" name="b" checked>
                <input type="checkbox" name="c" value="3">
            </form>"#,
        );
        assert_eq!(page.one("input[name=a]").unwrap().value().unwrap(), "1");
        assert_eq!(page.one("input[name=b]").unwrap().value().unwrap(), "On");
        assert_eq!(
            page.one("input[name=c]").unwrap().value().unwrap(),
            FieldValue::Empty
        );
    }

    #[test]
    fn test_checkbox_group_set() {
        let page = TestHelper::page(
            r#"<form>
                <input type="checkbox" name="x" value="1">
                <input type="checkbox" name="x" value="2" checked>
                <input type="checkbox" name="x" value="3">
            </form>"#,
        );
        let first = page.one("input[value='1']").unwrap();
        first.set_value(["1", "3"]).unwrap();
        let checked: Vec<bool> = page
            .all("input")
            .unwrap()
            .iter()
            .map(|el| el.checked().unwrap())
            .collect();
        assert_eq!(checked, vec![true, false, true]);

        let err = first.set_value(["4"]).unwrap_err();
        assert!(matches!(err, AgentError::ValueNotFound { ref value, .. } if value == "4"));

        first.set_value(false).unwrap();
        assert!(!first.checked().unwrap());
    }

    #[test]
    fn test_radio_group_is_exclusive() {
        let page = TestHelper::page(
            r#"<form>
                <input type="radio" name="r" value="a" checked>
                <input type="radio" name="r" value="b">
                <input type="radio" name="r" value="c">
            </form>
            <form><input type="radio" name="r" value="z" checked></form>"#,
        );
        let radios = page.all("input[type=radio]").unwrap();
        assert_eq!(radios[1].value().unwrap(), "a");

        radios[1].set_checked(true).unwrap();
        assert!(!radios[0].checked().unwrap());
        assert!(radios[1].checked().unwrap());
        assert_eq!(radios[2].value().unwrap(), "b");
        // other form's group untouched
        assert!(radios[3].checked().unwrap());

        radios[0].set_value("c").unwrap();
        assert_eq!(radios[0].value().unwrap(), "c");
        let checked = radios.iter().filter(|r| r.checked().unwrap()).count();
        assert_eq!(checked, 2);

        assert!(matches!(
            radios[0].set_value("nope").unwrap_err(),
            AgentError::ValueNotFound { .. }
        ));
        radios[0].set_value(FieldValue::Empty).unwrap();
        assert_eq!(radios[0].value().unwrap(), FieldValue::Empty);
    }

    #[test]
    fn test_selects() {
        let page = TestHelper::page(
            r#"<form>
                <select name="s">
                    <option value="1">One</option>
                    <option selected>Two</option>
                </select>
                <select name="none"><option value="x">X</option></select>
                <select name="m" multiple>
                    <option value="a" selected>A</option>
                    <option value="b">B</option>
                    <optgroup label="more"><option value="c" selected>C</option></optgroup>
                </select>
            </form>"#,
        );
        let single = page.one("select[name=s]").unwrap();
        assert_eq!(single.value().unwrap(), "Two");
        single.set_value("1").unwrap();
        assert_eq!(single.value().unwrap(), "1");
        assert!(matches!(
            single.set_value("3").unwrap_err(),
            AgentError::ValueNotFound { ref field, .. } if field == "s"
        ));

        let unselected = page.one("select[name=none]").unwrap();
        assert_eq!(unselected.value().unwrap(), FieldValue::Empty);

        let multi = page.one("select[name=m]").unwrap();
        assert_eq!(multi.value().unwrap(), FieldValue::from(["a", "c"]));
        multi.set_value(["b"]).unwrap();
        assert_eq!(multi.value().unwrap(), FieldValue::from(["b"]));
        multi.set_value(FieldValue::Empty).unwrap();
        assert_eq!(multi.value().unwrap(), FieldValue::List(vec![]));
    }

    #[test]
    fn test_option_checked_state() {
        let page = TestHelper::page(
            r#"<select name="s"><option value="1" selected>1</option><option value="2">2</option></select>"#,
        );
        let options = page.all("option").unwrap();
        options[1].set_checked(true).unwrap();
        assert!(!options[0].checked().unwrap());
        assert!(options[1].checked().unwrap());
        assert_eq!(page.one("select").unwrap().value().unwrap(), "2");
    }

    #[test]
    fn test_textarea() {
        let page = TestHelper::page(r#"<form><textarea name="t">hello</textarea></form>"#);
        let area = page.one("textarea").unwrap();
        assert_eq!(area.value().unwrap(), "hello");
        area.set_value("bye").unwrap();
        assert_eq!(area.value().unwrap(), "bye");
    }

    #[test]
    fn test_buttons_are_read_only() {
        let page = TestHelper::page(
            r#"<form><input type="submit" name="go" value="Go"><button type="reset" value="r">R</button></form>"#,
        );
        let submit = page.one("input[type=submit]").unwrap();
        assert_eq!(submit.value().unwrap(), "Go");
        assert!(submit.set_value("x").unwrap_err().is_unsupported());
        assert_eq!(page.one("button").unwrap().value().unwrap(), "r");
    }

    #[test]
    fn test_contributions() {
        let page = TestHelper::page(
            r#"<form>
                <input name="t" value="v">
                <input name="d" value="v" disabled>
                <fieldset disabled><input name="fd" value="v"></fieldset>
                <input value="nameless">
                <input type="checkbox" name="c" value="1">
                <input type="image" name="map">
                <input type="image">
            </form>"#,
        );
        assert_eq!(
            page.one("input[name=t]").unwrap().submit_contribution(None).unwrap(),
            vec![("t".to_string(), "v".to_string())]
        );
        assert!(page.one("input[name=d]").unwrap().submit_contribution(None).unwrap().is_empty());
        assert!(page.one("input[name=fd]").unwrap().submit_contribution(None).unwrap().is_empty());
        assert!(page.one("input[value=nameless]").unwrap().submit_contribution(None).unwrap().is_empty());
        assert!(page.one("input[name=c]").unwrap().submit_contribution(None).unwrap().is_empty());

        let map = page.one("input[name=map]").unwrap();
        assert!(map.submit_contribution(None).unwrap().is_empty());
        assert_eq!(
            map.submit_contribution(Some(&map)).unwrap(),
            vec![
                ("map.x".to_string(), "1".to_string()),
                ("map.y".to_string(), "1".to_string())
            ]
        );
        let anonymous = page.all("input[type=image]").unwrap().pop().unwrap();
        assert_eq!(
            anonymous.submit_contribution(Some(&anonymous)).unwrap(),
            vec![("x".to_string(), "1".to_string()), ("y".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_file_input_sends_empty_value() {
        let page = TestHelper::page(
            r#"<form><input type="file" name="f"><input name="q" value="x">
               <input type="file" name="off" disabled></form>"#,
        );
        assert_eq!(
            page.form().unwrap().submission().unwrap(),
            vec![
                ("f".to_string(), String::new()),
                ("q".to_string(), "x".to_string())
            ]
        );
    }

    #[test]
    fn test_get_form() {
        let page = TestHelper::page(
            r#"<div id="one"><form id="f"><input name="a"></form></div>
               <div id="two"><form id="g"></form><form id="h"></form></div>
               <p>orphan <input name="o"></p>"#,
        );
        let input = page.one("input[name=a]").unwrap();
        assert_eq!(input.form_element().unwrap().attr("id").unwrap().as_deref(), Some("f"));
        let wrapper = page.one("#one").unwrap();
        assert_eq!(wrapper.form_element().unwrap().attr("id").unwrap().as_deref(), Some("f"));
        assert!(matches!(
            page.one("#two").unwrap().form_element().unwrap_err(),
            AgentError::AmbiguousMatch { count: 2, .. }
        ));
        assert!(matches!(
            page.one("input[name=o]").unwrap().form_element().unwrap_err(),
            AgentError::NoMatch { .. }
        ));
    }
}
