//! Element predicates used as registry keys.
//!
//! A predicate looks only at the element's tag, attributes and position in
//! the tree, so it can be evaluated while the document is borrowed.

use crate::dom::ElementView;

pub type Predicate = Box<dyn Fn(&ElementView<'_>) -> bool>;

/// Input types that are not free-text fields.
pub const NON_TEXT_INPUT_TYPES: &[&str] = &[
    "checkbox", "radio", "submit", "image", "reset", "button", "file",
];

/// Elements that belong to a form without having to be nested in one as a
/// container.
pub const FORM_ASSOCIATED_TAGS: &[&str] = &[
    "input", "textarea", "select", "button", "option", "label", "fieldset", "output",
];

pub fn any_element() -> Predicate {
    Box::new(|_: &ElementView<'_>| true)
}

pub fn tag(name: &'static str) -> Predicate {
    Box::new(move |el: &ElementView<'_>| el.is(name))
}

pub fn tags(names: &'static [&'static str]) -> Predicate {
    Box::new(move |el: &ElementView<'_>| names.iter().any(|name| el.is(name)))
}

pub fn has_attr(name: &'static str) -> Predicate {
    Box::new(move |el: &ElementView<'_>| el.has_attr(name))
}

/// `<input>` whose (defaulted) type is one of `types`.
pub fn input_type(types: &'static [&'static str]) -> Predicate {
    Box::new(move |el: &ElementView<'_>| {
        el.is("input") && types.contains(&el.control_type().as_str())
    })
}

pub fn text_input() -> Predicate {
    Box::new(|el: &ElementView<'_>| is_text_input(el))
}

pub fn checkbox() -> Predicate {
    input_type(&["checkbox"])
}

pub fn radio() -> Predicate {
    input_type(&["radio"])
}

pub fn file_input() -> Predicate {
    input_type(&["file"])
}

pub fn submit_button() -> Predicate {
    Box::new(|el: &ElementView<'_>| is_submit_button(el))
}

pub fn push_button() -> Predicate {
    Box::new(|el: &ElementView<'_>| {
        matches!(
            (el.tag_name(), el.control_type().as_str()),
            ("input", "reset") | ("input", "button") | ("button", "reset") | ("button", "button")
        )
    })
}

pub fn select_multiple() -> Predicate {
    Box::new(|el: &ElementView<'_>| el.is("select") && el.has_attr("multiple"))
}

pub fn select_single() -> Predicate {
    Box::new(|el: &ElementView<'_>| el.is("select") && !el.has_attr("multiple"))
}

/// `<a href>` or `<area href>`.
pub fn link() -> Predicate {
    Box::new(|el: &ElementView<'_>| (el.is("a") || el.is("area")) && el.has_attr("href"))
}

pub fn all_of(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |el: &ElementView<'_>| predicates.iter().all(|p| p(el)))
}

pub fn any_of(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |el: &ElementView<'_>| predicates.iter().any(|p| p(el)))
}

pub fn not(predicate: Predicate) -> Predicate {
    Box::new(move |el: &ElementView<'_>| !predicate(el))
}

pub fn is_text_input(el: &ElementView<'_>) -> bool {
    el.is("input") && !NON_TEXT_INPUT_TYPES.contains(&el.control_type().as_str())
}

/// `input[type=submit|image]`, or a `<button>` that submits.
pub fn is_submit_button(el: &ElementView<'_>) -> bool {
    matches!(
        (el.tag_name(), el.control_type().as_str()),
        ("input", "submit") | ("input", "image") | ("button", "submit")
    )
}

pub fn is_image_button(el: &ElementView<'_>) -> bool {
    el.is("input") && el.control_type() == "image"
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn check(predicate: &Predicate, markup: &str) -> bool {
        let html = Html::parse_fragment(markup);
        let selector = Selector::parse("html > *").unwrap();
        let element = html.select(&selector).next().unwrap();
        predicate(&ElementView::new(element))
    }

    #[test]
    fn test_input_kinds() {
        assert!(check(&text_input(), r#"<input name="a">"#));
        assert!(check(&text_input(), r#"<input type="password">"#));
        assert!(check(&text_input(), r#"<input type="email">"#));
        assert!(!check(&text_input(), r#"<input type="checkbox">"#));
        assert!(check(&checkbox(), r#"<input type="CHECKBOX">"#));
        assert!(check(&radio(), r#"<input type="radio">"#));
        assert!(check(&file_input(), r#"<input type="file" name="f">"#));
        assert!(!check(&text_input(), r#"<input type="file">"#));
    }

    #[test]
    fn test_buttons() {
        assert!(check(&submit_button(), r#"<input type="submit">"#));
        assert!(check(&submit_button(), r#"<input type="image" src="x.png">"#));
        assert!(check(&submit_button(), "<button>Go</button>"));
        assert!(!check(&submit_button(), r#"<button type="reset">R</button>"#));
        assert!(check(&push_button(), r#"<button type="button">B</button>"#));
        assert!(check(&push_button(), r#"<input type="reset">"#));
    }

    #[test]
    fn test_combinators() {
        let named_link = all_of(vec![link(), has_attr("id")]);
        assert!(check(&named_link, r##"<a id="x" href="#">x</a>"##));
        assert!(!check(&named_link, r##"<a href="#">x</a>"##));
        assert!(check(&not(link()), "<a>no href</a>"));
        assert!(check(&any_of(vec![tag("p"), tag("div")]), "<div></div>"));
        assert!(check(&tags(&["p", "div"]), "<p></p>"));
        assert!(check(&any_element(), "<span></span>"));
    }

    #[test]
    fn test_selects() {
        assert!(check(&select_multiple(), "<select multiple></select>"));
        assert!(check(&select_single(), "<select></select>"));
        assert!(!check(&select_single(), "<select multiple></select>"));
    }
}
