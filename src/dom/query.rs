use scraper::Selector;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Css,
    XPath,
}

/// A selector to run against a page or an element.
///
/// Plain strings convert through [`Query::parse`], which guesses the kind:
/// anything that looks like a path (`/…`, `./…`, `../…`, `(…`) is XPath,
/// anything the CSS parser accepts is CSS, and the rest is treated as XPath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    kind: QueryKind,
    text: String,
    vars: Vec<(String, String)>,
}

impl Query {
    pub fn css(text: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Css,
            text: text.into(),
            vars: Vec::new(),
        }
    }

    pub fn xpath(text: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::XPath,
            text: text.into(),
            vars: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_start();
        let path_like = trimmed.starts_with('/')
            || trimmed.starts_with("./")
            || trimmed.starts_with("../")
            || trimmed.starts_with('(')
            || trimmed == "."
            || trimmed == "..";
        if !path_like && Selector::parse(text).is_ok() {
            Self::css(text)
        } else {
            Self::xpath(text)
        }
    }

    /// Bind an XPath `$name` variable. Ignored for CSS queries.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((name.into(), value.into()));
        self
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::parse(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::parse(&text)
    }
}

impl From<&String> for Query {
    fn from(text: &String) -> Self {
        Query::parse(text)
    }
}

impl From<&Query> for Query {
    fn from(query: &Query) -> Self {
        query.clone()
    }
}
