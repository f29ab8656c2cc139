pub mod document;
pub mod element;
pub mod query;
pub mod xpath;

pub use document::Document;
pub use element::ElementView;
pub use query::{Query, QueryKind};
pub use xpath::XPath;
