pub mod actions;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod testing;
pub mod types;

pub use actions::{BehaviorRegistry, Operation};
pub use browser::{Agent, ElementHandle, FileUpload, Form, Page, RequestBuilder};
pub use crate::core::{Config, Transport};
pub use dom::Query;
pub use errors::{AgentError, Result};
pub use types::*;
