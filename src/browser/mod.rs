pub mod form;
pub mod handle;
pub mod navigation;
pub mod page;
pub mod session;

pub use form::{Encoding, Form};
pub use handle::ElementHandle;
pub use navigation::{NavigationManager, RedirectState};
pub use page::Page;
pub use session::{Agent, FileUpload, RequestBuilder};
