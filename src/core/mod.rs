pub mod config;
pub mod transport;

pub use config::{AgentConfig, Config, DomConfig, NavigationConfig};
pub use transport::{AsyncTransport, Blocking, Transport};
