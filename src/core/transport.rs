use crate::errors::Result;
use crate::types::{Request, Response};
use async_trait::async_trait;

/// Synchronous request/response boundary the agent drives.
///
/// Anything that can answer a [`Request`] works: an in-process application,
/// a recorded fixture, or a bridge onto a real client. Any
/// `Fn(&Request) -> Result<Response>` closure is a transport.
pub trait Transport {
    fn send(&self, request: &Request) -> Result<Response>;
}

impl<F> Transport for F
where
    F: Fn(&Request) -> Result<Response>,
{
    fn send(&self, request: &Request) -> Result<Response> {
        self(request)
    }
}

/// Asynchronous transport, for applications that can only be called from a
/// runtime. Wrap it in [`Blocking`] to hand it to an agent.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Bridges an [`AsyncTransport`] onto [`Transport`] by blocking on each
/// request with a private current-thread runtime.
pub struct Blocking<T> {
    inner: T,
    runtime: tokio::runtime::Runtime,
}

impl<T: AsyncTransport> Blocking<T> {
    pub fn new(inner: T) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { inner, runtime })
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: AsyncTransport> Transport for Blocking<T> {
    fn send(&self, request: &Request) -> Result<Response> {
        self.runtime.block_on(self.inner.send(request.clone()))
    }
}
