use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use qcache_context::Context;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::auth::DialerOptions;
use crate::error::{BoxError, DialError};

/// A connected byte stream.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

pub type BoxedConn = Box<dyn Connection>;

/// Opens authenticated connections to database instances.
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Connect to `instance`, e.g. `project:region:instance`.
    async fn dial(&self, ctx: &Context, instance: &str) -> Result<BoxedConn, DialError>;

    async fn close(&self) -> Result<(), DialError> {
        Ok(())
    }
}

/// Builds the [`Dialer`] shared by all connection attempts.
#[async_trait]
pub trait DialerFactory: Send + Sync + fmt::Debug {
    async fn build(
        &self,
        ctx: &Context,
        options: &DialerOptions,
    ) -> Result<Arc<dyn Dialer>, BoxError>;
}

/// When the shared dialer is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DialerConstruction {
    /// While constructing the connector. Failures are returned from
    /// [`Connector::new`](crate::Connector::new).
    Eager,
    /// On the first connection attempt. Failures fail that attempt only.
    #[default]
    Lazy,
}
