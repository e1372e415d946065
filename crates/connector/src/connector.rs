use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use qcache_context::Context;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::auth::{AuthMode, DialerOptions};
use crate::config::{BeforeConnect, ConnConfig, DialFunc};
use crate::dialer::{Dialer, DialerConstruction, DialerFactory};
use crate::error::ConnectorError;
use crate::LOG_TARGET;

/// Routes new connections through a shared authenticated [`Dialer`].
///
/// The dialer is built at most once per connector, by [`Connector::new`] or by the first
/// connection attempt depending on [`DialerConstruction`]. A connector created with
/// [`AuthMode::Skip`] or without credentials never builds one and leaves every config untouched.
#[derive(Debug)]
pub struct Connector {
    options: Option<DialerOptions>,
    factory: Arc<dyn DialerFactory>,
    dialer: OnceCell<Arc<dyn Dialer>>,
    closed: Mutex<bool>,
    released: AtomicBool,
}

impl Connector {
    pub async fn new(
        ctx: &Context,
        mode: AuthMode,
        construction: DialerConstruction,
        factory: Arc<dyn DialerFactory>,
    ) -> Result<Self, ConnectorError> {
        let connector = Self {
            options: mode.dialer_options(),
            factory,
            dialer: OnceCell::new(),
            closed: Mutex::new(false),
            released: AtomicBool::new(false),
        };

        if let Some(options) = &connector.options {
            if construction == DialerConstruction::Eager {
                connector.dialer(ctx, options).await?;
            }
        }

        Ok(connector)
    }

    /// Whether connections are routed through the dialer.
    pub fn is_active(&self) -> bool {
        self.options.is_some()
    }

    /// Whether the dialer has been built.
    pub fn is_built(&self) -> bool {
        self.dialer.initialized()
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    async fn dialer(
        &self,
        ctx: &Context,
        options: &DialerOptions,
    ) -> Result<Arc<dyn Dialer>, ConnectorError> {
        let dialer = self
            .dialer
            .get_or_try_init(|| async {
                debug!(
                    target: LOG_TARGET,
                    ip_type = %options.ip_type,
                    refresh_timeout = ?options.refresh_timeout,
                    "Building dialer"
                );
                ctx.run(self.factory.build(ctx, options))
                    .await?
                    .map_err(ConnectorError::Configuration)
            })
            .await?;

        Ok(dialer.clone())
    }

    /// Closes the dialer if one was built. Later hook calls fail with
    /// [`ConnectorError::Closed`].
    ///
    /// A lazy build still in flight is closed by the attempt that finishes it.
    pub async fn close(&self) -> Result<(), ConnectorError> {
        let dialer = {
            let mut closed = self.closed.lock();
            if *closed {
                return Ok(());
            }
            *closed = true;
            self.dialer.get().cloned()
        };

        match dialer {
            Some(dialer) => self.release(&dialer).await,
            None => Ok(()),
        }
    }

    async fn release(&self, dialer: &Arc<dyn Dialer>) -> Result<(), ConnectorError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(target: LOG_TARGET, "Closing dialer");
        dialer.close().await?;
        Ok(())
    }
}

#[async_trait]
impl BeforeConnect for Connector {
    async fn before_connect(
        &self,
        ctx: &Context,
        config: &mut ConnConfig,
    ) -> Result<(), ConnectorError> {
        let Some(options) = &self.options else {
            return Ok(());
        };
        if self.is_closed() {
            return Err(ConnectorError::Closed);
        }

        let dialer = self.dialer(ctx, options).await?;
        if self.is_closed() {
            self.release(&dialer).await?;
            return Err(ConnectorError::Closed);
        }
        let host = config.host.clone();
        trace!(target: LOG_TARGET, host = %host, "Routing connection through dialer");

        // The instance is named by the host. Network and address are ignored.
        let dial_func: DialFunc = Arc::new(move |ctx: Context, _network: String, _addr: String| {
            let dialer = dialer.clone();
            let host = host.clone();
            async move { ctx.run(dialer.dial(&ctx, &host)).await? }.boxed()
        });
        config.dial_func = Some(dial_func);

        Ok(())
    }
}
