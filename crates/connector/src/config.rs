use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use qcache_context::Context;
use tokio::net::TcpStream;

use crate::dialer::BoxedConn;
use crate::error::{ConnectorError, DialError};

pub const DEFAULT_PORT: u16 = 5432;

/// Replacement for plain TCP dialing. Receives the network and the `host:port` address.
pub type DialFunc = Arc<
    dyn Fn(Context, String, String) -> BoxFuture<'static, Result<BoxedConn, DialError>>
        + Send
        + Sync,
>;

/// Settings for a single connection attempt. The pool hands every attempt its own clone.
#[derive(Clone)]
pub struct ConnConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub dial_func: Option<DialFunc>,
}

impl fmt::Debug for ConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("dial_func", &self.dial_func.is_some())
            .finish()
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
            user: String::new(),
            dial_func: None,
        }
    }
}

impl ConnConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Opens the connection, through `dial_func` when one is set.
    pub async fn dial(&self, ctx: &Context) -> Result<BoxedConn, DialError> {
        match &self.dial_func {
            Some(dial) => dial(ctx.clone(), "tcp".to_string(), self.address()).await,
            None => {
                let stream = ctx.run(TcpStream::connect(self.address())).await??;
                Ok(Box::new(stream))
            }
        }
    }
}

/// Hook a pool calls with the attempt's config before opening each new connection.
#[async_trait]
pub trait BeforeConnect: Send + Sync {
    async fn before_connect(
        &self,
        ctx: &Context,
        config: &mut ConnConfig,
    ) -> Result<(), ConnectorError>;
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_dial_tcp_without_dial_func() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"R").await.unwrap();
        });

        let config = ConnConfig::new("127.0.0.1", port);
        let mut conn = config.dial(&Context::background()).await.unwrap();
        let mut buf = [0u8; 1];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"R");
        server.await.unwrap();
    }

    #[test]
    fn test_debug_hides_dial_func() {
        let config = ConnConfig::new("db", 5433);
        assert_eq!(config.address(), "db:5433");
        assert!(format!("{config:?}").contains("dial_func: false"));
    }
}
