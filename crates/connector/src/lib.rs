//! Authenticating connection hook for database connection pools.
//!
//! A pool calls [`BeforeConnect::before_connect`] with its own copy of the [`ConnConfig`] before
//! each new physical connection. When authentication is active, the [`Connector`] swaps the
//! config's dial function for one that opens the connection through a shared [`Dialer`], naming
//! the instance by the config's host.

pub mod auth;
pub mod config;
pub mod connector;
pub mod dialer;
pub mod error;


pub use auth::{AuthMode, CredentialProbe, Credentials, DialerOptions, IpType, CREDENTIALS_ENV};
pub use config::{BeforeConnect, ConnConfig, DialFunc};
pub use connector::Connector;
pub use dialer::{BoxedConn, Connection, Dialer, DialerConstruction, DialerFactory};
pub use error::{BoxError, ConnectorError, DialError};

pub(crate) const LOG_TARGET: &str = "qcache::connector";
