use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Environment variable pointing at the service account credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a [`CredentialProbe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Absent,
    File(PathBuf),
}

impl Credentials {
    pub fn is_present(&self) -> bool {
        matches!(self, Credentials::File(_))
    }
}

/// Looks for credentials once, before a [`Connector`](crate::Connector) is built.
///
/// An explicit file wins over the environment and must be readable. The environment variable
/// counts as set only when it is non-empty; its path is handed to the dialer unchecked.
#[derive(Debug, Clone)]
pub struct CredentialProbe {
    file: Option<PathBuf>,
    env_var: String,
}

impl Default for CredentialProbe {
    fn default() -> Self {
        Self { file: None, env_var: CREDENTIALS_ENV.to_string() }
    }
}

impl CredentialProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    pub fn probe(&self) -> Result<Credentials, ConnectorError> {
        if let Some(path) = &self.file {
            std::fs::metadata(path).map_err(|source| ConnectorError::Credentials {
                path: path.display().to_string(),
                source,
            })?;
            return Ok(Credentials::File(path.clone()));
        }

        match env::var_os(&self.env_var) {
            Some(path) if !path.is_empty() => Ok(Credentials::File(PathBuf::from(path))),
            _ => Ok(Credentials::Absent),
        }
    }
}

/// Which instance address the dialer connects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    #[default]
    Public,
    Private,
    Psc,
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IpType::Public => "public",
            IpType::Private => "private",
            IpType::Psc => "psc",
        })
    }
}

impl FromStr for IpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(IpType::Public),
            "private" => Ok(IpType::Private),
            "psc" => Ok(IpType::Psc),
            other => Err(format!("unknown ip type {other:?}, expected public, private or psc")),
        }
    }
}

/// Settings passed to the [`DialerFactory`](crate::DialerFactory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerOptions {
    pub credentials_file: Option<PathBuf>,
    pub ip_type: IpType,
    /// Bound on fetching instance metadata and certificates.
    pub refresh_timeout: Duration,
    pub iam_authn: bool,
}

impl Default for DialerOptions {
    fn default() -> Self {
        Self {
            credentials_file: None,
            ip_type: IpType::default(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            iam_authn: false,
        }
    }
}

/// How the connector decides whether to authenticate connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Never authenticate. Connections use the pool's own dialing.
    Skip,
    /// Authenticate with default options when the probe found credentials.
    Auto(Credentials),
    /// Always authenticate with these options.
    Options(DialerOptions),
}

impl AuthMode {
    /// Options for the dialer, or `None` when connections are left alone.
    pub fn dialer_options(&self) -> Option<DialerOptions> {
        match self {
            AuthMode::Skip | AuthMode::Auto(Credentials::Absent) => None,
            AuthMode::Auto(Credentials::File(path)) => Some(DialerOptions {
                credentials_file: Some(path.clone()),
                ..DialerOptions::default()
            }),
            AuthMode::Options(options) => Some(options.clone()),
        }
    }
}
