use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use merge_options::MergeOptions;
use qcache_cache::query_cache::QueryOptions;
use qcache_connector::{
    AuthMode, CredentialProbe, Credentials, DialerConstruction, DialerOptions, IpType,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CACHE_NAMESPACE: &str = "query_cache";
pub const DEFAULT_CACHE_TTL: u64 = 60;
pub const DEFAULT_CACHE_MAX_ROWS: usize = 100;
pub const DEFAULT_AUTH_REFRESH_TIMEOUT: u64 = 60;

/// Store the query cache is kept in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Documents in a collection.
    #[default]
    Document,
    /// Entities of a kind.
    Entity,
    /// Objects in a bucket.
    Blob,
}

#[derive(Debug, clap::Args, Clone, Serialize, Deserialize, PartialEq, MergeOptions)]
#[serde(default)]
#[command(next_help_heading = "Cache options")]
pub struct CacheOptions {
    #[arg(
        long = "cache.backend",
        value_enum,
        default_value_t = CacheBackend::Document,
        help = "Store to keep cached query results in."
    )]
    pub backend: CacheBackend,

    /// Collection, entity kind or bucket, depending on the backend
    #[arg(
        long = "cache.namespace",
        value_name = "NAME",
        default_value = DEFAULT_CACHE_NAMESPACE,
        help = "Collection, entity kind or bucket holding the cached results."
    )]
    pub namespace: String,

    #[arg(
        long = "cache.ttl",
        value_name = "SECONDS",
        default_value_t = DEFAULT_CACHE_TTL,
        help = "How long query results stay cached, unless the query overrides it with a \
                `-- @cache-ttl` annotation. 0 disables caching."
    )]
    pub ttl: u64,

    #[arg(
        long = "cache.max_rows",
        value_name = "ROWS",
        default_value_t = DEFAULT_CACHE_MAX_ROWS,
        help = "Results with more rows than this are not cached."
    )]
    pub max_rows: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            ttl: DEFAULT_CACHE_TTL,
            max_rows: DEFAULT_CACHE_MAX_ROWS,
        }
    }
}

impl CacheOptions {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions { max_lifetime: Duration::from_secs(self.ttl), max_rows: self.max_rows }
    }
}

#[derive(Debug, clap::Args, Clone, Serialize, Deserialize, PartialEq, MergeOptions)]
#[serde(default)]
#[command(next_help_heading = "Connection authentication options")]
pub struct AuthOptions {
    #[arg(
        long = "auth.skip",
        default_value_t = false,
        help = "Never route connections through the authenticated dialer."
    )]
    pub skip: bool,

    /// Service account credentials. Without it, GOOGLE_APPLICATION_CREDENTIALS is checked and
    /// authentication stays off when it is unset.
    #[arg(
        long = "auth.credentials_file",
        value_name = "PATH",
        help = "Path to the service account credentials file."
    )]
    pub credentials_file: Option<PathBuf>,

    #[arg(
        long = "auth.lazy",
        default_value_t = false,
        help = "Build the dialer on the first connection attempt instead of at startup."
    )]
    pub lazy: bool,

    #[arg(
        long = "auth.ip_type",
        value_name = "TYPE",
        default_value_t = IpType::Public,
        help = "Instance address to connect to: public, private or psc."
    )]
    pub ip_type: IpType,

    #[arg(
        long = "auth.refresh_timeout",
        value_name = "SECONDS",
        default_value_t = DEFAULT_AUTH_REFRESH_TIMEOUT,
        help = "Timeout for refreshing instance metadata and certificates."
    )]
    pub refresh_timeout: u64,

    #[arg(
        long = "auth.iam_authn",
        default_value_t = false,
        help = "Log in with IAM database authentication."
    )]
    pub iam_authn: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            skip: false,
            credentials_file: None,
            lazy: false,
            ip_type: IpType::default(),
            refresh_timeout: DEFAULT_AUTH_REFRESH_TIMEOUT,
            iam_authn: false,
        }
    }
}

impl AuthOptions {
    pub fn construction(&self) -> DialerConstruction {
        if self.lazy {
            DialerConstruction::Lazy
        } else {
            DialerConstruction::Eager
        }
    }

    /// Probes for credentials once and decides how connections are authenticated.
    pub fn auth_mode(&self) -> anyhow::Result<AuthMode> {
        self.auth_mode_with(CredentialProbe::new())
    }

    pub fn auth_mode_with(&self, probe: CredentialProbe) -> anyhow::Result<AuthMode> {
        if self.skip {
            return Ok(AuthMode::Skip);
        }

        let probe = match &self.credentials_file {
            Some(path) => probe.with_file(path),
            None => probe,
        };
        let credentials = probe.probe().context("Failed to probe for credentials")?;

        Ok(match credentials {
            Credentials::Absent => AuthMode::Auto(Credentials::Absent),
            Credentials::File(path) => AuthMode::Options(DialerOptions {
                credentials_file: Some(path),
                ip_type: self.ip_type,
                refresh_timeout: Duration::from_secs(self.refresh_timeout),
                iam_authn: self.iam_authn,
            }),
        })
    }
}
