//! Raw startup settings and the resolved, immutable runtime configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Unvalidated startup parameters, one field per flag / environment
/// variable. Produced by the CLI layer; consumed once by
/// [`RuntimeConfig::resolve`](crate::config::RuntimeConfig::resolve).
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub api_endpoint: Option<String>,
    pub doppler_endpoint: Option<String>,
    pub syslog_server: Option<String>,
    pub syslog_protocol: String,
    pub subscription_id: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub skip_ssl_validation: bool,
    pub keep_alive: String,
    pub log_event_totals: bool,
    pub log_event_totals_time: String,
    pub events: String,
    pub boltdb_path: String,
    pub cc_pull_time: String,
    pub extra_fields: String,
    pub mode_prof: String,
    pub path_prof: String,
    pub log_formatter_type: Option<String>,
    pub cert_pem_syslog: String,
    pub ignore_missing_apps: bool,
    pub missing_apps_ttl: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            api_endpoint: None,
            doppler_endpoint: None,
            syslog_server: None,
            syslog_protocol: "tcp".into(),
            subscription_id: "firehose".into(),
            client_id: None,
            client_secret: None,
            skip_ssl_validation: false,
            keep_alive: "25s".into(),
            log_event_totals: false,
            log_event_totals_time: "30s".into(),
            events: "LogMessage".into(),
            boltdb_path: "my.db".into(),
            cc_pull_time: "60s".into(),
            extra_fields: String::new(),
            mode_prof: String::new(),
            path_prof: String::new(),
            log_formatter_type: None,
            cert_pem_syslog: String::new(),
            ignore_missing_apps: false,
            missing_apps_ttl: "1h".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Syslog transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogProtocol {
    Tcp,
    Udp,
    TcpTls,
}

impl FromStr for SyslogProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "tcp+tls" => Ok(Self::TcpTls),
            other => Err(format!(
                "unknown syslog protocol '{other}', expected one of tcp, udp, tcp+tls"
            )),
        }
    }
}

impl fmt::Display for SyslogProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::TcpTls => "tcp+tls",
        })
    }
}

/// Rendering of routed events (and of the process's own log lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Text,
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!(
                "unknown log formatter type '{other}', expected text or json"
            )),
        }
    }
}

/// Profiling mode requested for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    Cpu,
    Mem,
    Block,
}

impl FromStr for ProfileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cpu" => Ok(Self::Cpu),
            "mem" => Ok(Self::Mem),
            "block" => Ok(Self::Block),
            other => Err(format!(
                "unknown profiling mode '{other}', expected one of cpu, mem, block"
            )),
        }
    }
}

impl fmt::Display for ProfileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Mem => "mem",
            Self::Block => "block",
        })
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Platform API access.
#[derive(Clone)]
pub struct PlatformConfig {
    pub api_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub skip_ssl_validation: bool,
    /// Replaces the discovered stream endpoint when set.
    pub stream_endpoint_override: Option<String>,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .field("stream_endpoint_override", &self.stream_endpoint_override)
            .finish()
    }
}

/// Output sink settings.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// `host:port`; `None` only in debug mode.
    pub server: Option<String>,
    pub protocol: SyslogProtocol,
    pub format: LogFormat,
    /// CA bundle used to verify the `tcp+tls` server.
    pub ca_cert_path: Option<PathBuf>,
}

/// Stream subscription settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub subscription_id: String,
    /// Idle time after which the subscription is considered dead.
    pub keep_alive: Duration,
}

/// Metadata cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub path: PathBuf,
    pub invalidate_ttl: Duration,
    pub ignore_missing_apps: bool,
    pub missing_apps_ttl: Duration,
}

/// Profiling request.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub mode: ProfileMode,
    /// Output directory; empty means the working directory.
    pub path: PathBuf,
}

/// Every resolved startup parameter. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub debug: bool,
    pub platform: PlatformConfig,
    pub sink: SinkConfig,
    pub stream: StreamSettings,
    pub cache: CacheSettings,
    /// Requested event kinds, comma separated, as given.
    pub events: String,
    /// Static annotation fields, `key:value` comma separated, as given.
    pub extra_fields: String,
    /// Interval of the event-totals log, when enabled.
    pub event_totals_interval: Option<Duration>,
    pub profiling: Option<ProfileSettings>,
}
