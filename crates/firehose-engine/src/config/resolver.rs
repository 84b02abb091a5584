//! Validation of raw [`Settings`] into a [`RuntimeConfig`].

use std::path::PathBuf;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::types::{
    CacheSettings, LogFormat, PlatformConfig, ProfileMode, ProfileSettings, RuntimeConfig,
    Settings, SinkConfig, StreamSettings, SyslogProtocol,
};

/// Startup parameters are missing or contradictory. Lists every problem
/// found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Configuration validation failed:\n  - {}", problems.join("\n  - "))]
pub struct ConfigurationError {
    pub problems: Vec<String>,
}

fn required(value: Option<&str>, name: &str, env: &str, problems: &mut Vec<String>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            problems.push(format!("required flag --{name} (env {env}) is missing"));
            String::new()
        }
    }
}

fn positive_duration(raw: &str, name: &str, problems: &mut Vec<String>) -> Duration {
    match parse_duration(raw) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            problems.push(format!("--{name} must be greater than zero"));
            Duration::ZERO
        }
        Err(e) => {
            problems.push(format!("--{name}: {e}"));
            Duration::ZERO
        }
    }
}

fn parsed<T: Default>(result: Result<T, String>, problems: &mut Vec<String>) -> T {
    result.unwrap_or_else(|e| {
        problems.push(e);
        T::default()
    })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn endpoint(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

impl RuntimeConfig {
    /// Validate `settings` and freeze them into a configuration value.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] listing every missing required
    /// field and every invalid or contradictory value.
    pub fn resolve(settings: Settings) -> Result<Self, ConfigurationError> {
        let mut problems = Vec::new();

        let api_endpoint = required(
            settings.api_endpoint.as_deref(),
            "api-endpoint",
            "API_ENDPOINT",
            &mut problems,
        );
        let client_id = required(
            settings.client_id.as_deref(),
            "client-id",
            "FIREHOSE_CLIENT_ID",
            &mut problems,
        );
        let client_secret = required(
            settings.client_secret.as_deref(),
            "client-secret",
            "FIREHOSE_CLIENT_SECRET",
            &mut problems,
        );

        let syslog_server = settings.syslog_server.as_deref().and_then(non_empty);
        if syslog_server.is_none() && !settings.debug {
            problems.push(
                "--syslog-server (env SYSLOG_ENDPOINT) is required unless --debug is set"
                    .to_string(),
            );
        }

        let protocol = match settings.syslog_protocol.parse::<SyslogProtocol>() {
            Ok(p) => p,
            Err(e) => {
                problems.push(e);
                SyslogProtocol::Tcp
            }
        };
        let ca_cert_path = non_empty(&settings.cert_pem_syslog).map(PathBuf::from);
        if protocol == SyslogProtocol::TcpTls && ca_cert_path.is_none() {
            problems.push("--syslog-protocol tcp+tls requires --cert-pem-syslog".to_string());
        }

        let format: LogFormat = parsed(
            settings
                .log_formatter_type
                .as_deref()
                .unwrap_or_default()
                .parse(),
            &mut problems,
        );

        let profiling = match non_empty(&settings.mode_prof) {
            None => None,
            Some(mode) => match mode.parse::<ProfileMode>() {
                Ok(mode) => Some(ProfileSettings {
                    mode,
                    path: PathBuf::from(settings.path_prof.trim()),
                }),
                Err(e) => {
                    problems.push(e);
                    None
                }
            },
        };

        let subscription_id = settings.subscription_id.trim().to_string();
        if subscription_id.is_empty() {
            problems.push("--subscription-id must not be empty".to_string());
        }

        let keep_alive = positive_duration(&settings.keep_alive, "fh-keep-alive", &mut problems);
        let totals_interval = positive_duration(
            &settings.log_event_totals_time,
            "log-event-totals-time",
            &mut problems,
        );
        let invalidate_ttl =
            positive_duration(&settings.cc_pull_time, "cc-pull-time", &mut problems);
        let missing_apps_ttl =
            positive_duration(&settings.missing_apps_ttl, "missing-apps-ttl", &mut problems);

        let cache_path = settings.boltdb_path.trim();
        if cache_path.is_empty() {
            problems.push("--boltdb-path must not be empty".to_string());
        }

        if !problems.is_empty() {
            return Err(ConfigurationError { problems });
        }

        Ok(Self {
            debug: settings.debug,
            platform: PlatformConfig {
                api_endpoint: endpoint(api_endpoint),
                client_id,
                client_secret,
                skip_ssl_validation: settings.skip_ssl_validation,
                stream_endpoint_override: settings
                    .doppler_endpoint
                    .as_deref()
                    .and_then(non_empty)
                    .map(endpoint),
            },
            sink: SinkConfig {
                server: syslog_server,
                protocol,
                format,
                ca_cert_path,
            },
            stream: StreamSettings {
                subscription_id,
                keep_alive,
            },
            cache: CacheSettings {
                path: PathBuf::from(cache_path),
                invalidate_ttl,
                ignore_missing_apps: settings.ignore_missing_apps,
                missing_apps_ttl,
            },
            events: settings.events,
            extra_fields: settings.extra_fields,
            event_totals_interval: settings.log_event_totals.then_some(totals_interval),
            profiling,
        })
    }
}
