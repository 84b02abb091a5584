mod logging;
mod profiling;

use std::process::ExitCode;

use clap::Parser;
use firehose_engine::config::Settings;
use firehose_engine::{
    exit_code, shutdown_signal, Bootstrap, BootstrapOutcome, DefaultCollaborators, RuntimeConfig,
    StopReason,
};

#[derive(Parser, Debug)]
#[command(
    name = "firehose-to-syslog",
    version,
    about = "Routes platform firehose events to a syslog server"
)]
struct Cli {
    /// Enable debug mode. This disables forwarding to syslog
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Platform API endpoint
    #[arg(long, env = "API_ENDPOINT")]
    api_endpoint: Option<String>,

    /// Overrides the stream endpoint discovered from the API
    #[arg(long, env = "DOPPLER_ENDPOINT")]
    doppler_endpoint: Option<String>,

    /// Syslog server, host:port
    #[arg(long, env = "SYSLOG_ENDPOINT")]
    syslog_server: Option<String>,

    /// Syslog protocol (tcp, udp, tcp+tls)
    #[arg(long, env = "SYSLOG_PROTOCOL", default_value = "tcp")]
    syslog_protocol: String,

    /// Id for the subscription
    #[arg(long, env = "FIREHOSE_SUBSCRIPTION_ID", default_value = "firehose")]
    subscription_id: String,

    /// Client id with doppler.firehose and cloud_controller.admin_read_only scopes
    #[arg(long, env = "FIREHOSE_CLIENT_ID")]
    client_id: Option<String>,

    /// Secret for the client id
    #[arg(long, env = "FIREHOSE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Skip TLS certificate validation for API, token and stream requests
    #[arg(long, env = "SKIP_SSL_VALIDATION")]
    skip_ssl_validation: bool,

    /// Stream idle time before reconnecting
    #[arg(long = "fh-keep-alive", env = "FH_KEEP_ALIVE", default_value = "25s")]
    keep_alive: String,

    /// Periodically log event totals
    #[arg(long, env = "LOG_EVENT_TOTALS")]
    log_event_totals: bool,

    /// How often event totals are logged
    #[arg(long, env = "LOG_EVENT_TOTALS_TIME", default_value = "30s")]
    log_event_totals_time: String,

    /// Comma separated list of events to route
    #[arg(long, env = "EVENTS", default_value = "LogMessage")]
    events: String,

    /// Application metadata cache file
    #[arg(long = "boltdb-path", env = "BOLTDB_PATH", default_value = "my.db")]
    boltdb_path: String,

    /// Full application cache refresh interval
    #[arg(long = "cc-pull-time", env = "CF_PULL_TIME", default_value = "60s")]
    cc_pull_time: String,

    /// Extra fields added to every event, key:value comma separated
    #[arg(long, env = "EXTRA_FIELDS", default_value = "")]
    extra_fields: String,

    /// Profiling mode (cpu, mem, block)
    #[arg(long = "mode-prof", env = "MODE_PROF", default_value = "")]
    mode_prof: String,

    /// Directory for profile output
    #[arg(long = "path-prof", env = "PATH_PROF", default_value = "")]
    path_prof: String,

    /// Event and log format (text, json)
    #[arg(long, env = "LOG_FORMATTER_TYPE")]
    log_formatter_type: Option<String>,

    /// CA bundle used to verify the tcp+tls syslog server
    #[arg(long = "cert-pem-syslog", env = "CERT_PEM", default_value = "")]
    cert_pem_syslog: String,

    /// Remember application ids the API does not know and stop querying them
    #[arg(long, env = "IGNORE_MISSING_APPS")]
    ignore_missing_apps: bool,

    /// How long unknown application ids are remembered
    #[arg(long, env = "MISSING_APPS_TTL", default_value = "1h")]
    missing_apps_ttl: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn json_logs(&self) -> bool {
        self.log_formatter_type.as_deref().map_or(true, |f| f.trim() != "text")
    }

    fn into_settings(self) -> Settings {
        Settings {
            debug: self.debug,
            api_endpoint: self.api_endpoint,
            doppler_endpoint: self.doppler_endpoint,
            syslog_server: self.syslog_server,
            syslog_protocol: self.syslog_protocol,
            subscription_id: self.subscription_id,
            client_id: self.client_id,
            client_secret: self.client_secret,
            skip_ssl_validation: self.skip_ssl_validation,
            keep_alive: self.keep_alive,
            log_event_totals: self.log_event_totals,
            log_event_totals_time: self.log_event_totals_time,
            events: self.events,
            boltdb_path: self.boltdb_path,
            cc_pull_time: self.cc_pull_time,
            extra_fields: self.extra_fields,
            mode_prof: self.mode_prof,
            path_prof: self.path_prof,
            log_formatter_type: self.log_formatter_type,
            cert_pem_syslog: self.cert_pem_syslog,
            ignore_missing_apps: self.ignore_missing_apps,
            missing_apps_ttl: self.missing_apps_ttl,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs());

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Startup failed");
            exit_code::FATAL
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = RuntimeConfig::resolve(cli.into_settings())?;
    let profiler = profiling::start(config.profiling.as_ref())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.platform.api_endpoint,
        events = %config.events,
        debug = config.debug,
        "Starting firehose-to-syslog"
    );

    let code = match Bootstrap::new(&config, &DefaultCollaborators).run().await {
        Err(e) => {
            tracing::error!(stage = %e.stage(), error = %e, "Bootstrap failed");
            exit_code::FATAL
        }
        Ok(outcome @ BootstrapOutcome::DegradedStop { .. }) => outcome.exit_code(),
        Ok(BootstrapOutcome::Running { mut handle, .. }) => {
            let reason = handle.wait(shutdown_signal()).await;
            handle.shutdown();
            match reason {
                StopReason::Shutdown | StopReason::StreamEnded => exit_code::SUCCESS,
                StopReason::StreamFailed => exit_code::FATAL,
            }
        }
    };

    if let Some(profiler) = profiler {
        if let Err(e) = profiler.finish() {
            tracing::warn!(error = %format!("{e:#}"), "Failed to write profile");
        }
    }
    Ok(code)
}
