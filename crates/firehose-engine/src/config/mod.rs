//! Startup configuration: raw settings, Go-style durations, and the
//! validating resolver that produces the immutable [`RuntimeConfig`].

pub mod duration;
pub mod resolver;
pub mod types;

pub use duration::{parse_duration, DurationError};
pub use resolver::ConfigurationError;
pub use types::{
    CacheSettings, LogFormat, PlatformConfig, ProfileMode, ProfileSettings, RuntimeConfig,
    Settings, SinkConfig, StreamSettings, SyslogProtocol,
};
