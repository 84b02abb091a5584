//! Debug sink: writes rendered events to standard output.

use async_trait::async_trait;
use firehose_types::Event;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::config::LogFormat;
use crate::sink::{format, Sink, SinkError};

pub struct StdoutSink {
    format: LogFormat,
    out: Mutex<Stdout>,
}

impl StdoutSink {
    #[must_use]
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn connect(&self) -> bool {
        true
    }

    async fn ship(&self, event: &Event) -> Result<(), SinkError> {
        let mut line = format::render(event, self.format);
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|source| SinkError::Write {
                server: "stdout".into(),
                source,
            })
    }
}
