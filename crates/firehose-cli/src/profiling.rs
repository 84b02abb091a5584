use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use firehose_engine::config::{ProfileMode, ProfileSettings};

const SAMPLE_FREQUENCY: i32 = 1000;

/// A running CPU profiler. [`Profiler::finish`] writes the flamegraph.
pub struct Profiler {
    guard: pprof::ProfilerGuard<'static>,
    output: PathBuf,
}

/// Start profiling for the process lifetime, if requested.
///
/// Only CPU sampling is available; other modes log a warning and run
/// unprofiled.
pub fn start(settings: Option<&ProfileSettings>) -> anyhow::Result<Option<Profiler>> {
    let Some(settings) = settings else {
        return Ok(None);
    };
    match settings.mode {
        ProfileMode::Cpu => {
            let guard = pprof::ProfilerGuardBuilder::default()
                .frequency(SAMPLE_FREQUENCY)
                .blocklist(&["libc", "libgcc", "pthread", "vdso"])
                .build()
                .context("failed to start CPU profiler")?;
            let output = settings.path.join("cpu.svg");
            tracing::info!(path = %output.display(), "CPU profiling enabled");
            Ok(Some(Profiler { guard, output }))
        }
        mode @ (ProfileMode::Mem | ProfileMode::Block) => {
            tracing::warn!(
                mode = %mode,
                "Profiling mode not supported by this build, continuing without it"
            );
            Ok(None)
        }
    }
}

impl Profiler {
    pub fn finish(self) -> anyhow::Result<()> {
        let report = self
            .guard
            .report()
            .build()
            .context("failed to build CPU profile")?;
        if let Some(dir) = self.output.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let file = File::create(&self.output)
            .with_context(|| format!("failed to create {}", self.output.display()))?;
        report
            .flamegraph(file)
            .context("failed to write flamegraph")?;
        tracing::info!(path = %self.output.display(), "CPU profile written");
        Ok(())
    }
}
