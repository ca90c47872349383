use std::{
    io::{self, Stdout, Write},
    sync::Arc,
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::utils::{clock::Clock, time::format_duration};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Receives elapsed time of the running session. Rendering is best-effort and can't fail.
#[cfg_attr(test, mockall::automock)]
pub trait DisplaySink: Send {
    fn render_elapsed(&mut self, elapsed: Duration);

    /// Called once after the last render, when the display stops.
    fn finish(&mut self);
}

/// Prints elapsed time on a single terminal line, overwriting it on every update.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> DisplaySink for ConsoleSink<W> {
    fn render_elapsed(&mut self, elapsed: Duration) {
        let result = write!(
            self.out,
            "\rTracking... Elapsed Time: {}",
            format_duration(elapsed)
        )
        .and_then(|_| self.out.flush());
        if let Err(e) = result {
            debug!("Failed to render elapsed time {e:?}");
        }
    }

    fn finish(&mut self) {
        if let Err(e) = writeln!(self.out).and_then(|_| self.out.flush()) {
            debug!("Failed to end elapsed time line {e:?}");
        }
    }
}

/// Background ticker of a tracking session. Renders elapsed time once per refresh interval
/// until its cancellation token fires.
pub struct LiveDisplay {
    start: Instant,
    sink: Box<dyn DisplaySink>,
    shutdown: CancellationToken,
    refresh_interval: Duration,
    time_provider: Arc<dyn Clock>,
}

impl LiveDisplay {
    pub fn new(
        start: Instant,
        sink: Box<dyn DisplaySink>,
        shutdown: CancellationToken,
        refresh_interval: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            start,
            sink,
            shutdown,
            refresh_interval,
            time_provider,
        }
    }

    /// Executes the display loop. The sink is finished only if something was rendered.
    pub async fn run(mut self) {
        let mut render_point = self.start;
        let mut rendered = false;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let elapsed = self
                .time_provider
                .instant()
                .saturating_duration_since(self.start);
            trace!("Rendering elapsed time {elapsed:?}");
            self.sink.render_elapsed(elapsed);
            rendered = true;

            render_point += self.refresh_interval;
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.time_provider.sleep_until(render_point) => ()
            }
        }
        if rendered {
            self.sink.finish();
        }
        debug!("Live display stopped");
    }
}
