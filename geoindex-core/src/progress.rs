//! Progress channel between measured work and the terminal display.
//!
//! Measured code publishes `(completed, total)` samples through a
//! [`Progress`] handle. A [`ProgressReporter`] renders the latest sample on a
//! background thread so rendering never runs on the measured path.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Interval between two renders of the progress line.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(100);

const BAR_WIDTH: usize = 50;

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    total: AtomicUsize,
}

/// Cloneable handle publishing progress samples.
///
/// Updates are lock-free stores; readers see the latest published pair.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    counters: Arc<Counters>,
}

impl Progress {
    /// Create a handle starting at `(0, 0)`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new sample.
    pub fn set(&self, completed: usize, total: usize) {
        self.counters.total.store(total, Ordering::Relaxed);
        self.counters.completed.store(completed, Ordering::Relaxed);
    }

    /// Latest `(completed, total)` sample.
    #[must_use]
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.counters.completed.load(Ordering::Relaxed),
            self.counters.total.load(Ordering::Relaxed),
        )
    }
}

/// How the tracked phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Finished,
    Abandoned,
}

/// Background renderer for one phase.
///
/// Dropping the reporter without calling [`finish`](Self::finish) stops the
/// render thread after drawing the last published sample, so a failed phase
/// never shows as complete.
#[derive(Debug)]
pub struct ProgressReporter {
    progress: Progress,
    started: Instant,
    stop: Option<Sender<Ending>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start rendering progress samples to `out` every [`RENDER_INTERVAL`].
    ///
    /// When the render thread cannot be spawned the reporter still hands out
    /// a working [`Progress`] handle; nothing is rendered.
    pub fn spawn<W>(out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let progress = Progress::new();
        let started = Instant::now();
        let (stop, stopped) = mpsc::channel::<Ending>();
        let shared = progress.clone();

        let spawned = thread::Builder::new()
            .name("geoindex-progress".to_owned())
            .spawn(move || {
                let mut out = out;
                let ending = loop {
                    let (completed, total) = shared.snapshot();
                    render(&mut out, &render_progress_line(completed, total, started.elapsed()));
                    match stopped.recv_timeout(RENDER_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(ending) => break ending,
                        Err(RecvTimeoutError::Disconnected) => break Ending::Abandoned,
                    }
                };
                let (completed, total) = match ending {
                    Ending::Finished => (1, 1),
                    Ending::Abandoned => shared.snapshot(),
                };
                let line = render_progress_line(completed, total, started.elapsed());
                if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
                    debug!("progress output closed: {err}");
                }
            });

        let (stop, handle) = match spawned {
            Ok(handle) => (Some(stop), Some(handle)),
            Err(err) => {
                warn!("progress display disabled: {err}");
                (None, None)
            }
        };
        Self {
            progress,
            started,
            stop,
            handle,
        }
    }

    /// Handle for publishing samples to this reporter.
    #[must_use]
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Render the 100 % line, stop the thread and return the phase duration.
    pub fn finish(mut self) -> Duration {
        self.shutdown(Ending::Finished);
        self.started.elapsed()
    }

    fn shutdown(&mut self, ending: Ending) {
        if let Some(stop) = self.stop.take() {
            // A closed channel means the thread already exited.
            stop.send(ending).ok();
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("progress render thread panicked");
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown(Ending::Abandoned);
    }
}

fn render(out: &mut impl Write, line: &str) {
    if let Err(err) = write!(out, "{line}\r").and_then(|()| out.flush()) {
        debug!("progress output closed: {err}");
    }
}

/// Format one progress line as `[HH:MM:SS|====>   ] NN%`.
///
/// A zero `total` renders as 0 %.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use geoindex_core::render_progress_line;
///
/// let line = render_progress_line(1, 2, Duration::from_secs(3_725));
/// assert!(line.starts_with("[01:02:05|"));
/// assert!(line.ends_with("] 50%"));
/// ```
#[must_use]
pub fn render_progress_line(completed: usize, total: usize, elapsed: Duration) -> String {
    let percent = if total == 0 {
        0
    } else {
        completed.min(total).saturating_mul(100) / total
    };
    let filled = percent * BAR_WIDTH / 100;

    let mut bar = "=".repeat(filled);
    if filled < BAR_WIDTH {
        bar.push('>');
        bar.push_str(&" ".repeat(BAR_WIDTH - filled - 1));
    }

    let secs = elapsed.as_secs();
    format!(
        "[{:02}:{:02}:{:02}|{bar}] {percent}%",
        secs / 3_600,
        (secs / 60) % 60,
        secs % 60
    )
}
