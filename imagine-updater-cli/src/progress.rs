//! Terminal progress display driven by session events.

use std::sync::{Arc, Mutex, PoisonError};

use imagine_updater::download::DownloadEvent;
use imagine_updater::session::{EventCallback, SessionEvent, SessionStage};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}";

/// Renders session events as a progress bar.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    /// Highest `done` count seen. Workers report out of order.
    done: Arc<Mutex<u64>>,
}

impl ProgressReporter {
    /// Create a reporter; a hidden one swallows all drawing.
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(0),
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self {
            bar,
            done: Arc::new(Mutex::new(0)),
        }
    }

    /// Callback to hand to the session.
    pub fn callback(&self) -> EventCallback {
        let reporter = self.clone();
        Arc::new(move |event: &SessionEvent| reporter.handle(event))
    }

    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StageChanged(SessionStage::Applying { done, total }) => {
                let mut high = self.done.lock().unwrap_or_else(PoisonError::into_inner);
                *high = (*high).max(*done as u64);
                self.bar.set_length(*total as u64);
                self.bar.set_position(*high);
            }
            SessionEvent::StageChanged(stage) => self.bar.set_message(stage.name()),
            SessionEvent::PlanReady {
                fetch,
                delete,
                skip,
                ..
            } => {
                self.bar.set_length((fetch + delete + skip) as u64);
                self.bar.set_message(format!(
                    "{} to fetch, {} to delete, {} up to date",
                    fetch, delete, skip
                ));
            }
            SessionEvent::FileStarted { path, action, .. } => {
                self.bar.set_message(format!("{} {}", action, path));
            }
            SessionEvent::Download {
                path,
                event:
                    DownloadEvent::RetryScheduled {
                        url,
                        failed_attempt,
                        retries_left,
                    },
            } => {
                self.bar.println(format!(
                    "Download timeout: {} (attempt {}), will retry ({} left)",
                    path.as_deref().unwrap_or(url),
                    failed_attempt,
                    retries_left
                ));
            }
            SessionEvent::Download {
                event: DownloadEvent::HeadersReceived { url, status, .. },
                ..
            } => debug!(url, status, "Response headers received"),
            SessionEvent::FileFailed { path, error, .. } => {
                self.bar.println(format!("Failed: {}: {}", path, error));
            }
            SessionEvent::SessionFinished { .. } | SessionEvent::SessionFailed { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }
    }
}
