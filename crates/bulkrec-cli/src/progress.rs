//! Terminal progress rendering for streamed submissions

use indicatif::{ProgressBar, ProgressStyle};

use bulkrec_common::types::ProgressEvent;

/// Create a spinner for the phases before chunk counts are known
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Style used once the number of chunks is known
fn chunk_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} chunks {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Drives one progress bar from the event stream
pub struct JobProgress {
    bar: ProgressBar,
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            bar: create_spinner("Uploading"),
        }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Status(update) => {
                if let Some(total) = update.total_chunks {
                    if self.bar.length() != Some(u64::from(total)) {
                        self.bar.set_length(u64::from(total));
                        self.bar.set_style(chunk_style());
                    }
                }
                self.bar.set_message(update.message.clone());
            },
            ProgressEvent::ChunkComplete(progress) => {
                self.bar.set_position(u64::from(progress.sequence));
                self.bar.set_message(chunk_message(progress.chunk.succeeded, progress.aggregate.total_reconciled));
                if !progress.chunk.succeeded {
                    self.bar.println(format!(
                        "chunk {} failed: {}",
                        progress.sequence,
                        progress.chunk.errors.join("; ")
                    ));
                }
            },
            ProgressEvent::Complete(_) | ProgressEvent::Failed(_) => {
                self.bar.finish_and_clear();
            },
        }
    }

    /// Clear the bar if the stream ends early
    pub fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk_message(succeeded: bool, total_reconciled: u64) -> String {
    if succeeded {
        format!("{} reconciled", total_reconciled)
    } else {
        format!("{} reconciled, last chunk failed", total_reconciled)
    }
}
