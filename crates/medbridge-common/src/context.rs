//! Run-scoped progress counters and cooperative cancellation
//!
//! One `RunContext` is created per ingestion or migration run and shared by
//! reference (`Arc`) with every worker of that run. Counters are atomics, so
//! workers never contend on a lock to report progress, and cancellation is a
//! `CancellationToken` polled at the same points the loops already yield.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Counters and cancellation shared by the workers of a single run
pub struct RunContext {
    queued: AtomicU64,
    downloaded: AtomicU64,
    download_failures: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    cancel: CancellationToken,
    download_bar: ProgressBar,
    load_bar: ProgressBar,
}

/// Point-in-time copy of a run's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub queued: u64,
    pub downloaded: u64,
    pub download_failures: u64,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Context with hidden progress bars and a fresh cancellation token
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Context bound to an externally owned cancellation token
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            queued: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            download_failures: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cancel,
            download_bar: ProgressBar::hidden(),
            load_bar: ProgressBar::hidden(),
        }
    }

    /// Draw download and load bars on the terminal
    pub fn with_progress_bars(mut self) -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        self.download_bar = multi.add(styled_bar("Download"));
        self.load_bar = multi.add(styled_bar("Load"));
        self
    }

    /// Announce how many files this run will attempt
    pub fn set_queued(&self, total: u64) {
        self.queued.store(total, Ordering::SeqCst);
        self.download_bar.set_length(total);
        self.load_bar.set_length(total);
    }

    pub fn record_download(&self) {
        self.downloaded.fetch_add(1, Ordering::SeqCst);
        self.download_bar.inc(1);
    }

    pub fn record_download_failure(&self) {
        self.download_failures.fetch_add(1, Ordering::SeqCst);
        self.download_bar.inc(1);
        // A file that never arrives will never be loaded either
        let remaining = self.load_bar.length().unwrap_or(0).saturating_sub(1);
        self.load_bar.set_length(remaining);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.load_bar.inc(1);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.load_bar.inc(1);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.load_bar.inc(1);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            queued: self.queued.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            download_failures: self.download_failures.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token clone for monitors (signal handlers) that live outside the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn finish_progress(&self) {
        self.download_bar.finish();
        self.load_bar.finish();
    }
}

fn styled_bar(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:>8} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_prefix(prefix);
    bar
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_accumulate() {
        let ctx = RunContext::new();
        ctx.set_queued(3);
        ctx.record_download();
        ctx.record_download();
        ctx.record_download_failure();
        ctx.record_processed();
        ctx.record_skipped();

        assert_eq!(
            ctx.snapshot(),
            ProgressSnapshot {
                queued: 3,
                downloaded: 2,
                download_failures: 1,
                processed: 1,
                skipped: 1,
                errors: 0,
            }
        );
    }

    #[test]
    fn test_external_token_cancels_context() {
        let token = CancellationToken::new();
        let ctx = RunContext::with_token(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_counters_are_shared_across_tasks() {
        let ctx = Arc::new(RunContext::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    ctx.record_error();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ctx.snapshot().errors, 800);
    }
}
