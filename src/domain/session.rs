use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::model::{SavePageFormat, SessionId};

/// Number of byte-count samples kept for the speed estimate.
pub const SPEED_SAMPLES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Downloading,
    Cancelled,
    Finished { success: bool },
}

/// One accepted download, owned by the manager for its whole life.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    path: PathBuf,
    open_on_completion: bool,
    page_format: Option<SavePageFormat>,
    received: u64,
    total: Option<u64>,
    state: SessionState,
    samples: VecDeque<(Instant, u64)>,
    cancelled: Arc<AtomicBool>,
}

impl Session {
    pub fn new(id: SessionId, path: PathBuf, open_on_completion: bool) -> Self {
        Self {
            id,
            path,
            open_on_completion,
            page_format: None,
            received: 0,
            total: None,
            state: SessionState::Downloading,
            samples: VecDeque::with_capacity(SPEED_SAMPLES),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_page_format(mut self, format: Option<SavePageFormat>) -> Self {
        self.page_format = format;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn open_on_completion(&self) -> bool {
        self.open_on_completion
    }

    pub fn page_format(&self) -> Option<SavePageFormat> {
        self.page_format
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_downloading(&self) -> bool {
        self.state == SessionState::Downloading
    }

    /// Flag the transfer polls before writing each chunk.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Records bytes reported by the engine. Ignored once the session is terminal.
    pub fn update_progress(&mut self, received: u64, total: Option<u64>) {
        if !self.is_downloading() {
            return;
        }
        self.received = received;
        if total.is_some() {
            self.total = total;
        }
    }

    /// Pushes a speed sample, dropping the oldest once the window is full.
    pub fn sample(&mut self, now: Instant) {
        if self.samples.len() == SPEED_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((now, self.received));
    }

    pub fn progress_percent(&self) -> u32 {
        match self.total {
            Some(total) if total > 0 => {
                let percent = self.received.saturating_mul(100) / total;
                percent.min(100) as u32
            }
            _ => 0,
        }
    }

    /// Bytes per second across the sample window.
    pub fn current_speed(&self) -> f64 {
        let (Some(&(first_at, first_bytes)), Some(&(last_at, last_bytes))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };

        let elapsed = last_at.saturating_duration_since(first_at).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        last_bytes.saturating_sub(first_bytes) as f64 / elapsed
    }

    /// `None` while the speed is zero, the size is unknown or the estimate overflows.
    pub fn remaining_time(&self) -> Option<Duration> {
        let total = self.total.filter(|&total| total > 0)?;
        let speed = self.current_speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.received) as f64;
        Duration::try_from_secs_f64(remaining / speed).ok()
    }

    /// Returns `true` only when this call moved the session out of `Downloading`.
    pub fn cancel(&mut self) -> bool {
        if !self.is_downloading() {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        self.state = SessionState::Cancelled;
        true
    }

    /// Returns `true` only on the transition, so completion is reported once.
    pub fn finish(&mut self, success: bool) -> bool {
        if !self.is_downloading() {
            return false;
        }
        if success {
            if let Some(total) = self.total {
                self.received = self.received.max(total);
            }
        }
        self.state = SessionState::Finished { success };
        true
    }
}
