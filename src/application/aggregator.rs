use std::fmt;
use std::time::{Duration, Instant};

use crate::domain::Session;
use crate::utils::{format_remaining, format_speed};

/// Period of the summary refresh.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_TITLE: &str = "Download Manager";

/// Combined progress of every session that is still downloading.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub average_progress: u32,
    pub active: usize,
    pub total_speed: f64,
    /// Longest known ETA; `None` when no active session has one.
    pub max_remaining: Option<Duration>,
}

impl Summary {
    pub fn title(&self) -> String {
        format!("{}% - {}", self.average_progress, DEFAULT_TITLE)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% of {} files ({}) {} remaining",
            self.average_progress,
            self.active,
            format_speed(self.total_speed),
            format_remaining(self.max_remaining)
        )
    }
}

/// Takes a speed sample from every active session.
pub fn sample_active(sessions: &mut [Session], now: Instant) {
    sessions
        .iter_mut()
        .filter(|session| session.is_downloading())
        .for_each(|session| session.sample(now));
}

/// `None` when nothing is downloading.
pub fn aggregate(sessions: &[Session]) -> Option<Summary> {
    let active: Vec<&Session> = sessions.iter().filter(|s| s.is_downloading()).collect();
    if active.is_empty() {
        return None;
    }

    let progress_sum: u64 = active.iter().map(|s| u64::from(s.progress_percent())).sum();
    let average_progress = (progress_sum / active.len() as u64) as u32;
    let total_speed = active.iter().map(|s| s.current_speed()).sum();
    let max_remaining = active.iter().filter_map(|s| s.remaining_time()).max();

    Some(Summary {
        average_progress,
        active: active.len(),
        total_speed,
        max_remaining,
    })
}
