//! The download manager: owns every session, resolves new requests and keeps
//! the panel's summary and close policy.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use url::Url;

use super::aggregator::{self, Summary, DEFAULT_TITLE};
use super::collaborators::{Host, Notification};
use super::disposition::Resolver;
use crate::config::ManagerSettings;
use crate::domain::{
    Disposition, DownloadOption, DownloadRequest, SavePageFormat, Session, SessionId,
};

/// A request the manager took on; the engine starts the transfer from this.
#[derive(Debug, Clone)]
pub struct AcceptedDownload {
    pub id: SessionId,
    pub url: Url,
    pub path: PathBuf,
    pub page_format: Option<SavePageFormat>,
    pub cancel_flag: Arc<AtomicBool>,
}

/// Answer to a download request, handed back to the engine exactly once.
#[derive(Debug, Clone)]
pub enum Resolution {
    Accepted(AcceptedDownload),
    Rejected,
}

/// Callbacks the download engine drives.
pub trait EngineEvents {
    fn on_request(&mut self, request: DownloadRequest) -> Resolution;

    fn on_progress(&mut self, id: SessionId, received: u64, total: Option<u64>);

    fn on_finished(&mut self, id: SessionId, success: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Accepted,
    Ignored,
}

pub struct DownloadManager {
    host: Host,
    settings: ManagerSettings,
    last_option: DownloadOption,
    temp_dir: PathBuf,
    sessions: Vec<Session>,
    next_id: u64,
    summary: Option<Summary>,
    panel: PanelState,
    force_close: bool,
    batch_had_success: bool,
}

impl DownloadManager {
    pub fn new(host: Host, temp_dir: PathBuf) -> Self {
        let settings = match host.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load download settings, using defaults: {}", e);
                ManagerSettings::default().normalized()
            }
        };
        tracing::debug!(?settings, "Download manager settings loaded");

        Self {
            host,
            settings,
            last_option: DownloadOption::NoOption,
            temp_dir,
            sessions: Vec::new(),
            next_id: 1,
            summary: None,
            panel: PanelState::Open,
            force_close: false,
            batch_had_success: false,
        }
    }

    #[cfg(test)]
    pub fn last_option(&self) -> DownloadOption {
        self.last_option
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    #[cfg(test)]
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn title(&self) -> String {
        self.summary
            .as_ref()
            .map(Summary::title)
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    pub fn panel_state(&self) -> PanelState {
        self.panel
    }

    pub fn has_active_downloads(&self) -> bool {
        self.sessions.iter().any(Session::is_downloading)
    }

    /// Resolves what to do with `request` and, unless it is rejected, starts tracking it.
    pub fn download(&mut self, request: DownloadRequest) -> Resolution {
        let disposition = Resolver {
            settings: &mut self.settings,
            last_option: &mut self.last_option,
            temp_dir: &self.temp_dir,
            host: &self.host,
        }
        .resolve(&request);

        let (path, open_on_completion, page_format) = match disposition {
            Disposition::Open { path } => (path, true, None),
            Disposition::Save { path } => (path, false, None),
            Disposition::SavePage { path, format } => (path, false, format.or(request.page_format)),
            Disposition::ExternalManager | Disposition::Cancel => {
                tracing::debug!("Rejecting download of {}", request.url);
                return Resolution::Rejected;
            }
        };

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let session = Session::new(id, path.clone(), open_on_completion).with_page_format(page_format);
        let cancel_flag = session.cancel_flag();
        self.sessions.push(session);
        self.panel = PanelState::Open;

        tracing::info!("Download {} of {} to {}", id, request.url, path.display());
        Resolution::Accepted(AcceptedDownload {
            id,
            url: request.url,
            path,
            page_format,
            cancel_flag,
        })
    }

    pub fn update_progress(&mut self, id: SessionId, received: u64, total: Option<u64>) {
        if let Some(session) = self.session_mut(id) {
            session.update_progress(received, total);
        }
    }

    pub fn download_finished(&mut self, id: SessionId, success: bool) {
        let Some(session) = self.session_mut(id) else {
            return;
        };
        if !session.finish(success) {
            return;
        }

        let open_path = (success && session.open_on_completion()).then(|| session.path().to_path_buf());
        tracing::info!(
            "Download {} {}",
            id,
            if success { "finished" } else { "failed" }
        );

        if let Some(path) = open_path {
            self.host.launcher.open(&path);
        }
        self.batch_had_success |= success;
        self.check_all_finished();
    }

    /// Cancels an active session; terminal sessions are left untouched.
    pub fn cancel(&mut self, id: SessionId) {
        let cancelled = self.session_mut(id).is_some_and(Session::cancel);
        if cancelled {
            tracing::info!("Download {} cancelled", id);
            self.check_all_finished();
        }
    }

    /// Removes a session from the list. Active sessions are never removed.
    pub fn remove(&mut self, id: SessionId) -> bool {
        let Some(index) = self.sessions.iter().position(|s| s.id() == id) else {
            return false;
        };
        if self.sessions[index].is_downloading() {
            return false;
        }
        self.sessions.remove(index);
        true
    }

    /// Drops every session that is no longer downloading.
    pub fn clear_list(&mut self) {
        self.sessions.retain(Session::is_downloading);
    }

    /// Samples active sessions and refreshes the summary line.
    pub fn tick(&mut self, now: Instant) {
        aggregator::sample_active(&mut self.sessions, now);
        self.summary = aggregator::aggregate(&self.sessions);
    }

    pub fn can_close(&self) -> bool {
        self.force_close || !self.has_active_downloads()
    }

    /// Handles a close request for the panel.
    pub fn request_close(&mut self) -> CloseDecision {
        if !self.host.lifecycle.has_top_level_windows() {
            if !self.can_close() {
                let confirmed = self.host.dialogs.confirm(
                    "Warning",
                    "Are you sure you want to quit? All uncompleted downloads will be cancelled!",
                );
                if !confirmed {
                    return CloseDecision::Ignored;
                }
                self.force_close = true;
            }
            self.host.lifecycle.quit();
        }
        self.panel = PanelState::Closing;
        CloseDecision::Accepted
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    fn check_all_finished(&mut self) {
        if self.has_active_downloads() {
            return;
        }

        let had_success = std::mem::take(&mut self.batch_had_success);
        if had_success && !self.host.lifecycle.is_panel_active() {
            self.host.notifier.notify(Notification {
                icon: "download",
                title: "Download Finished".to_string(),
                body: "All files have been successfully downloaded.".to_string(),
            });
        }

        self.summary = None;
        if self.settings.close_on_finish {
            self.request_close();
        }
    }
}

impl EngineEvents for DownloadManager {
    fn on_request(&mut self, request: DownloadRequest) -> Resolution {
        self.download(request)
    }

    fn on_progress(&mut self, id: SessionId, received: u64, total: Option<u64>) {
        self.update_progress(id, received, total);
    }

    fn on_finished(&mut self, id: SessionId, success: bool) {
        self.download_finished(id, success);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::application::collaborators::testing::{host, Recorder};
    use crate::domain::{PromptChoice, SessionState};

    struct Fixture {
        recorder: Rc<Recorder>,
        manager: DownloadManager,
        _dir: tempfile::TempDir,
    }

    fn fixture(configure: impl FnOnce(&mut ManagerSettings)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ManagerSettings {
            default_download_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        configure(&mut settings);

        let recorder = Recorder::new(settings);
        let manager = DownloadManager::new(host(&recorder), dir.path().join("tmp"));
        Fixture {
            recorder,
            manager,
            _dir: dir,
        }
    }

    fn request(name: &str) -> DownloadRequest {
        DownloadRequest::new(Url::parse(&format!("http://x/{}", name)).unwrap(), name)
    }

    fn accept(manager: &mut DownloadManager, name: &str) -> AcceptedDownload {
        match manager.on_request(request(name)) {
            Resolution::Accepted(accepted) => accepted,
            Resolution::Rejected => panic!("{} was rejected", name),
        }
    }

    #[test]
    fn test_accepted_download_creates_session() {
        let mut f = fixture(|_| {});
        let accepted = accept(&mut f.manager, "a.zip");

        assert_eq!(f.manager.sessions().len(), 1);
        let session = f.manager.session(accepted.id).unwrap();
        assert!(session.is_downloading());
        assert_eq!(session.path(), accepted.path.as_path());
        assert!(!session.open_on_completion());
    }

    #[test]
    fn test_cancelled_request_is_rejected() {
        let mut f = fixture(|s| s.default_download_path = None);
        f.recorder.option_answer.set(Some(PromptChoice::Cancel));

        assert!(matches!(
            f.manager.on_request(request("a.zip")),
            Resolution::Rejected
        ));
        assert!(f.manager.sessions().is_empty());
    }

    #[test]
    fn test_external_manager_is_rejected_locally() {
        let mut f = fixture(|s| {
            s.use_external_manager = true;
            s.external_executable = "aria2c".to_string();
        });
        assert!(matches!(
            f.manager.on_request(request("a.zip")),
            Resolution::Rejected
        ));
        assert_eq!(f.manager.last_option(), DownloadOption::ExternalManager);
        assert_eq!(f.recorder.launches.borrow().len(), 1);
    }

    #[test]
    fn test_sessions_keep_insertion_order() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");
        let c = accept(&mut f.manager, "c.zip");

        let ids: Vec<SessionId> = f.manager.sessions().iter().map(Session::id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_tick_summarizes_active_sessions() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");

        f.manager.on_progress(a.id, 20, Some(100));
        f.manager.on_progress(b.id, 60, Some(100));
        f.manager.tick(Instant::now());

        let summary = f.manager.summary().unwrap();
        assert_eq!(summary.average_progress, 40);
        assert_eq!(summary.active, 2);
        assert_eq!(f.manager.title(), "40% - Download Manager");

        f.manager.on_finished(a.id, true);
        f.manager.on_finished(b.id, true);
        assert!(f.manager.summary().is_none());
        assert_eq!(f.manager.title(), "Download Manager");

        f.manager.tick(Instant::now());
        assert!(f.manager.summary().is_none());
    }

    #[test]
    fn test_all_finished_fires_once() {
        let mut f = fixture(|_| {});
        let ids: Vec<SessionId> = ["a", "b", "c"]
            .iter()
            .map(|name| accept(&mut f.manager, name).id)
            .collect();

        f.manager.on_finished(ids[0], true);
        f.manager.on_finished(ids[1], false);
        assert!(f.recorder.notifications.borrow().is_empty());

        f.manager.on_finished(ids[2], false);
        f.manager.on_finished(ids[2], true);
        let notifications = f.recorder.notifications.borrow();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Download Finished");
    }

    #[test]
    fn test_no_notification_without_success() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");

        f.manager.cancel(a.id);
        f.manager.on_finished(b.id, false);
        assert!(f.recorder.notifications.borrow().is_empty());
    }

    #[test]
    fn test_no_notification_when_panel_is_active() {
        let mut f = fixture(|_| {});
        f.recorder.panel_active.set(true);
        let a = accept(&mut f.manager, "a.zip");
        f.manager.on_finished(a.id, true);
        assert!(f.recorder.notifications.borrow().is_empty());
    }

    #[test]
    fn test_close_on_finish() {
        let mut f = fixture(|s| s.close_on_finish = true);
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");

        f.manager.on_finished(a.id, true);
        assert_eq!(f.manager.panel_state(), PanelState::Open);

        f.manager.on_finished(b.id, true);
        assert_eq!(f.manager.panel_state(), PanelState::Closing);
        assert_eq!(f.recorder.quits.get(), 0);
        assert_eq!(f.recorder.notifications.borrow().len(), 1);
    }

    #[test]
    fn test_cancel_finished_session_is_noop() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        f.manager.on_finished(a.id, true);

        f.manager.cancel(a.id);
        let session = f.manager.session(a.id).unwrap();
        assert_eq!(session.state(), SessionState::Finished { success: true });
        assert!(!a.cancel_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_raises_flag() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        f.manager.cancel(a.id);
        assert!(a.cancel_flag.load(Ordering::SeqCst));

        // The transfer reports its own end after observing the flag.
        f.manager.on_finished(a.id, false);
        assert_eq!(
            f.manager.session(a.id).unwrap().state(),
            SessionState::Cancelled
        );
    }

    #[test]
    fn test_active_session_cannot_be_removed() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");

        assert!(!f.manager.remove(a.id));
        f.manager.on_finished(b.id, true);
        assert!(f.manager.remove(b.id));
        assert!(!f.manager.remove(b.id));
        assert_eq!(f.manager.sessions().len(), 1);
    }

    #[test]
    fn test_clear_list_keeps_active() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        let b = accept(&mut f.manager, "b.zip");
        let c = accept(&mut f.manager, "c.zip");
        f.manager.on_finished(a.id, true);
        f.manager.cancel(c.id);

        f.manager.clear_list();
        let ids: Vec<SessionId> = f.manager.sessions().iter().map(Session::id).collect();
        assert_eq!(ids, vec![b.id]);
    }

    #[test]
    fn test_can_close() {
        let mut f = fixture(|_| {});
        assert!(f.manager.can_close());

        let a = accept(&mut f.manager, "a.zip");
        assert!(!f.manager.can_close());

        f.manager.on_finished(a.id, false);
        assert!(f.manager.can_close());
    }

    #[test]
    fn test_close_with_other_windows_is_accepted() {
        let mut f = fixture(|_| {});
        accept(&mut f.manager, "a.zip");

        assert_eq!(f.manager.request_close(), CloseDecision::Accepted);
        assert_eq!(f.recorder.confirms.get(), 0);
        assert_eq!(f.recorder.quits.get(), 0);
    }

    #[test]
    fn test_quit_with_active_downloads_needs_confirmation() {
        let mut f = fixture(|_| {});
        f.recorder.has_windows.set(false);
        accept(&mut f.manager, "a.zip");

        f.recorder.confirm_answer.set(false);
        assert_eq!(f.manager.request_close(), CloseDecision::Ignored);
        assert_eq!(f.manager.panel_state(), PanelState::Open);
        assert_eq!(f.recorder.quits.get(), 0);
        assert!(!f.manager.can_close());

        f.recorder.confirm_answer.set(true);
        assert_eq!(f.manager.request_close(), CloseDecision::Accepted);
        assert_eq!(f.recorder.quits.get(), 1);
        assert!(f.manager.can_close());
        assert_eq!(f.recorder.confirms.get(), 2);
    }

    #[test]
    fn test_quit_when_idle_skips_confirmation() {
        let mut f = fixture(|_| {});
        f.recorder.has_windows.set(false);

        assert_eq!(f.manager.request_close(), CloseDecision::Accepted);
        assert_eq!(f.recorder.confirms.get(), 0);
        assert_eq!(f.recorder.quits.get(), 1);
    }

    #[test]
    fn test_open_disposition_opens_on_success() {
        let mut f = fixture(|s| s.default_download_path = None);
        f.recorder.option_answer.set(Some(PromptChoice::Open));

        let a = accept(&mut f.manager, "a.zip");
        assert!(f.manager.session(a.id).unwrap().open_on_completion());
        assert_eq!(f.manager.last_option(), DownloadOption::OpenFile);

        f.manager.on_finished(a.id, true);
        assert_eq!(*f.recorder.opened.borrow(), vec![a.path.clone()]);
    }

    #[test]
    fn test_open_passes_shell_characters_verbatim() {
        let mut f = fixture(|s| s.default_download_path = None);
        f.recorder.option_answer.set(Some(PromptChoice::Open));

        let a = accept(&mut f.manager, "a&calc.pdf");
        assert_eq!(a.path.file_name().unwrap(), "a&calc.pdf");

        f.manager.on_finished(a.id, true);
        assert_eq!(*f.recorder.opened.borrow(), vec![a.path.clone()]);
    }

    #[test]
    fn test_progress_after_finish_is_ignored() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        f.manager.on_progress(a.id, 10, Some(100));
        f.manager.on_finished(a.id, false);
        f.manager.on_progress(a.id, 90, Some(100));
        assert_eq!(f.manager.session(a.id).unwrap().received(), 10);
    }

    #[test]
    fn test_stalled_download_keeps_summary() {
        let mut f = fixture(|_| {});
        let a = accept(&mut f.manager, "a.zip");
        f.manager.on_progress(a.id, 50, Some(100));

        let start = Instant::now();
        for i in 0..4 {
            f.manager.tick(start + Duration::from_millis(500 * i));
        }
        let summary = f.manager.summary().unwrap();
        assert_eq!(summary.total_speed, 0.0);
        assert_eq!(summary.max_remaining, None);
        assert_eq!(summary.average_progress, 50);
    }
}
