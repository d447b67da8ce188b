//! Everything the download manager needs from the outside world.
//!
//! The manager never talks to a toolkit directly: dialogs, process spawning,
//! notifications and application lifecycle all go through these traits, so the
//! same core drives the iced panel and the in-memory doubles used in tests.

use std::path::{Path, PathBuf};

use url::Url;

use crate::config::SettingsStore;
use crate::domain::{DownloadOption, PromptChoice};

/// One filter entry shown in the save dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SavePrompt {
    pub title: String,
    pub directory: PathBuf,
    pub file_name: String,
    pub filters: Vec<SaveFilter>,
    pub use_native_dialog: bool,
}

pub trait Dialogs {
    /// Returns the chosen path and the index of the filter it was saved with.
    fn choose_save_path(&self, prompt: &SavePrompt) -> Option<(PathBuf, Option<usize>)>;

    fn prompt_option(
        &self,
        file_name: &str,
        url: &Url,
        last_option: DownloadOption,
        show_external: bool,
    ) -> PromptChoice;

    /// Yes/no question, `true` on yes.
    fn confirm(&self, title: &str, text: &str) -> bool;
}

pub trait Launcher {
    fn launch(&self, executable: &str, args: &[String]);

    /// Opens a finished file with the system's default handler.
    fn open(&self, path: &Path);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub icon: &'static str,
    pub title: String,
    pub body: String,
}

pub trait Notifier {
    fn notify(&self, notification: Notification);
}

pub trait AppLifecycle {
    /// `false` means the application is about to exit once the panel closes.
    fn has_top_level_windows(&self) -> bool;

    fn is_panel_active(&self) -> bool;

    fn quit(&self);
}

/// The full set of collaborators handed to the manager at construction.
pub struct Host {
    pub settings: Box<dyn SettingsStore>,
    pub dialogs: Box<dyn Dialogs>,
    pub launcher: Box<dyn Launcher>,
    pub notifier: Box<dyn Notifier>,
    pub lifecycle: Box<dyn AppLifecycle>,
}
