//! Desktop implementations of the manager's collaborators.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use url::Url;

use crate::application::{AppLifecycle, Dialogs, Launcher, Notification, Notifier, SavePrompt};
use crate::domain::{DownloadOption, PromptChoice};

const OPEN_LABEL: &str = "Open";
const SAVE_LABEL: &str = "Save";
const EXTERNAL_LABEL: &str = "External manager";
const CANCEL_LABEL: &str = "Cancel";

/// Modal dialogs backed by rfd. They block the UI thread until answered.
pub struct NativeDialogs;

impl Dialogs for NativeDialogs {
    fn choose_save_path(&self, prompt: &SavePrompt) -> Option<(PathBuf, Option<usize>)> {
        if !prompt.use_native_dialog {
            tracing::debug!("rfd only provides platform dialogs, ignoring useNativeDialog=false");
        }

        let mut dialog = FileDialog::new()
            .set_title(prompt.title.as_str())
            .set_directory(&prompt.directory)
            .set_file_name(prompt.file_name.as_str());
        for filter in &prompt.filters {
            dialog = dialog.add_filter(filter.name.as_str(), filter.extensions.as_slice());
        }

        let path = dialog.save_file()?;
        let filter = (!prompt.filters.is_empty()).then(|| guess_filter(prompt, &path));
        Some((path, filter.flatten()))
    }

    fn prompt_option(
        &self,
        file_name: &str,
        url: &Url,
        last_option: DownloadOption,
        show_external: bool,
    ) -> PromptChoice {
        let last = match last_option {
            DownloadOption::OpenFile => Some(OPEN_LABEL),
            DownloadOption::SaveFile => Some(SAVE_LABEL),
            DownloadOption::ExternalManager => Some(EXTERNAL_LABEL),
            DownloadOption::NoOption => None,
        };
        let mut description = format!("You are about to download\n{}\nfrom {}", file_name, url);
        if let Some(last) = last {
            description.push_str(&format!("\n\nLast choice: {}", last));
        }

        // rfd offers at most three buttons; closing the dialog cancels.
        let third = if show_external {
            EXTERNAL_LABEL
        } else {
            CANCEL_LABEL
        };
        let result = MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title(format!("Opening {}", file_name))
            .set_description(description)
            .set_buttons(MessageButtons::YesNoCancelCustom(
                OPEN_LABEL.to_string(),
                SAVE_LABEL.to_string(),
                third.to_string(),
            ))
            .show();

        match result {
            MessageDialogResult::Custom(label) if label == OPEN_LABEL => PromptChoice::Open,
            MessageDialogResult::Custom(label) if label == SAVE_LABEL => PromptChoice::Save,
            MessageDialogResult::Custom(label) if label == EXTERNAL_LABEL => {
                PromptChoice::ExternalManager
            }
            MessageDialogResult::Yes | MessageDialogResult::Ok => PromptChoice::Open,
            MessageDialogResult::No => PromptChoice::Save,
            _ => PromptChoice::Cancel,
        }
    }

    fn confirm(&self, title: &str, text: &str) -> bool {
        let result = MessageDialog::new()
            .set_level(MessageLevel::Warning)
            .set_title(title)
            .set_description(text)
            .set_buttons(MessageButtons::YesNo)
            .show();
        matches!(result, MessageDialogResult::Yes)
    }
}

/// rfd does not report the selected filter, so it is recovered from the extension.
/// Plain `.html` needs one more question to tell single-file from complete pages.
fn guess_filter(prompt: &SavePrompt, path: &Path) -> Option<usize> {
    let extension = path.extension()?.to_string_lossy().to_lowercase();
    let matching: Vec<usize> = prompt
        .filters
        .iter()
        .enumerate()
        .filter(|(_, filter)| filter.extensions.iter().any(|ext| *ext == extension))
        .map(|(index, _)| index)
        .collect();

    match matching.as_slice() {
        [] => None,
        [only] => Some(*only),
        [first, rest @ ..] => {
            let labels: Vec<String> = matching
                .iter()
                .map(|&index| prompt.filters[index].name.clone())
                .collect();
            let result = MessageDialog::new()
                .set_title("Save page as...")
                .set_description("Which format should the page be saved in?")
                .set_buttons(MessageButtons::OkCancelCustom(
                    labels[0].clone(),
                    labels[1].clone(),
                ))
                .show();
            match result {
                MessageDialogResult::Custom(label) if label == labels[1] => rest.first().copied(),
                _ => Some(*first),
            }
        }
    }
}

/// Spawns external programs and opens finished files.
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, executable: &str, args: &[String]) {
        match Command::new(executable).args(args).spawn() {
            Ok(child) => tracing::info!("Started {} (pid {})", executable, child.id()),
            Err(e) => tracing::warn!("Failed to start {}: {}", executable, e),
        }
    }

    fn open(&self, path: &Path) {
        if let Err(e) = open::that(path) {
            tracing::warn!("Failed to open {}: {}", path.display(), e);
        }
    }
}

/// Queues notifications for the UI loop, which shows them without blocking.
pub struct ChannelNotifier {
    sender: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<Notification>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Notification dropped, UI is gone");
        }
    }
}

/// Lifecycle of the standalone panel window.
///
/// The panel is the only top-level window, so closing it always ends the
/// application.
#[derive(Clone, Default)]
pub struct PanelLifecycle {
    focused: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
}

impl PanelLifecycle {
    pub fn set_focused(&self, focused: bool) {
        self.focused.store(focused, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

impl AppLifecycle for PanelLifecycle {
    fn has_top_level_windows(&self) -> bool {
        false
    }

    fn is_panel_active(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }

    fn quit(&self) {
        tracing::info!("Quitting download panel");
        self.quit.store(true, Ordering::SeqCst);
    }
}
