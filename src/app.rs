use std::sync::mpsc::{self, Receiver};
use std::time::Instant;

use futures::StreamExt;
use iced::{event, time, window, Event, Subscription, Task};
use rfd::{AsyncMessageDialog, MessageButtons, MessageLevel};

use crate::api::{ApiClient, ClientConfig};
use crate::application::{
    transfer_stream, CloseDecision, DownloadManager, EngineEvents, Host, Notification, PanelState,
    Resolution, TransferEvent, TICK_INTERVAL,
};
use crate::config::JsonSettingsStore;
use crate::domain::{DownloadError, DownloadRequest, SessionId};
use crate::platform::{ChannelNotifier, NativeDialogs, PanelLifecycle, SystemLauncher};
use crate::ui::{DownloadMessage, DownloadView};

pub struct DownloadApp {
    view: DownloadView,
    api_client: ApiClient,
    manager: DownloadManager,
    lifecycle: PanelLifecycle,
    notifications: Receiver<Notification>,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadApp {
    pub fn new() -> Self {
        let (sender, notifications) = mpsc::channel();
        let lifecycle = PanelLifecycle::default();
        let settings = JsonSettingsStore::default_location();
        tracing::info!("Reading settings from {}", settings.path().display());

        let host = Host {
            settings: Box::new(settings),
            dialogs: Box::new(NativeDialogs),
            launcher: Box::new(SystemLauncher),
            notifier: Box::new(ChannelNotifier::new(sender)),
            lifecycle: Box::new(lifecycle.clone()),
        };
        let manager = DownloadManager::new(host, std::env::temp_dir().join("download-panel"));

        Self {
            view: DownloadView::default(),
            api_client: ApiClient::new(ClientConfig::default()),
            manager,
            lifecycle,
            notifications,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    /// Request built from the entered URL
    RequestPrepared(Result<DownloadRequest, String>),
    Transfer(SessionId, TransferEvent),
    Tick,
    CloseRequested,
    FocusChanged(bool),
    NotificationClosed,
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    let task = match message {
        Message::UiMessage(ui_msg) => handle_ui(app, ui_msg),
        Message::RequestPrepared(Ok(request)) => match app.manager.on_request(request) {
            Resolution::Accepted(download) => {
                let id = download.id;
                app.view.url.clear();
                app.view.status_message = format!("Downloading to: {}", download.path.display());
                if let Some(format) = download.page_format {
                    tracing::debug!("Saving page {} as {}", id, format.filter_name());
                }

                Task::stream(
                    transfer_stream(app.api_client.clone(), download)
                        .map(move |event| Message::Transfer(id, event)),
                )
            }
            Resolution::Rejected => {
                app.view.status_message = "Download not started".to_string();
                Task::none()
            }
        },
        Message::RequestPrepared(Err(e)) => {
            app.view.status_message = format!("Failed to start download: {}", e);
            Task::none()
        }
        Message::Transfer(id, event) => {
            handle_transfer(app, id, event);
            Task::none()
        }
        Message::Tick => {
            app.manager.tick(Instant::now());
            Task::none()
        }
        Message::CloseRequested => {
            if app.manager.request_close() == CloseDecision::Ignored {
                tracing::debug!("Close request ignored, downloads still running");
            }
            Task::none()
        }
        Message::FocusChanged(focused) => {
            app.lifecycle.set_focused(focused);
            Task::none()
        }
        Message::NotificationClosed => Task::none(),
    };

    // Drained before exiting so a close-on-finish still shows the batch notification.
    let notifications: Vec<Task<Message>> =
        app.notifications.try_iter().map(show_notification).collect();
    let closing =
        app.manager.panel_state() == PanelState::Closing || app.lifecycle.quit_requested();
    let next = if closing { iced::exit() } else { task };

    if notifications.is_empty() {
        next
    } else {
        Task::batch(notifications).chain(next)
    }
}

fn handle_ui(app: &mut DownloadApp, message: DownloadMessage) -> Task<Message> {
    app.view.update(&message);

    match message {
        DownloadMessage::DownloadPressed | DownloadMessage::SavePagePressed => {
            let url = app.view.url.trim().to_string();
            if url.is_empty() {
                return Task::none();
            }
            let save_page = matches!(message, DownloadMessage::SavePagePressed);
            let client = app.api_client.clone();
            app.view.status_message = format!("Fetching info for: {}", url);

            Task::perform(
                async move {
                    client
                        .prepare_request(&url, save_page)
                        .await
                        .map_err(|e| e.to_string())
                },
                Message::RequestPrepared,
            )
        }
        DownloadMessage::CancelPressed(id) => {
            app.manager.cancel(id);
            Task::none()
        }
        DownloadMessage::RemovePressed(id) => {
            app.manager.remove(id);
            Task::none()
        }
        DownloadMessage::ClearPressed => {
            app.manager.clear_list();
            Task::none()
        }
        DownloadMessage::UrlChanged(_) => Task::none(),
    }
}

fn handle_transfer(app: &mut DownloadApp, id: SessionId, event: TransferEvent) {
    match event {
        TransferEvent::Progress { received, total } => {
            app.manager.on_progress(id, received, total);
        }
        TransferEvent::Finished(Ok(path)) => {
            app.view.status_message = format!("Saved: {}", path.display());
            app.manager.on_finished(id, true);
        }
        TransferEvent::Finished(Err(DownloadError::Aborted)) => {
            app.manager.on_finished(id, false);
        }
        TransferEvent::Finished(Err(e)) => {
            tracing::warn!("Download {} failed: {}", id, e);
            app.view.status_message = format!("Download failed: {}", e);
            app.manager.on_finished(id, false);
        }
    }
}

fn show_notification(notification: Notification) -> Task<Message> {
    tracing::debug!(icon = notification.icon, "{}", notification.title);
    Task::perform(
        async move {
            AsyncMessageDialog::new()
                .set_level(MessageLevel::Info)
                .set_title(notification.title)
                .set_description(notification.body)
                .set_buttons(MessageButtons::Ok)
                .show()
                .await;
        },
        |_| Message::NotificationClosed,
    )
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view
        .view(app.manager.sessions(), app.manager.summary())
        .map(Message::UiMessage)
}

pub fn title(app: &DownloadApp) -> String {
    app.manager.title()
}

/// Ticks only while something is downloading, so an idle panel does not wake up.
pub fn subscription(app: &DownloadApp) -> Subscription<Message> {
    let tick = if app.manager.has_active_downloads() {
        time::every(TICK_INTERVAL).map(|_| Message::Tick)
    } else {
        Subscription::none()
    };

    Subscription::batch([
        tick,
        window::close_requests().map(|_| Message::CloseRequested),
        event::listen_with(|event, _status, _id| match event {
            Event::Window(window::Event::Focused) => Some(Message::FocusChanged(true)),
            Event::Window(window::Event::Unfocused) => Some(Message::FocusChanged(false)),
            _ => None,
        }),
    ])
}
