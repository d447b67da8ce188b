use iced::{
    widget::{button, column, progress_bar, row, scrollable, text, text_input, Column, Space},
    Element, Length,
};

use crate::application::Summary;
use crate::domain::{Session, SessionId, SessionState};
use crate::utils::format_bytes;

/// Main view state
pub struct DownloadView {
    pub url: String,
    pub status_message: String,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            url: String::new(),
            status_message: "Enter a URL to download".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    DownloadPressed,
    SavePagePressed,
    CancelPressed(SessionId),
    RemovePressed(SessionId),
    ClearPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: &DownloadMessage) {
        if let DownloadMessage::UrlChanged(url) = message {
            self.url = url.clone();
        }
    }

    pub fn view<'a>(
        &'a self,
        sessions: &'a [Session],
        summary: Option<&Summary>,
    ) -> Element<'a, DownloadMessage> {
        let rows = sessions.iter().map(session_row);
        let summary_line = summary.map(|s| s.to_string()).unwrap_or_default();

        column![
            text("Download Manager").size(28),
            text_input("https://...", &self.url)
                .on_input(DownloadMessage::UrlChanged)
                .on_submit(DownloadMessage::DownloadPressed)
                .padding(10),
            row![
                button("Download")
                    .on_press(DownloadMessage::DownloadPressed)
                    .padding([8, 16]),
                button("Save Page")
                    .on_press(DownloadMessage::SavePagePressed)
                    .padding([8, 16]),
            ]
            .spacing(10),
            text(&self.status_message).size(14),
            Space::new().height(Length::Fixed(10.0)),
            scrollable(Column::with_children(rows).spacing(12)).height(Length::Fill),
            row![
                text(summary_line).size(14).width(Length::Fill),
                button("Clear")
                    .on_press(DownloadMessage::ClearPressed)
                    .padding([6, 12]),
            ]
            .spacing(10),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

fn session_row(session: &Session) -> Element<'_, DownloadMessage> {
    let id = session.id();
    let status = match session.state() {
        SessionState::Downloading => match session.total() {
            Some(total) => format!(
                "{} of {}",
                format_bytes(session.received()),
                format_bytes(total)
            ),
            None => format!("{} of unknown size", format_bytes(session.received())),
        },
        SessionState::Cancelled => "Cancelled".to_string(),
        SessionState::Finished { success: true } => match session.directory() {
            Some(dir) => format!("Done - {} in {}", format_bytes(session.received()), dir.display()),
            None => format!("Done - {}", format_bytes(session.received())),
        },
        SessionState::Finished { success: false } => "Error - download failed".to_string(),
    };

    let name = match session.page_format() {
        Some(format) => format!("{} ({})", session.file_name(), format.filter_name()),
        None => session.file_name(),
    };

    let action = if session.is_downloading() {
        button("Cancel").on_press(DownloadMessage::CancelPressed(id))
    } else {
        button("Remove").on_press(DownloadMessage::RemovePressed(id))
    };

    row![
        column![
            text(name).size(16),
            progress_bar(0.0..=100.0, session.progress_percent() as f32),
            text(status).size(12),
        ]
        .spacing(4)
        .width(Length::Fill),
        action.padding([6, 12]),
    ]
    .spacing(10)
    .into()
}
