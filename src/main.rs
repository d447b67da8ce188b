mod api;
mod app;
mod application;
mod config;
mod domain;
mod platform;
mod ui;
mod utils;

use iced::window;
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    iced::application(app::DownloadApp::default, app::update, app::view)
        .title(app::title)
        .subscription(app::subscription)
        .window(window::Settings {
            exit_on_close_request: false,
            ..Default::default()
        })
        .run()
}
