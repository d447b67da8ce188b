pub mod aggregator;
pub mod collaborators;
pub mod disposition;
pub mod download_manager;
pub mod transfer;

pub use aggregator::{Summary, TICK_INTERVAL};
pub use collaborators::{AppLifecycle, Dialogs, Host, Launcher, Notification, Notifier, SavePrompt};
pub use download_manager::{CloseDecision, DownloadManager, EngineEvents, PanelState, Resolution};
pub use transfer::{transfer_stream, TransferEvent};
