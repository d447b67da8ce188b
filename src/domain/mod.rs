pub mod error;
pub mod model;
pub mod session;

pub use error::DownloadError;
pub use model::{
    Disposition, DownloadOption, DownloadRequest, PromptChoice, SavePageFormat, SessionId,
};
pub use session::{Session, SessionState};
