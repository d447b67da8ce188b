use std::path::{Path, PathBuf};

use url::Url;

/// Format used when a whole page is saved instead of a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePageFormat {
    MimeHtml,
    SingleHtml,
    CompleteHtml,
}

impl SavePageFormat {
    pub const ALL: [SavePageFormat; 3] = [
        SavePageFormat::MimeHtml,
        SavePageFormat::SingleHtml,
        SavePageFormat::CompleteHtml,
    ];

    pub fn filter_name(self) -> &'static str {
        match self {
            SavePageFormat::MimeHtml => "MIME HTML Archive",
            SavePageFormat::SingleHtml => "HTML Page, single",
            SavePageFormat::CompleteHtml => "HTML Page, complete",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SavePageFormat::MimeHtml => "mhtml",
            SavePageFormat::SingleHtml | SavePageFormat::CompleteHtml => "html",
        }
    }
}

/// A download the engine wants to start, before anything has been accepted.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    pub suggested_filename: String,
    /// `Some` when the whole page should be saved.
    pub page_format: Option<SavePageFormat>,
}

impl DownloadRequest {
    pub fn new(url: Url, suggested_filename: impl Into<String>) -> Self {
        Self {
            url,
            suggested_filename: suggested_filename.into(),
            page_format: None,
        }
    }

    pub fn save_page(mut self, format: SavePageFormat) -> Self {
        self.page_format = Some(format);
        self
    }

    pub fn is_page_save(&self) -> bool {
        self.page_format.is_some()
    }
}

/// The option the user picked last time, used to pre-select the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadOption {
    #[default]
    NoOption,
    OpenFile,
    SaveFile,
    ExternalManager,
}

/// Answer of the interactive option prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Open,
    Save,
    SavePage,
    ExternalManager,
    Cancel,
}

/// What happens to a pending download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Open {
        path: PathBuf,
    },
    Save {
        path: PathBuf,
    },
    SavePage {
        path: PathBuf,
        format: Option<SavePageFormat>,
    },
    ExternalManager,
    Cancel,
}

impl Disposition {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Disposition::Open { path }
            | Disposition::Save { path }
            | Disposition::SavePage { path, .. } => Some(path),
            Disposition::ExternalManager | Disposition::Cancel => None,
        }
    }

    /// Local dispositions with an empty destination turn into `Cancel`.
    pub fn validated(self) -> Self {
        match self.path() {
            Some(path) if path.as_os_str().is_empty() => Disposition::Cancel,
            _ => self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
