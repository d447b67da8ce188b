//! Decides what happens to a download before any bytes are accepted.

use std::path::{Path, PathBuf};

use url::Url;

use super::collaborators::{Host, SaveFilter, SavePrompt};
use crate::config::{ManagerSettings, URL_PLACEHOLDER};
use crate::domain::{
    Disposition, DownloadError, DownloadOption, DownloadRequest, PromptChoice, SavePageFormat,
};
use crate::utils::{ensure_unique_filename, split_arguments};

/// Mutable manager state the resolver reads and updates.
pub struct Resolver<'a> {
    pub settings: &'a mut ManagerSettings,
    pub last_option: &'a mut DownloadOption,
    pub temp_dir: &'a Path,
    pub host: &'a Host,
}

impl Resolver<'_> {
    pub fn resolve(&mut self, request: &DownloadRequest) -> Disposition {
        match self.choose(request) {
            Ok(disposition) => disposition.validated(),
            Err(e) => {
                tracing::debug!("Download of {} not accepted: {}", request.url, e);
                Disposition::Cancel
            }
        }
    }

    fn choose(&mut self, request: &DownloadRequest) -> Result<Disposition, DownloadError> {
        let file_name = request.suggested_filename.as_str();

        if self.settings.use_external_manager {
            self.start_external_manager(&request.url);
            return Ok(Disposition::ExternalManager);
        }

        if let Some(directory) = &self.settings.default_download_path {
            let path = ensure_unique_filename(&directory.join(file_name));
            return Ok(Disposition::Save { path });
        }

        let choice = if request.is_page_save() {
            PromptChoice::SavePage
        } else {
            self.host.dialogs.prompt_option(
                file_name,
                &request.url,
                *self.last_option,
                self.settings.use_external_manager,
            )
        };

        match choice {
            PromptChoice::Open => {
                let path = ensure_unique_filename(&self.temp_dir.join(file_name));
                *self.last_option = DownloadOption::OpenFile;
                Ok(Disposition::Open { path })
            }
            PromptChoice::Save => {
                let prompt = self.save_prompt("Save file as...", file_name, Vec::new());
                let (path, _) = self.ask_for_path(&prompt)?;
                Ok(Disposition::Save { path })
            }
            PromptChoice::SavePage => self.save_page(file_name),
            PromptChoice::ExternalManager => {
                self.start_external_manager(&request.url);
                Ok(Disposition::ExternalManager)
            }
            PromptChoice::Cancel => Err(DownloadError::UserCancelled),
        }
    }

    fn save_page(&mut self, file_name: &str) -> Result<Disposition, DownloadError> {
        let filters = SavePageFormat::ALL
            .iter()
            .map(|format| SaveFilter {
                name: format.filter_name().to_string(),
                extensions: vec![format.extension().to_string()],
            })
            .collect();
        let prompt = self.save_prompt("Save page as...", file_name, filters);

        let (path, filter) = self.ask_for_path(&prompt)?;
        let format = filter.and_then(|index| SavePageFormat::ALL.get(index).copied());
        Ok(Disposition::SavePage { path, format })
    }

    fn save_prompt(&self, title: &str, file_name: &str, filters: Vec<SaveFilter>) -> SavePrompt {
        SavePrompt {
            title: title.to_string(),
            directory: self.settings.last_download_path.clone(),
            file_name: file_name.to_string(),
            filters,
            use_native_dialog: self.settings.use_native_dialog,
        }
    }

    /// Runs the save dialog and remembers the directory of the chosen path.
    fn ask_for_path(
        &mut self,
        prompt: &SavePrompt,
    ) -> Result<(PathBuf, Option<usize>), DownloadError> {
        let (path, filter) = self
            .host
            .dialogs
            .choose_save_path(prompt)
            .ok_or(DownloadError::UserCancelled)?;
        if path.as_os_str().is_empty() {
            return Err(DownloadError::InvalidDestination);
        }

        if let Some(directory) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            self.settings.last_download_path = directory.to_path_buf();
            if let Err(e) = self.host.settings.store_last_download_path(directory) {
                tracing::warn!("Failed to persist last download directory: {}", e);
            }
        }
        *self.last_option = DownloadOption::SaveFile;
        Ok((path, filter))
    }

    fn start_external_manager(&mut self, url: &Url) {
        let arguments = external_arguments(&self.settings.external_arguments, url);
        tracing::info!(
            "Handing {} off to {}",
            url,
            self.settings.external_executable
        );
        self.host
            .launcher
            .launch(&self.settings.external_executable, &arguments);
        *self.last_option = DownloadOption::ExternalManager;
    }
}

/// Substitutes the encoded URL for the placeholder and splits the command line.
pub fn external_arguments(template: &str, url: &Url) -> Vec<String> {
    split_arguments(&template.replace(URL_PLACEHOLDER, url.as_str()))
}
