/// Configuration for the HTTP download engine
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Name used when neither the server nor the URL suggests one.
    pub fallback_filename: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("download-panel/", env!("CARGO_PKG_VERSION")).to_string(),
            fallback_filename: "download".to_string(),
        }
    }
}
