use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub webdriver: WebDriverSettings,
    pub directory: DirectorySettings,
    pub output: OutputSettings,
}

#[derive(Deserialize, Clone)]
pub struct WebDriverSettings {
    pub url: String,
    pub headless: bool,
}

#[derive(Deserialize, Clone)]
pub struct DirectorySettings {
    pub url: String,
    pub allowed_countries: Vec<String>,
    pub dropdown_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub results_settle_secs: u64,
}

impl DirectorySettings {
    pub fn dropdown_timeout(&self) -> Duration {
        Duration::from_secs(self.dropdown_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn results_settle_delay(&self) -> Duration {
        Duration::from_secs(self.results_settle_secs)
    }
}

#[derive(Deserialize, Clone)]
pub struct OutputSettings {
    pub json_path: PathBuf,
    pub workbook_path: PathBuf,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");

    let settings = config::Config::builder()
        .add_source(config::File::from(base_path.join("configuration.yaml")))
        .add_source(
            config::Environment::with_prefix("CAMPUS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
