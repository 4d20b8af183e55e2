use crate::cli::AppEnv;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SETTINGS_FILE_NAME: &str = "broker-settings.toml";

/// Periodic sweeper tick; runs every minute by default (see §4.9).
const SWEEPER_SCHEDULE: &str = "0 * * * * *";

/// Top-level settings, per §6 "Configuration options".
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub pilot_mode_enabled: bool,
    pub pilot_allowlist_numbers: Vec<String>,

    pub panic_mode_enabled: bool,

    pub feature_sheets_enabled: bool,
    pub feature_calendar_enabled: bool,
    pub feature_reminders_enabled: bool,
    pub feature_notifications_enabled: bool,

    pub outbox_enabled: bool,
    pub whatsapp_dry_run: bool,

    pub deposit_rule_version: String,

    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,

    pub action_token_expiry_days: i64,

    pub sweeper_schedule: String,

    // Special parameter, where the settings file is located.
    pub path: Option<PathBuf>,
}

impl Settings {
    fn default(_app_env: AppEnv) -> Self {
        Self {
            pilot_mode_enabled: false,
            pilot_allowlist_numbers: Vec::new(),
            panic_mode_enabled: false,
            feature_sheets_enabled: true,
            feature_calendar_enabled: true,
            feature_reminders_enabled: true,
            feature_notifications_enabled: true,
            outbox_enabled: true,
            whatsapp_dry_run: false,
            deposit_rule_version: crate::domain::estimation::DEPOSIT_RULE_VERSION.to_string(),
            rate_limit_enabled: true,
            rate_limit_requests: 60,
            rate_limit_window_seconds: 60,
            action_token_expiry_days: 7,
            sweeper_schedule: SWEEPER_SCHEDULE.to_string(),
            path: None,
        }
    }
}

async fn read_settings(data_dir: &Path) -> Result<Settings> {
    let settings_path = data_dir.join(SETTINGS_FILE_NAME);
    let data = fs::read_to_string(settings_path).await?;
    toml::from_str(&data).context("Unable to parse settings file")
}

impl Settings {
    pub async fn new(data_dir: &Path, app_env: AppEnv) -> Self {
        match read_settings(data_dir).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Unable to read {SETTINGS_FILE_NAME} file, using defaults: {e}");
                let new = Settings {
                    path: Some(data_dir.join(SETTINGS_FILE_NAME)),
                    ..Settings::default(app_env)
                };
                if let Err(e) = new.write_to_file().await {
                    tracing::error!("Unable to write default settings to file: {e}");
                } else {
                    tracing::info!("Default settings written to file");
                }
                new
            }
        }
    }

    pub async fn write_to_file(&self) -> Result<()> {
        let data = toml::to_string_pretty(&self).context("Unable to serialize settings to TOML")?;

        let settings_path = self.path.as_ref().context("Settings path not set")?.clone();
        let mut file = fs::File::create(settings_path).await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub fn is_pilot_allowed(&self, wa_from: &str) -> bool {
        if !self.pilot_mode_enabled {
            return true;
        }
        self.pilot_allowlist_numbers.iter().any(|n| n == wa_from)
    }
}
