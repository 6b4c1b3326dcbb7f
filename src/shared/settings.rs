use serde::{Deserialize, Serialize};
use tokio::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use directories::ProjectDirs;
use keyring::Entry;
use tracing::{debug, warn};

use crate::shared::error::{AppError, AppResult};
use crate::shared::types::TranslationDirection;

const KEYRING_SERVICE: &str = "scriptdesk";
const GEMINI_KEY_ACCOUNT: &str = "gemini_api_key";
const MASK: &str = "********";

/// Environment variables checked (in order) before the keyring
const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];
/// Overrides `translation.base_url` when set and non-blank
pub const BASE_URL_ENV: &str = "SCRIPTDESK_BASE_URL";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f32 = 0.4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const DEFAULT_SOURCE_TO_TARGET_PROFILE: &str = "You are an expert Hindi to English translator for scripts and dialogue. \
Translate the user's Hindi text into natural, fluent English. Preserve tone, emotion, line breaks and speaker labels. \
Output only the translation, with no notes or explanations.";

const DEFAULT_TARGET_TO_SOURCE_PROFILE: &str = "You are an expert English to Hindi translator for scripts and dialogue. \
Translate the user's English text into natural, conversational Hindi written in Devanagari script. \
Preserve tone, emotion, line breaks and speaker labels. Output only the translation, with no notes or explanations.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub translation: TranslationSettings,
    pub profiles: InstructionProfiles,
    pub api_keys: ApiKeys,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// 0 disables the deadline
    pub timeout_secs: u64,
    pub source_language: String,
    pub target_language: String,
}

/// The two fixed system instructions. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionProfiles {
    pub source_to_target: String,
    pub target_to_source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini_api_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            translation: TranslationSettings::default(),
            profiles: InstructionProfiles::default(),
            api_keys: ApiKeys::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            source_language: "Hindi".to_string(),
            target_language: "English".to_string(),
        }
    }
}

impl TranslationSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Base URL with the environment override applied and no trailing slash
    pub fn effective_base_url(&self) -> String {
        if let Ok(env_url) = std::env::var(BASE_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                debug!("Using base URL from {}: {}", BASE_URL_ENV, trimmed);
                return trimmed.trim_end_matches('/').to_string();
            }
        }
        self.base_url.trim().trim_end_matches('/').to_string()
    }

    pub fn language_pair(&self, direction: TranslationDirection) -> (&str, &str) {
        match direction {
            TranslationDirection::SourceToTarget => (&self.source_language, &self.target_language),
            TranslationDirection::TargetToSource => (&self.target_language, &self.source_language),
        }
    }
}

impl Default for InstructionProfiles {
    fn default() -> Self {
        Self {
            source_to_target: DEFAULT_SOURCE_TO_TARGET_PROFILE.to_string(),
            target_to_source: DEFAULT_TARGET_TO_SOURCE_PROFILE.to_string(),
        }
    }
}

impl InstructionProfiles {
    pub fn for_direction(&self, direction: TranslationDirection) -> &str {
        match direction {
            TranslationDirection::SourceToTarget => &self.source_to_target,
            TranslationDirection::TargetToSource => &self.target_to_source,
        }
    }
}

fn project_dirs() -> AppResult<ProjectDirs> {
    ProjectDirs::from("com", "scriptdesk", "scriptdesk")
        .ok_or_else(|| AppError::Config("Failed to determine project directories".to_string()))
}

impl AppSettings {
    pub fn get_settings_path() -> AppResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("settings.json"))
    }

    /// Directory holding the state database and exports
    pub fn data_dir(&self) -> AppResult<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Load settings from the default location and pull secrets from the keyring
    pub async fn load() -> AppResult<Self> {
        let path = Self::get_settings_path()?;
        let mut settings = Self::load_from(&path).await?;
        settings.load_secrets_from_keyring();
        Ok(settings)
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub async fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await
            .map_err(|e| AppError::Config(format!("Failed to read settings file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Save secrets to the keyring and the rest to the default location
    pub async fn save(&self) -> AppResult<()> {
        self.save_secrets_to_keyring()?;
        let path = Self::get_settings_path()?;
        self.save_to(&path).await
    }

    /// Write settings to `path` with secrets stripped
    pub async fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await
                .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let mut disk_copy = self.clone();
        disk_copy.clear_secrets();

        let content = serde_json::to_string_pretty(&disk_copy)
            .map_err(|e| AppError::Config(format!("Failed to serialize settings: {}", e)))?;

        fs::write(path, content).await
            .map_err(|e| AppError::Config(format!("Failed to write settings file: {}", e)))
    }

    /// Copy with secrets masked, for display and logging
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_keys.gemini_api_key.is_empty() {
            copy.api_keys.gemini_api_key = MASK.to_string();
        }
        copy
    }

    /// API key from the environment first, then whatever was loaded from the keyring
    pub fn resolve_api_key(&self) -> Option<String> {
        for var in API_KEY_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
        let stored = self.api_keys.gemini_api_key.trim();
        if stored.is_empty() || stored == MASK {
            None
        } else {
            Some(stored.to_string())
        }
    }

    fn clear_secrets(&mut self) {
        self.api_keys.gemini_api_key = String::new();
    }

    fn load_secrets_from_keyring(&mut self) {
        match Entry::new(KEYRING_SERVICE, GEMINI_KEY_ACCOUNT) {
            Ok(entry) => match entry.get_password() {
                Ok(pw) => self.api_keys.gemini_api_key = pw,
                Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!("[Settings] Keyring error for {}: {}", GEMINI_KEY_ACCOUNT, e),
            },
            Err(e) => warn!("[Settings] Failed to access keyring for {}: {}", GEMINI_KEY_ACCOUNT, e),
        }
    }

    fn save_secrets_to_keyring(&self) -> AppResult<()> {
        let value = &self.api_keys.gemini_api_key;
        if value.is_empty() || value == MASK {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, GEMINI_KEY_ACCOUNT)
            .map_err(|e| AppError::Config(format!("Keyring init error: {}", e)))?;
        entry.set_password(value)
            .map_err(|e| AppError::Config(format!("Failed to save {} to keyring: {}", GEMINI_KEY_ACCOUNT, e)))
    }
}
