use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::{env, fs};

/// Widget settings the core consumes.
///
/// The core only reads the volume routing target; everything else in the
/// settings file belongs to the UI layer and is ignored here. Callers re-read
/// on each use, so external edits take effect on the next call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetSettings {
    pub volume_target_process: Option<String>,
}

impl WidgetSettings {
    pub fn load() -> anyhow::Result<Self> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("settings.toml"));
            candidates.push(current_dir.join("config").join("settings.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("settings.toml"));
                candidates.push(dir.join("config").join("settings.toml"));
            }
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let doc: SettingsDocument = toml::from_str(&data)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(doc.into())
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    volume: VolumeSection,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeSection {
    target_process: Option<String>,
}

impl From<SettingsDocument> for WidgetSettings {
    fn from(value: SettingsDocument) -> Self {
        let target = value
            .volume
            .target_process
            .filter(|name| !name.trim().is_empty());
        WidgetSettings {
            volume_target_process: target,
        }
    }
}
