//! INI file configuration adapter.
//!
//! Section and key names are lowercased by `configparser`, so lookups are
//! case-insensitive.

use crate::domain::error::LivermoreError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::fs;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LivermoreError> {
        let path = path.as_ref();
        let parse_error = |reason: String| LivermoreError::ConfigParse {
            file: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
        Self::parse(content).map_err(parse_error)
    }

    pub fn from_string(content: &str) -> Result<Self, LivermoreError> {
        Self::parse(content.to_string()).map_err(|reason| LivermoreError::ConfigParse {
            file: "<inline>".to_string(),
            reason,
        })
    }

    fn parse(content: String) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content)?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn has_section(&self, section: &str) -> bool {
        let wanted = section.to_lowercase();
        self.config.sections().iter().any(|s| *s == wanted)
    }
}
