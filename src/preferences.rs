use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::format::TimeDisplayMode;

pub const THEME_KEY: &str = "theme";
pub const TIME_FORMAT_KEY: &str = "timeFormat";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("settings file {path} is not a JSON object of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// String-valued key/value storage for user preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten synchronously on every `set`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(&values).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, format!("{text}\n")).map_err(io_err)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    Dark,
    Light,
}

impl ThemeMode {
    pub fn as_store_value(self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
        }
    }

    pub fn from_store_value(value: &str) -> Option<Self> {
        match value {
            "dark" => Some(ThemeMode::Dark),
            "light" => Some(ThemeMode::Light),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }
}

/// Host colour-scheme hint from `COLORFGBG` (`"fg;bg"`).
///
/// Background indices 0-6 and 8 are dark palettes. Without a hint the
/// terminal is assumed to be dark.
pub fn system_prefers_dark(colorfgbg: Option<&str>) -> bool {
    let Some(background) = colorfgbg.and_then(|value| value.rsplit(';').next()) else {
        return true;
    };
    match background.trim().parse::<u8>() {
        Ok(index) => index <= 6 || index == 8,
        Err(_) => true,
    }
}

/// Theme and clock-format preferences backed by an injectable store.
///
/// When the store fails, the preferences drop it and keep working from
/// memory for the rest of the session.
pub struct Preferences {
    store: Option<Box<dyn PreferenceStore>>,
    theme: ThemeMode,
    clock_format: TimeDisplayMode,
}

impl Preferences {
    pub fn load(store: Box<dyn PreferenceStore>, system_prefers_dark: bool) -> Self {
        let default_theme = if system_prefers_dark {
            ThemeMode::Dark
        } else {
            ThemeMode::Light
        };
        let mut preferences = Self {
            store: Some(store),
            theme: default_theme,
            clock_format: TimeDisplayMode::Hour24,
        };

        if let Some(theme) = preferences
            .read(THEME_KEY)
            .as_deref()
            .and_then(ThemeMode::from_store_value)
        {
            preferences.theme = theme;
        }
        if let Some(format) = preferences
            .read(TIME_FORMAT_KEY)
            .as_deref()
            .and_then(TimeDisplayMode::from_store_value)
        {
            preferences.clock_format = format;
        }
        log::debug!(
            "preferences loaded: theme={:?} clock_format={:?}",
            preferences.theme,
            preferences.clock_format
        );
        preferences
    }

    pub fn in_memory(system_prefers_dark: bool) -> Self {
        Self::load(Box::new(MemoryStore::new()), system_prefers_dark)
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme
    }

    pub fn clock_format(&self) -> TimeDisplayMode {
        self.clock_format
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn set_theme(&mut self, theme: ThemeMode) -> ThemeMode {
        self.write(THEME_KEY, theme.as_store_value());
        self.theme = theme;
        theme
    }

    pub fn toggle_theme(&mut self) -> ThemeMode {
        self.set_theme(self.theme.toggled())
    }

    pub fn set_clock_format(&mut self, format: TimeDisplayMode) -> TimeDisplayMode {
        self.write(TIME_FORMAT_KEY, format.as_store_value());
        self.clock_format = format;
        format
    }

    pub fn toggle_clock_format(&mut self) -> TimeDisplayMode {
        self.set_clock_format(self.clock_format.toggled())
    }

    fn read(&mut self, key: &str) -> Option<String> {
        let result = self.store.as_ref()?.get(key);
        match result {
            Ok(value) => value,
            Err(err) => {
                self.degrade(&err);
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(err) = store.set(key, value) {
            self.degrade(&err);
        }
    }

    fn degrade(&mut self, err: &StoreError) {
        log::warn!("preferences will not be saved this session: {err}");
        self.store = None;
    }
}
