//! Locale Selection
//!
//! The widget supports a configured list of locales; the first one is
//! active. Selecting a locale moves it to the front and persists it as a
//! single string key, so the choice survives a reload.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::transport::config::split_list;

/// Locale errors
#[derive(Debug, Error)]
pub enum LocaleError {
    /// The locale is not in the configured list
    #[error("Unsupported locale: {0}")]
    Unsupported(String),

    /// The persisted value could not be read or written
    #[error("Failed to access locale file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Persistence for the selected locale
pub trait LocaleStore: Send + Sync {
    /// Previously saved locale, if any
    fn load(&self) -> Result<Option<String>, LocaleError>;

    /// Save the selected locale
    fn save(&self, locale: &str) -> Result<(), LocaleError>;
}

/// Locale persisted in a small text file
#[derive(Debug, Clone)]
pub struct FileLocaleStore {
    path: PathBuf,
}

impl FileLocaleStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location (`$XDG_DATA_HOME/chat-widget/selected-locale`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("chat-widget").join("selected-locale"))
    }

    /// File path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LocaleError {
        LocaleError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LocaleStore for FileLocaleStore {
    fn load(&self) -> Result<Option<String>, LocaleError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let locale = contents.trim();
                Ok((!locale.is_empty()).then(|| locale.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, locale: &str) -> Result<(), LocaleError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        std::fs::write(&self.path, locale).map_err(|e| self.io_error(e))
    }
}

/// In-memory store, for tests and widgets without persistence
#[derive(Debug, Default)]
pub struct MemoryLocaleStore {
    value: Mutex<Option<String>>,
}

impl LocaleStore for MemoryLocaleStore {
    fn load(&self) -> Result<Option<String>, LocaleError> {
        Ok(self.value.lock().clone())
    }

    fn save(&self, locale: &str) -> Result<(), LocaleError> {
        *self.value.lock() = Some(locale.to_string());
        Ok(())
    }
}

/// Ordered list of supported locales, active one first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleSelection {
    locales: Vec<String>,
}

impl LocaleSelection {
    /// Selection over the given locales, in configured order
    #[must_use]
    pub fn new(locales: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(locales.len());
        for locale in locales {
            if !unique.contains(&locale) {
                unique.push(locale);
            }
        }
        Self { locales: unique }
    }

    /// Selection from a comma-separated list (`en_US,fr_FR`)
    #[must_use]
    pub fn from_csv(csv: &str) -> Self {
        Self::new(split_list(csv))
    }

    /// Apply the persisted locale, if it is still supported
    ///
    /// A store error is logged and the configured order kept.
    pub fn restore(&mut self, store: &dyn LocaleStore) {
        match store.load() {
            Ok(Some(saved)) if self.is_selectable(&saved) => self.move_to_front(&saved),
            Ok(Some(saved)) => {
                tracing::debug!(locale = %saved, "Persisted locale no longer supported");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to load persisted locale"),
        }
    }

    /// Make `locale` active and persist it
    pub fn select(&mut self, locale: &str, store: &dyn LocaleStore) -> Result<(), LocaleError> {
        if !self.is_selectable(locale) {
            return Err(LocaleError::Unsupported(locale.to_string()));
        }
        self.move_to_front(locale);
        store.save(locale)?;
        tracing::info!(locale, "Locale selected");
        Ok(())
    }

    /// Active locale
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.locales.first().map(String::as_str)
    }

    /// Whether `locale` is in the list
    #[must_use]
    pub fn is_selectable(&self, locale: &str) -> bool {
        self.locales.iter().any(|l| l == locale)
    }

    /// All locales, active first
    #[must_use]
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// Comma-separated list, active first
    #[must_use]
    pub fn ids_csv(&self) -> String {
        self.locales.join(",")
    }

    fn move_to_front(&mut self, locale: &str) {
        if let Some(pos) = self.locales.iter().position(|l| l == locale) {
            let selected = self.locales.remove(pos);
            self.locales.insert(0, selected);
        }
    }
}
