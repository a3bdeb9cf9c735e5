//! Auth token persistence between runs.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// File holding the bearer token of the last session.
///
/// A store without a path keeps nothing: every run starts logged out.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    path: Option<PathBuf>,
}

impl TokenStore {
    /// Store backed by `path`, or a no-op store for `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored token. A missing or blank file is no token.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> io::Result<Option<String>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        match fs::read_to_string(path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write `token`, or remove the file for `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be written.
    pub fn save(&self, token: Option<&str>) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match token {
            Some(token) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, token)
            },
            None => match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }
}
