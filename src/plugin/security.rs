//! Pre-load security checks for plugin modules.
//!
//! Nothing from a candidate file is mapped into the process until it passes
//! [`SecurityValidator::verify`]:
//!
//! 1. the file exists and is a regular file
//! 2. its extension is in the allow-list
//! 3. it is no larger than the size ceiling
//! 4. its SHA-256 is listed in the whitelist, when one is configured
//!
//! Without a whitelist file every hash is accepted (development mode). The
//! whitelist itself carries no signature and no permission check; anyone able
//! to write it can approve a module.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{PluginError, PluginResult, MAX_PLUGIN_FILE_SIZE, PLUGIN_EXTENSION};

/// Stateless gate applied to every candidate file.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    /// Accepted file extensions, without the leading dot.
    allowed_extensions: Vec<String>,
    /// Size ceiling in bytes.
    max_file_size: u64,
    /// Optional hash whitelist file.
    whitelist: Option<PathBuf>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityValidator {
    /// Validator accepting the platform module extension up to 50 MiB, no whitelist.
    pub fn new() -> Self {
        Self {
            allowed_extensions: vec![PLUGIN_EXTENSION.to_string()],
            max_file_size: MAX_PLUGIN_FILE_SIZE,
            whitelist: None,
        }
    }

    /// Replace the extension allow-list.
    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Set the size ceiling.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the whitelist file.
    pub fn with_whitelist(mut self, path: impl Into<PathBuf>) -> Self {
        self.whitelist = Some(path.into());
        self
    }

    /// Accepted extensions.
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Size ceiling in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Configured whitelist file, if any.
    pub fn whitelist(&self) -> Option<&Path> {
        self.whitelist.as_deref()
    }

    /// Whether `path` carries an allowed extension.
    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }

    /// Run the file checks (existence, extension, size), reporting the first failure.
    pub fn check(&self, path: &Path) -> PluginResult<()> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(PluginError::validation(path, "not a regular file")),
            Err(_) => return Err(PluginError::validation(path, "file does not exist")),
        };

        if !self.has_allowed_extension(path) {
            return Err(PluginError::validation(
                path,
                format!("extension not allowed (expected one of: {})", self.allowed_extensions.join(", ")),
            ));
        }

        if metadata.len() > self.max_file_size {
            return Err(PluginError::validation(
                path,
                format!("file is {} bytes, limit is {} bytes", metadata.len(), self.max_file_size),
            ));
        }

        Ok(())
    }

    /// Run the file checks, logging the reason on failure.
    pub fn validate(&self, path: &Path) -> bool {
        match self.check(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Plugin validation failed");
                false
            }
        }
    }

    /// Full gate: file checks plus whitelist. Returns the file hash on success.
    pub fn verify(&self, path: &Path) -> PluginResult<String> {
        self.check(path)?;

        let hash = Self::compute_hash(path)
            .ok_or_else(|| PluginError::validation(path, "file could not be read for hashing"))?;

        if !Self::is_whitelisted(&hash, self.whitelist.as_deref()) {
            return Err(PluginError::validation(path, format!("hash {hash} is not whitelisted")));
        }

        Ok(hash)
    }

    /// SHA-256 of the file contents as lower-case hex, or `None` if unreadable.
    pub fn compute_hash(path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];

        loop {
            let read = file.read(&mut buffer).ok()?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Some(format!("{:x}", hasher.finalize()))
    }

    /// Whether `hash` is approved by the whitelist at `whitelist_path`.
    ///
    /// No path, or a path that does not exist, approves everything. Lines are
    /// trimmed and compared case-insensitively; blank lines and `#` comments
    /// are skipped. A whitelist that exists but cannot be read approves nothing.
    pub fn is_whitelisted(hash: &str, whitelist_path: Option<&Path>) -> bool {
        let Some(path) = whitelist_path else {
            tracing::debug!("No plugin whitelist configured, accepting all hashes");
            return true;
        };

        if !path.exists() {
            tracing::debug!(whitelist = %path.display(), "Plugin whitelist missing, accepting all hashes");
            return true;
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(whitelist = %path.display(), error = %e, "Plugin whitelist unreadable");
                return false;
            }
        };

        let wanted = hash.trim();
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .any(|line| line.eq_ignore_ascii_case(wanted))
    }
}
