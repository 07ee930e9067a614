use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use ask_bridge_error::BridgeError;

/// Prefix of the scratch files used for atomic writes; hidden from listings.
const TEMP_PREFIX: &str = ".ask-bridge-write-";

/// Strips one layer of bracketing quotes (`'`, `"` or a backtick) and any
/// leftover spaces or quote characters at either end.
pub fn strip_quotes(raw: &str) -> &str {
    let mut value = raw.trim();
    for quote in ['\'', '"', '`'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            value = value[1..value.len() - 1].trim();
            break;
        }
    }
    value.trim_matches(|c: char| matches!(c, ' ' | '\'' | '"' | '`'))
}

/// A path that has been checked to live inside the sandbox root.
///
/// Only [`SandboxStore::resolve`] hands these out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPath {
    absolute: PathBuf,
    name: String,
}

impl SandboxPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// The name as the caller wrote it, quotes removed.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRef<Path> for SandboxPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

/// Directory-scoped file store used by every file-facing tool.
#[derive(Debug, Clone)]
pub struct SandboxStore {
    root: PathBuf,
}

impl SandboxStore {
    /// Opens (creating if needed) the sandbox directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            BridgeError::io(format!("failed to create sandbox root {}", root.display()), err)
        })?;
        let root = fs::canonicalize(&root).map_err(|err| {
            BridgeError::io(format!("failed to resolve sandbox root {}", root.display()), err)
        })?;
        if !root.is_dir() {
            return Err(BridgeError::InvalidRequest {
                message: "sandbox root is not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, raw_name: &str) -> Result<SandboxPath, BridgeError> {
        let name = strip_quotes(raw_name);
        let resolved = canonicalize_lenient(&self.root.join(name));

        // Path::starts_with compares whole components, so `files-evil` never
        // matches a `files` root.
        if !resolved.starts_with(&self.root) {
            tracing::warn!(
                requested = %name,
                resolved = %resolved.display(),
                "rejected path outside sandbox"
            );
            return Err(BridgeError::PathEscape {
                path: name.to_string(),
            });
        }

        Ok(SandboxPath {
            absolute: resolved,
            name: name.to_string(),
        })
    }

    pub fn list(&self) -> Result<Vec<String>, BridgeError> {
        let read_dir = fs::read_dir(&self.root)
            .map_err(|err| BridgeError::io("failed to read sandbox directory", err))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry =
                entry.map_err(|err| BridgeError::io("failed to read directory entry", err))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            entries.push(name);
        }

        entries.sort();
        Ok(entries)
    }

    pub fn read(&self, path: &SandboxPath) -> Result<String, BridgeError> {
        let bytes = match fs::read(path.as_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BridgeError::NotFound {
                    name: path.name().to_string(),
                })
            }
            Err(err) => {
                return Err(BridgeError::io(
                    format!("failed to read {}", path.name()),
                    err,
                ))
            }
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replaces the file contents in one step: the data goes to a scratch file
    /// next to the target which is then renamed over it.
    pub fn write(&self, path: &SandboxPath, content: &str) -> Result<(), BridgeError> {
        let parent = path.as_path().parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .map_err(|err| BridgeError::io(format!("failed to write {}", path.name()), err))?;

        let mut scratch = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)
            .map_err(|err| BridgeError::io(format!("failed to write {}", path.name()), err))?;
        scratch
            .write_all(content.as_bytes())
            .map_err(|err| BridgeError::io(format!("failed to write {}", path.name()), err))?;
        scratch
            .persist(path.as_path())
            .map_err(|err| BridgeError::io(format!("failed to write {}", path.name()), err.error))?;

        tracing::debug!(path = %path.as_path().display(), bytes = content.len(), "file written");
        Ok(())
    }
}

/// Canonicalizes `path` one component at a time, following symlinks for
/// every component that exists. Missing components are appended lexically.
///
/// `..` only ever pops a component that is either canonical or missing, so
/// a later component that exists is always re-resolved on disk.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => resolved.push(prefix.as_os_str()),
            Component::RootDir => resolved.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if let Ok(canonical) = fs::canonicalize(&resolved) {
                    resolved = canonical;
                }
            }
        }
    }

    resolved
}
