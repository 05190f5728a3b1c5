//! The set of VCL files retrieved from the controller in one run.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{BackupError, Result};

/// Placeholder committed into freshly initialised repositories.
pub const GITKEEP: &str = ".gitkeep";

/// One deployed VCL file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VclFile {
    /// Relative path as reported by the controller
    pub name: String,
    pub content: String,
}

impl VclFile {
    /// Hex SHA-256 of the file content
    pub fn digest(&self) -> String {
        sha256_hex(self.content.as_bytes())
    }
}

/// Hex-encoded SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Check that a controller-supplied file name is safe to write under the
/// working copy and return it as a relative path.
///
/// Accepted names are non-empty, relative, made only of normal components and
/// never touch git's own metadata.
pub fn validate_name(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(BackupError::protocol("controller returned an empty file name"));
    }
    if name.contains('\0') || name.contains('\\') {
        return Err(BackupError::protocol(format!(
            "controller returned an unsupported file name {:?}",
            name
        )));
    }

    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(BackupError::protocol(format!(
            "controller returned an unsafe file name {:?}",
            name
        )));
    }

    let path = Path::new(name);
    let mut components = 0;
    for component in path.components() {
        match component {
            Component::Normal(part) if part != ".git" => components += 1,
            _ => {
                return Err(BackupError::protocol(format!(
                    "controller returned an unsafe file name {:?}",
                    name
                )));
            }
        }
    }
    if components == 0 || name == GITKEEP {
        return Err(BackupError::protocol(format!(
            "controller returned a reserved file name {:?}",
            name
        )));
    }
    Ok(path.to_path_buf())
}

/// Complete mapping of file name to content for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, rejecting unsafe and duplicate names.
    pub fn insert(&mut self, file: VclFile) -> Result<()> {
        validate_name(&file.name)?;
        if self.files.contains_key(&file.name) {
            return Err(BackupError::protocol(format!(
                "controller reported {:?} more than once",
                file.name
            )));
        }
        self.files.insert(file.name, file.content);
        Ok(())
    }

    /// Build a snapshot from `(name, content)` pairs
    pub fn from_pairs<I, N, C>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let mut snapshot = Self::new();
        for (name, content) in pairs {
            snapshot.insert(VclFile {
                name: name.into(),
                content: content.into(),
            })?;
        }
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// File names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// `(name, content)` pairs in sorted name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }
}
