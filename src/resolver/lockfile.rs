//! Assembly lookup driven by a NuGet project lock file.
//!
//! A `project.lock.json` lists, per target framework moniker, every package the project
//! restored and the compile-time reference assemblies each package contributes:
//!
//! ```json
//! {
//!   "targets": {
//!     "UAP,Version=v10.0": {
//!       "System.Runtime/4.0.20": {
//!         "compile": { "ref/netcore50/System.Runtime.dll": {} }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! [`resolve_lock_file`] turns such a file into absolute reference paths below the package
//! cache, and [`LockFileResolver`] answers assembly lookups from them before falling back to
//! plain search directories.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde_json::Value;

use crate::{
    metadata::identity::AssemblyIdentity,
    resolver::{search::SearchPathResolver, AssemblyResolver},
    Error, Result,
};

/// Target framework moniker read from lock files unless another one is requested
pub const DEFAULT_TARGET_MONIKER: &str = "UAP,Version=v10.0";

/// Placeholder file name packages use to contribute nothing to a target
const EMPTY_PLACEHOLDER: &str = "_._";

/// The package cache directory: `explicit` if given, else `NUGET_PACKAGES`, else
/// `~/.nuget/packages`.
///
/// # Errors
/// Returns [`Error::LockFile`] if no candidate is available.
pub fn packages_directory(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os("NUGET_PACKAGES").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|value| !value.is_empty())
        .map(|home| PathBuf::from(home).join(".nuget").join("packages"))
        .ok_or_else(|| Error::LockFile("Cannot determine the NuGet packages directory".to_string()))
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

/// Lists the reference assemblies `lock_file` selects for `moniker`.
///
/// # Errors
/// Returns [`Error::LockFile`] if the moniker is missing, a package key is not `id/version`,
/// a package directory or referenced file does not exist, or a package declares
/// `frameworkAssemblies`. I/O and JSON failures are passed through.
pub fn resolve_lock_file(lock_file: &Path, packages: &Path, moniker: &str) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(lock_file)?;
    let root: Value = serde_json::from_str(&text)?;

    let target = root
        .get("targets")
        .and_then(|targets| targets.get(moniker))
        .and_then(Value::as_object)
        .ok_or_else(|| Error::LockFile(format!("Target \"{moniker}\" not found in lock file")))?;

    let mut references = Vec::new();
    for (key, package) in target {
        let Some(compile) = package.get("compile").and_then(Value::as_object) else {
            continue;
        };

        let (id, version) = key
            .split_once('/')
            .ok_or_else(|| Error::LockFile(format!("Invalid package key \"{key}\"")))?;
        let package_path = packages.join(id).join(version);
        if !package_path.is_dir() {
            return Err(Error::LockFile(format!(
                "Package directory not found: \"{}\"",
                package_path.display()
            )));
        }

        for name in compile.keys() {
            let is_placeholder = name
                .rsplit(['/', '\\'])
                .next()
                .is_some_and(|file| file.eq_ignore_ascii_case(EMPTY_PLACEHOLDER));
            if is_placeholder {
                continue;
            }

            let reference = join_relative(&package_path, name);
            if !reference.is_file() {
                return Err(Error::LockFile(format!(
                    "Reference not found: \"{}\"",
                    reference.display()
                )));
            }
            references.push(reference);
        }

        if package.get("frameworkAssemblies").is_some() {
            return Err(Error::LockFile(format!(
                "Package \"{key}\" uses \"frameworkAssemblies\", which is not supported"
            )));
        }
    }

    Ok(references)
}

/// Resolves assemblies from the references of a lock file, then from search directories
#[derive(Debug, Clone)]
pub struct LockFileResolver {
    references: HashMap<String, PathBuf>,
    fallback: SearchPathResolver,
}

impl LockFileResolver {
    /// Builds a resolver from the references `lock_file` selects for `moniker`.
    ///
    /// # Errors
    /// See [`resolve_lock_file`]. Two references with the same file name are also an
    /// [`Error::LockFile`].
    pub fn new(
        lock_file: &Path,
        packages: &Path,
        moniker: &str,
        fallback: SearchPathResolver,
    ) -> Result<Self> {
        let mut references: HashMap<String, PathBuf> = HashMap::new();
        for reference in resolve_lock_file(lock_file, packages, moniker)? {
            let Some(file_name) = reference.file_name() else {
                continue;
            };
            let key = file_name.to_string_lossy().to_lowercase();
            if let Some(existing) = references.get(&key) {
                return Err(Error::LockFile(format!(
                    "Reference \"{}\" already added as \"{}\"",
                    reference.display(),
                    existing.display()
                )));
            }
            references.insert(key, reference);
        }

        debug!(
            "Lock file {} contributes {} references",
            lock_file.display(),
            references.len()
        );
        Ok(LockFileResolver {
            references,
            fallback,
        })
    }

    /// Every reference path taken from the lock file
    pub fn references(&self) -> impl Iterator<Item = &PathBuf> {
        self.references.values()
    }
}

impl AssemblyResolver for LockFileResolver {
    fn resolve(&self, reference: &AssemblyIdentity) -> Option<PathBuf> {
        SearchPathResolver::candidate_file_names(reference)
            .into_iter()
            .find_map(|file_name| self.references.get(&file_name.to_lowercase()).cloned())
            .or_else(|| self.fallback.resolve(reference))
    }
}
