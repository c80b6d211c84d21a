//! Directory based assembly lookup.

use std::path::{Path, PathBuf};

use crate::{metadata::identity::AssemblyIdentity, resolver::AssemblyResolver};

/// Looks for `<name>.dll` (or `<name>.winmd` for Windows Runtime references) in an ordered list
/// of directories; the first existing file wins.
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver {
    search_paths: Vec<PathBuf>,
}

impl SearchPathResolver {
    /// Creates a resolver without search paths
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a directory; directories already registered (ignoring case) are skipped
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let exists = self.search_paths.iter().any(|existing| {
            existing
                .to_string_lossy()
                .eq_ignore_ascii_case(&path.to_string_lossy())
        });
        if !exists {
            self.search_paths.push(path);
        }
    }

    /// Registered directories, in search order
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// File names tried for `reference`, most specific first
    pub(crate) fn candidate_file_names(reference: &AssemblyIdentity) -> Vec<String> {
        if reference.windows_runtime {
            vec![
                format!("{}.winmd", reference.name),
                format!("{}.dll", reference.name),
            ]
        } else {
            vec![
                format!("{}.dll", reference.name),
                format!("{}.winmd", reference.name),
                format!("{}.exe", reference.name),
            ]
        }
    }

    fn find_in(directory: &Path, reference: &AssemblyIdentity) -> Option<PathBuf> {
        Self::candidate_file_names(reference)
            .into_iter()
            .map(|file_name| directory.join(file_name))
            .find(|candidate| candidate.is_file())
    }
}

impl AssemblyResolver for SearchPathResolver {
    fn resolve(&self, reference: &AssemblyIdentity) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find_map(|directory| Self::find_in(directory, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::identity::AssemblyVersion;
    use std::fs;

    #[test]
    fn test_first_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("Lib.dll"), "{}").unwrap();
        fs::write(second.path().join("Lib.dll"), "{}").unwrap();

        let mut resolver = SearchPathResolver::new();
        resolver.add_search_path(first.path());
        resolver.add_search_path(second.path());
        resolver.add_search_path(first.path());
        assert_eq!(resolver.search_paths().len(), 2);

        let reference = AssemblyIdentity::new("Lib", AssemblyVersion::default());
        assert_eq!(resolver.resolve(&reference), Some(first.path().join("Lib.dll")));

        let missing = AssemblyIdentity::new("Missing", AssemblyVersion::default());
        assert_eq!(resolver.resolve(&missing), None);
    }

    #[test]
    fn test_windows_runtime_prefers_winmd() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Windows.dll"), "{}").unwrap();
        fs::write(dir.path().join("Windows.winmd"), "{}").unwrap();

        let mut resolver = SearchPathResolver::new();
        resolver.add_search_path(dir.path());

        let mut reference = AssemblyIdentity::new("Windows", AssemblyVersion::default());
        assert_eq!(resolver.resolve(&reference), Some(dir.path().join("Windows.dll")));

        reference.windows_runtime = true;
        assert_eq!(resolver.resolve(&reference), Some(dir.path().join("Windows.winmd")));
    }
}
