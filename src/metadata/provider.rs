//! Loading and saving modules.
//!
//! The rewriter itself only works on [`Module`] graphs. Getting them in and out of storage is
//! the job of a [`MetadataProvider`]; the crate ships [`JsonModuleProvider`], which stores a
//! module as a JSON image and carries debug symbol files along when they are requested.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use strum::{Display, EnumString};

use crate::{metadata::module::Module, Result};

/// Debug symbol format to read with a module and write next to the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DebugSymbolFormat {
    /// No debug symbols
    #[default]
    #[strum(serialize = "none")]
    None,
    /// Mono symbol files (`Game.dll.mdb`)
    #[strum(serialize = "mdb")]
    Mdb,
    /// Portable or Windows PDB files (`Game.pdb`)
    #[strum(serialize = "pdb")]
    Pdb,
}

impl DebugSymbolFormat {
    /// Parses a format name; unknown names select [`DebugSymbolFormat::None`]
    #[must_use]
    pub fn parse_lossy(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Path of the symbol file that belongs to the module at `module_path`
    #[must_use]
    pub fn symbol_path(self, module_path: &Path) -> Option<PathBuf> {
        match self {
            DebugSymbolFormat::None => None,
            DebugSymbolFormat::Mdb => {
                let mut path = module_path.as_os_str().to_owned();
                path.push(".mdb");
                Some(PathBuf::from(path))
            }
            DebugSymbolFormat::Pdb => Some(module_path.with_extension("pdb")),
        }
    }
}

/// Reads and writes modules
pub trait MetadataProvider {
    /// Loads the module stored at `path`; the returned module remembers `path` as its location
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a module.
    fn load(&self, path: &Path, symbols: DebugSymbolFormat) -> Result<Module>;

    /// Writes `module` to `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    fn save(&self, module: &Module, path: &Path, symbols: DebugSymbolFormat) -> Result<()>;
}

/// Stores modules as pretty-printed JSON images
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModuleProvider;

impl MetadataProvider for JsonModuleProvider {
    fn load(&self, path: &Path, symbols: DebugSymbolFormat) -> Result<Module> {
        let text = fs::read_to_string(path)?;
        let mut module: Module = serde_json::from_str(&text)?;
        module.location = Some(path.to_path_buf());

        if let Some(symbol_path) = symbols.symbol_path(path) {
            if !symbol_path.exists() {
                warn!(
                    "{} symbols requested but {} does not exist",
                    symbols,
                    symbol_path.display()
                );
            }
        }

        debug!("Loaded {} from {}", module.name, path.display());
        Ok(module)
    }

    fn save(&self, module: &Module, path: &Path, symbols: DebugSymbolFormat) -> Result<()> {
        let text = serde_json::to_string_pretty(module)?;
        fs::write(path, text)?;

        let source = module
            .location
            .as_deref()
            .and_then(|location| symbols.symbol_path(location));
        let destination = symbols.symbol_path(path);
        if let (Some(source), Some(destination)) = (source, destination) {
            if source.exists() && source != destination {
                fs::copy(&source, &destination)?;
            }
        }

        debug!("Saved {} to {}", module.name, path.display());
        Ok(())
    }
}
