//! The state shared by every step of a rewrite.
//!
//! [`RewriteContext`] owns the target module (the only module that is ever mutated), the
//! [`ModuleSet`] of read-only oracles it is resolved against, and the configuration the steps
//! consult. It is built either from files through [`RewriteContext::load`], which performs the
//! configuration checks and loads the transitive closure of the target's references, or from
//! modules already in memory through [`RewriteContext::new`].

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    metadata::{
        module::Module,
        provider::{DebugSymbolFormat, MetadataProvider},
    },
    resolver::{
        packages_directory, AssemblyResolver, LockFileResolver, ModuleId, ModuleSet,
        SearchPathResolver, DEFAULT_TARGET_MONIKER,
    },
    rewrite::diagnostics::Diagnostics,
    Error, Result,
};

/// File every framework directory set must provide
const CORE_LIBRARY: &str = "mscorlib.dll";

/// Everything needed to set up a rewrite from files
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// The module to rewrite
    pub target: PathBuf,
    /// The module containing the replacement API
    pub support: PathBuf,
    /// Directories of the target framework
    pub framework_paths: Vec<PathBuf>,
    /// Optional platform module, loaded as an additional oracle
    pub platform: Option<PathBuf>,
    /// Assembly names whose strong names are kept
    pub strong_name_references: Vec<String>,
    /// Assembly names whose references become windows-runtime references
    pub winmd_references: Vec<String>,
    /// Debug symbols read with the target and written with the output
    pub symbols: DebugSymbolFormat,
    /// Namespace to alternate assembly names, tried in order
    pub alt: BTreeMap<String, Vec<String>>,
    /// Assembly name to type full names that are never resolved
    pub ignore: HashMap<String, HashSet<String>>,
    /// Project lock file selecting reference assemblies
    pub lock_file: Option<PathBuf>,
    /// Package cache the lock file paths are relative to
    pub packages: Option<PathBuf>,
}

/// Shared, mutable state of a rewrite
pub struct RewriteContext {
    /// The module being rewritten
    pub target: Module,
    /// Read-only modules the target is resolved against
    pub modules: ModuleSet,
    /// The module containing the replacement API
    pub support: ModuleId,
    /// The platform module, if one was given
    pub platform: Option<ModuleId>,
    /// Alternate modules per namespace, in the order they are tried
    pub alt_modules: BTreeMap<String, Vec<ModuleId>>,
    /// Directories of the target framework
    pub framework_paths: Vec<PathBuf>,
    /// Assembly names whose strong names are kept
    pub strong_name_references: Vec<String>,
    /// Assembly names whose references become windows-runtime references
    pub winmd_references: Vec<String>,
    /// Assembly name to type full names that are never resolved
    pub ignore: HashMap<String, HashSet<String>>,
    /// Debug symbol format of the target
    pub symbols: DebugSymbolFormat,
    /// Set once any step changed the target
    pub rewrite_target: bool,
    /// References that could not be resolved
    pub diagnostics: Diagnostics,
}

impl RewriteContext {
    /// Creates a context over modules that are already loaded
    #[must_use]
    pub fn new(target: Module, modules: ModuleSet, support: ModuleId) -> Self {
        RewriteContext {
            target,
            modules,
            support,
            platform: None,
            alt_modules: BTreeMap::new(),
            framework_paths: Vec::new(),
            strong_name_references: Vec::new(),
            winmd_references: Vec::new(),
            ignore: HashMap::new(),
            symbols: DebugSymbolFormat::None,
            rewrite_target: false,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Checks the configuration and loads every module a rewrite needs.
    ///
    /// The support, platform and alternate modules are loaded first, alternates from
    /// `<framework>/<assembly>.dll`. The target is read with debug symbols when requested, and
    /// then every assembly it references is loaded transitively through a resolver that
    /// searches the target's own directory followed by the framework directories (or the lock
    /// file references, when one is configured).
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for missing or incomplete framework directories,
    /// [`Error::AssemblyNotFound`] for alternate assemblies that are not in any framework
    /// directory, [`Error::LockFile`] for unusable lock files, and provider failures.
    pub fn load(options: &RewriteOptions, provider: &dyn MetadataProvider) -> Result<Self> {
        check_framework_paths(&options.framework_paths)?;

        let mut search = SearchPathResolver::new();
        if let Some(directory) = options.target.parent().filter(|p| !p.as_os_str().is_empty()) {
            search.add_search_path(directory);
        }
        for path in &options.framework_paths {
            search.add_search_path(path);
        }

        let resolver: Box<dyn AssemblyResolver> = match &options.lock_file {
            Some(lock_file) => {
                let packages = packages_directory(options.packages.as_deref())?;
                Box::new(LockFileResolver::new(
                    lock_file,
                    &packages,
                    DEFAULT_TARGET_MONIKER,
                    search,
                )?)
            }
            None => Box::new(search),
        };

        let mut modules = ModuleSet::new();
        let support = modules.load(provider, &options.support)?;
        let platform = options
            .platform
            .as_deref()
            .map(|path| modules.load(provider, path))
            .transpose()?;

        let mut alt_modules = BTreeMap::new();
        for (namespace, names) in &options.alt {
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                let id = match modules.find(name) {
                    Some(id) => id,
                    None => {
                        let path = framework_file(&options.framework_paths, name)?;
                        modules.load(provider, &path)?
                    }
                };
                ids.push(id);
            }
            alt_modules.insert(namespace.clone(), ids);
        }

        let target = provider.load(&options.target, options.symbols)?;
        let own_name = target.assembly.name.clone();
        let missing = modules.load_closure(
            &target.assembly_refs,
            &[own_name.as_str()],
            resolver.as_ref(),
            provider,
        )?;
        for name in &missing {
            debug!("Referenced assembly {name} is not available");
        }
        info!(
            "Loaded {} with {} oracle modules ({} references unavailable)",
            target.name,
            modules.len(),
            missing.len()
        );

        Ok(RewriteContext {
            target,
            modules,
            support,
            platform,
            alt_modules,
            framework_paths: options.framework_paths.clone(),
            strong_name_references: options.strong_name_references.clone(),
            winmd_references: options.winmd_references.clone(),
            ignore: options.ignore.clone(),
            symbols: options.symbols,
            rewrite_target: false,
            diagnostics: Diagnostics::new(),
        })
    }

    /// The support module
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] if the id does not belong to the module set.
    pub fn support_module(&self) -> Result<&Module> {
        self.modules
            .get(self.support)
            .ok_or_else(|| Error::AssemblyNotFound("support module".to_string()))
    }

    /// Returns true if the module `id` was loaded from one of the framework directories
    #[must_use]
    pub fn is_framework_module(&self, id: ModuleId) -> bool {
        let Some(directory) = self
            .modules
            .get(id)
            .and_then(|module| module.location.as_deref())
            .and_then(Path::parent)
        else {
            return false;
        };

        let directory = normalize(directory);
        self.framework_paths
            .iter()
            .any(|path| normalize(path) == directory)
    }

    /// Returns true if references to `type_name` in `assembly` must be left alone
    #[must_use]
    pub fn is_ignored(&self, assembly: &str, type_name: &str) -> bool {
        self.ignore
            .get(assembly)
            .is_some_and(|types| types.contains(type_name))
    }

    /// Returns true if the strong name of references to `assembly` is kept
    #[must_use]
    pub fn keeps_strong_name(&self, assembly: &str) -> bool {
        self.strong_name_references.iter().any(|name| name == assembly)
    }

    /// Writes the target to `output` if any step changed it; returns whether it was written
    ///
    /// # Errors
    /// Returns provider failures.
    pub fn save_if_dirty(&self, provider: &dyn MetadataProvider, output: &Path) -> Result<bool> {
        if !self.rewrite_target {
            info!("{} needs no changes", self.target.name);
            return Ok(false);
        }

        provider.save(&self.target, output, self.symbols)?;
        info!("Wrote {} to {}", self.target.name, output.display());
        Ok(true)
    }
}

fn check_framework_paths(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::Configuration("Empty framework path".to_string()));
    }
    for path in paths {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Framework path \"{}\" doesn't exist",
                path.display()
            )));
        }
    }
    if !paths.iter().any(|path| path.join(CORE_LIBRARY).is_file()) {
        return Err(Error::Configuration(format!(
            "No {CORE_LIBRARY} in the framework path"
        )));
    }
    Ok(())
}

fn framework_file(paths: &[PathBuf], assembly: &str) -> Result<PathBuf> {
    paths
        .iter()
        .map(|path| path.join(format!("{assembly}.dll")))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            Error::AssemblyNotFound(format!("{assembly}.dll is not in any framework directory"))
        })
}

fn normalize(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    absolute
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .to_uppercase()
}
