//! The set of read-only modules the target is resolved against.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::Path,
};

use log::{debug, warn};

use crate::{
    metadata::{
        identity::AssemblyIdentity,
        module::Module,
        provider::{DebugSymbolFormat, MetadataProvider},
    },
    resolver::AssemblyResolver,
    Error, Result,
};

/// Index of a module inside a [`ModuleSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

impl ModuleId {
    /// Position of the module in registration order
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Owns every oracle module (framework, support, platform, alternates) and indexes them by
/// simple assembly name. Modules are never mutated once registered.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: Vec<Module>,
    by_name: HashMap<String, ModuleId>,
}

impl ModuleSet {
    /// Creates an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a module of the same assembly name is already
    /// registered.
    pub fn register(&mut self, module: Module) -> Result<ModuleId> {
        let name = module.assembly.name.clone();
        if self.by_name.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "Assembly \"{name}\" is already registered"
            )));
        }

        let id = ModuleId(self.modules.len());
        self.modules.push(module);
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Loads the module at `path` through `provider` and registers it
    ///
    /// # Errors
    /// Returns load failures of the provider and duplicate registrations.
    pub fn load(&mut self, provider: &dyn MetadataProvider, path: &Path) -> Result<ModuleId> {
        let module = provider.load(path, DebugSymbolFormat::None)?;
        self.register(module)
    }

    /// The module `id`
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    /// The module registered for the assembly `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Number of registered modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Registered modules with their ids, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(index, module)| (ModuleId(index), module))
    }

    /// Loads, transitively, every assembly referenced by `roots` or by an already registered
    /// module that is not registered yet.
    ///
    /// References the resolver cannot find, or whose file holds a different assembly, are
    /// skipped; the target reports them later as unresolved references. Names in `exclude`
    /// (typically the target's own name) are never loaded. Returns the names that could not be
    /// loaded.
    ///
    /// # Errors
    /// Returns provider failures for files the resolver did find.
    pub fn load_closure(
        &mut self,
        roots: &[AssemblyIdentity],
        exclude: &[&str],
        resolver: &dyn AssemblyResolver,
        provider: &dyn MetadataProvider,
    ) -> Result<Vec<String>> {
        let mut queue: VecDeque<AssemblyIdentity> = roots.iter().cloned().collect();
        for module in &self.modules {
            queue.extend(module.assembly_refs.iter().cloned());
        }

        let mut processed: HashSet<String> = HashSet::new();
        let mut missing = Vec::new();

        while let Some(reference) = queue.pop_front() {
            if self.by_name.contains_key(&reference.name)
                || exclude.contains(&reference.name.as_str())
                || !processed.insert(reference.name.clone())
            {
                continue;
            }

            let Some(path) = resolver.resolve(&reference) else {
                debug!("Cannot locate assembly {}", reference.full_name());
                missing.push(reference.name);
                continue;
            };

            let module = provider.load(&path, DebugSymbolFormat::None)?;
            if module.assembly.name != reference.name {
                warn!(
                    "{} holds assembly {}, expected {}",
                    path.display(),
                    module.assembly.name,
                    reference.name
                );
                missing.push(reference.name);
                continue;
            }

            queue.extend(module.assembly_refs.iter().cloned());
            self.register(module)?;
        }

        Ok(missing)
    }
}
