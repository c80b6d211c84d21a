use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::PathBuf,
};

use clap::Parser;
use refrewrite::{metadata::provider::DebugSymbolFormat, rewrite::RewriteOptions};

/// rrw reference rewriter
#[derive(Debug, Parser)]
#[command(name = "rrw", about, long_about = None)]
pub struct Cli {
    /// The target module to rewrite.
    #[arg(long, value_name = "FILE", required = true)]
    pub target: PathBuf,

    /// Where to write the rewritten target module. Default is write over.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// The support module containing the replacement API.
    #[arg(long, value_name = "FILE", required = true)]
    pub support: PathBuf,

    /// A comma separated list of the directories of the target framework.
    #[arg(long, value_name = "DIRS", required = true)]
    pub framework: String,

    /// Path to platform assembly.
    #[arg(long, value_name = "FILE")]
    pub platform: Option<PathBuf>,

    /// The support namespace for System.
    #[arg(long, value_name = "NAMESPACE", required = true)]
    pub system: String,

    /// A comma separated list of assembly names that retain their strong names.
    #[arg(long, value_name = "NAMES", default_value = "")]
    pub snrefs: String,

    /// A comma separated list of assembly names that should be redirected to winmd references.
    #[arg(long, value_name = "NAMES", default_value = "")]
    pub winmdrefs: String,

    /// File format of the debug symbols. Either none, mdb or pdb.
    #[arg(long, value_name = "FORMAT", value_parser = parse_symbol_format, default_value = "none")]
    pub dbg: DebugSymbolFormat,

    /// A semicolon separated list of alternative namespace and assembly mappings.
    #[arg(long, value_name = "NS[,ASSEMBLY];...", value_parser = parse_alt)]
    pub alt: Vec<AltMappings>,

    /// A semicolon separated list of assembly qualified type names that should not be resolved.
    #[arg(long, value_name = "TYPE,ASSEMBLY;...", value_parser = parse_ignore)]
    pub ignore: Vec<IgnoreList>,

    /// Project lock file selecting the reference assemblies.
    #[arg(long, value_name = "FILE")]
    pub lock: Option<PathBuf>,

    /// Package cache root for the lock file. Default is NUGET_PACKAGES or ~/.nuget/packages.
    #[arg(long, value_name = "DIR")]
    pub packages: Option<PathBuf>,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Namespace to alternate assembly names of one `--alt` value
#[derive(Debug, Clone, Default)]
pub struct AltMappings(pub Vec<(String, String)>);

/// Type name and assembly name pairs of one `--ignore` value
#[derive(Debug, Clone, Default)]
pub struct IgnoreList(pub Vec<(String, String)>);

fn parse_symbol_format(value: &str) -> Result<DebugSymbolFormat, String> {
    Ok(DebugSymbolFormat::parse_lossy(value))
}

/// `namespace[,assembly]` pairs; the assembly defaults to the namespace
fn parse_alt(value: &str) -> Result<AltMappings, String> {
    let pairs = value
        .split(';')
        .map(|pair| match pair.split_once(',') {
            Some((namespace, assembly)) => (namespace.to_string(), assembly.to_string()),
            None => (pair.to_string(), pair.to_string()),
        })
        .collect();
    Ok(AltMappings(pairs))
}

fn parse_ignore(value: &str) -> Result<IgnoreList, String> {
    let mut pairs = Vec::new();
    for pair in value.split(';') {
        let Some((type_name, assembly)) = pair.split_once(',') else {
            return Err(format!("Type name `{pair}` is not assembly qualified"));
        };
        pairs.push((type_name.to_string(), assembly.to_string()));
    }
    Ok(IgnoreList(pairs))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').filter(|part| !part.is_empty())
}

impl Cli {
    /// Returns true if a required option was given as an empty or blank value
    pub fn has_blank_required(&self) -> bool {
        [
            self.target.to_string_lossy().as_ref(),
            self.support.to_string_lossy().as_ref(),
            self.framework.as_str(),
            self.system.as_str(),
        ]
        .iter()
        .any(|value| value.trim().is_empty())
    }

    /// Where the rewritten module is written
    pub fn output_path(&self) -> &PathBuf {
        self.output.as_ref().unwrap_or(&self.target)
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        let mut alt: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (namespace, assembly) in self.alt.iter().flat_map(|mappings| &mappings.0) {
            alt.entry(namespace.clone()).or_default().push(assembly.clone());
        }

        let mut ignore: HashMap<String, HashSet<String>> = HashMap::new();
        for (type_name, assembly) in self.ignore.iter().flat_map(|list| &list.0) {
            ignore
                .entry(assembly.clone())
                .or_default()
                .insert(type_name.clone());
        }

        RewriteOptions {
            target: self.target.clone(),
            support: self.support.clone(),
            framework_paths: split_list(&self.framework).map(PathBuf::from).collect(),
            platform: self.platform.clone(),
            strong_name_references: split_list(&self.snrefs).map(str::to_string).collect(),
            winmd_references: split_list(&self.winmdrefs).map(str::to_string).collect(),
            symbols: self.dbg,
            alt,
            ignore,
            lock_file: self.lock.clone(),
            packages: self.packages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    const REQUIRED: [&str; 9] = [
        "rrw",
        "--target",
        "Game.dll",
        "--support=WinRTLegacy.dll",
        "--framework",
        "/fw/a,,/fw/b",
        "--system",
        "WinRTLegacy",
        "-v",
    ];

    fn parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(REQUIRED.iter().chain(extra))
    }

    #[test]
    fn test_options_mapping() {
        let cli = parse(&[
            "--snrefs=Kept,Other",
            "--dbg=PDB",
            "--alt=Windows.Foundation;Windows.UI,Windows.UI.Xaml;Windows.UI,Windows",
            "--ignore=System.Foo,mscorlib;System.Bar,mscorlib",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(!cli.has_blank_required());
        assert_eq!(cli.output_path(), &PathBuf::from("Game.dll"));

        let options = cli.rewrite_options();
        assert_eq!(
            options.framework_paths,
            vec![PathBuf::from("/fw/a"), PathBuf::from("/fw/b")]
        );
        assert_eq!(options.strong_name_references, vec!["Kept", "Other"]);
        assert!(options.winmd_references.is_empty());
        assert_eq!(options.symbols, DebugSymbolFormat::Pdb);
        assert_eq!(
            options.alt["Windows.Foundation"],
            vec!["Windows.Foundation".to_string()]
        );
        assert_eq!(
            options.alt["Windows.UI"],
            vec!["Windows.UI.Xaml".to_string(), "Windows".to_string()]
        );
        assert_eq!(options.ignore["mscorlib"].len(), 2);
    }

    #[test]
    fn test_unknown_symbol_format_is_none() {
        let cli = parse(&["--dbg", "dwarf"]).unwrap();
        assert_eq!(cli.dbg, DebugSymbolFormat::None);
    }

    #[test]
    fn test_unqualified_ignore_rejected() {
        let error = parse(&["--ignore=System.Foo"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_missing_required() {
        let error = Cli::try_parse_from(["rrw", "--target", "Game.dll"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_blank_required() {
        let cli = Cli::try_parse_from([
            "rrw",
            "--target=Game.dll",
            "--support=Support.dll",
            "--framework=/fw",
            "--system= ",
        ])
        .unwrap();
        assert!(cli.has_blank_required());
    }
}
