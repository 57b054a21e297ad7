//! Check command - verify a native library against the interface contract

use anyhow::{Context, Result};
use isthmus_config::Config;
use isthmus_runtime::ffi::{ContractReport, LibraryLoader};
use isthmus_runtime::{InterfaceContract, NativeRuntime};

/// Arguments for the check command
pub struct CheckArgs {
    /// Library path or short name from the command line
    pub library: Option<String>,
    /// Namespace from the command line
    pub namespace: Option<String>,
    /// Loaded configuration
    pub config: Config,
}

/// Load the library and run the contract guard against it
pub fn run(args: CheckArgs) -> Result<()> {
    let namespace = args
        .namespace
        .clone()
        .or_else(|| args.config.namespace().map(String::from))
        .context("No namespace: pass --namespace or set [library] namespace in isthmus.toml")?;
    let contract = contract_for(&args.config, &namespace)?;
    let target = library_target(&args)?;

    let mut loader = LibraryLoader::new();
    // add_search_path prepends, so push in reverse to keep config order
    for path in args.config.search_paths().into_iter().rev() {
        loader.add_search_path(path);
    }

    // Safety: the user asked to load this library; it is trusted like any
    // library linked into the bindings.
    let runtime = unsafe { loader.open(&target, &namespace) }
        .with_context(|| format!("Failed to load native library '{}'", target))?;
    println!("library: {}", runtime.path().display());

    let report = verify(&contract, &runtime)?;
    print!("{}", render_report(&report));
    Ok(())
}

/// The expected contract from the [contract] table
fn contract_for(config: &Config, namespace: &str) -> Result<InterfaceContract> {
    let contract = config
        .contract()
        .context("No [contract] table in isthmus.toml; nothing to check")?;
    Ok(InterfaceContract::from_config(namespace, contract))
}

/// Library to open: flag, then configured path, then configured name
fn library_target(args: &CheckArgs) -> Result<String> {
    args.library
        .clone()
        .or_else(|| args.config.library_path().map(|p| p.display().to_string()))
        .or_else(|| args.config.library_name().map(String::from))
        .context("No library: pass --library or set [library] path or name in isthmus.toml")
}

fn verify(contract: &InterfaceContract, native: &dyn NativeRuntime) -> Result<ContractReport> {
    contract
        .verify(native)
        .context("Interface contract check failed")
}

/// One line per verified symbol, then a summary
fn render_report(report: &ContractReport) -> String {
    let mut out = format!("contract version {}: ok\n", report.version);
    for entry in &report.verified {
        out.push_str(&format!("  {} = {}: ok\n", entry.symbol, entry.expected));
    }
    out.push_str(&format!(
        "{}: {} checksum(s) verified\n",
        report.namespace,
        report.verified.len()
    ));
    out
}
