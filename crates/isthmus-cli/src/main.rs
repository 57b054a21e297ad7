use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

/// Isthmus bridge tooling.
///
/// Checks a native library against the interface contract the bindings were
/// generated for, and decodes wire payloads for debugging.
///
/// EXAMPLES:
///     isthmus check                          Verify the configured library
///     isthmus inspect --shape 'seq<u32>' --hex 000000020000000100000002
///     isthmus checksum --name connect --params string --returns u64
///
/// ENVIRONMENT VARIABLES:
///     ISTHMUS_LIBRARY    Path to the native library
///     ISTHMUS_NAMESPACE  Symbol namespace of the native library
///     ISTHMUS_LOG        Log filter (e.g. 'debug', 'isthmus_runtime=trace')
#[derive(Parser)]
#[command(name = "isthmus")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter; overrides the [logging] level from isthmus.toml
    #[arg(long, global = true, env = "ISTHMUS_LOG")]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a native library against the configured interface contract
    ///
    /// Loads the library, compares its contract version and every checksum
    /// listed under [contract] in isthmus.toml, and exits non-zero on the
    /// first mismatch.
    ///
    /// EXAMPLES:
    ///     isthmus check
    ///     isthmus check --library target/release/libtorii.so --namespace torii
    #[command(visible_alias = "c")]
    Check {
        /// Library path or short name (overrides [library] path/name)
        #[arg(long, short = 'l')]
        library: Option<String>,
        /// Symbol namespace (overrides [library] namespace)
        #[arg(long, short = 'n')]
        namespace: Option<String>,
    },

    /// Decode a wire payload and print its value tree
    ///
    /// The payload comes from --hex or from a file of raw bytes. Bytes left
    /// over after the value are reported as an error.
    ///
    /// EXAMPLES:
    ///     isthmus inspect --shape 'option<string>' --hex 01000000026869
    ///     isthmus inspect --shape 'record<string,u64>' payload.bin
    #[command(visible_alias = "i")]
    Inspect {
        /// Payload shape, e.g. 'map<string,seq<u8>>'
        #[arg(long, short = 's')]
        shape: String,
        /// Payload as hex digits
        #[arg(long, conflicts_with = "file")]
        hex: Option<String>,
        /// File holding the raw payload
        #[arg(required_unless_present = "hex")]
        file: Option<PathBuf>,
    },

    /// Print the contract checksum of an operation signature
    ///
    /// EXAMPLES:
    ///     isthmus checksum --name entities --params 'record<option<string>,u32>' --returns 'seq<string>'
    Checksum {
        /// Operation name
        #[arg(long)]
        name: String,
        /// Parameter shapes, in order
        #[arg(long, num_args = 0..)]
        params: Vec<String>,
        /// Return shape
        #[arg(long)]
        returns: Option<String>,
        /// Declared error shape
        #[arg(long)]
        throws: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only `check` needs a project; the other commands run anywhere
    let config = isthmus_config::ConfigLoader::new().load_from_directory(&std::env::current_dir()?);

    let log_filter = match (&cli.log, &config) {
        (Some(filter), _) => filter.clone(),
        (None, Ok(config)) => config.log_level().to_string(),
        (None, Err(_)) => isthmus_config::loader::DEFAULT_LOG_LEVEL.to_string(),
    };
    logging::init(&log_filter);

    match cli.command {
        Commands::Check { library, namespace } => {
            let config = config.context("Failed to load isthmus configuration")?;
            let args = commands::check::CheckArgs {
                library,
                namespace,
                config,
            };
            commands::check::run(args)?;
        }
        Commands::Inspect { shape, hex, file } => {
            let input = match (hex, file) {
                (Some(hex), _) => commands::inspect::Input::Hex(hex),
                (None, Some(file)) => commands::inspect::Input::File(file),
                (None, None) => anyhow::bail!("either --hex or a payload file is required"),
            };
            let output = commands::inspect::run(&shape, input)?;
            println!("{}", output);
        }
        Commands::Checksum {
            name,
            params,
            returns,
            throws,
        } => {
            let args = commands::checksum::ChecksumArgs {
                name,
                params,
                returns,
                throws,
            };
            commands::checksum::run(args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_smoke() {
        let _cli = Cli::parse_from(["isthmus", "check"]);
    }

    #[test]
    fn test_check_overrides() {
        let cli = Cli::parse_from(["isthmus", "check", "--library", "libtorii.so", "-n", "torii"]);
        match cli.command {
            Commands::Check { library, namespace } => {
                assert_eq!(library.as_deref(), Some("libtorii.so"));
                assert_eq!(namespace.as_deref(), Some("torii"));
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_inspect_hex_conflicts_with_file() {
        let result = Cli::try_parse_from(["isthmus", "inspect", "-s", "u8", "--hex", "01", "payload.bin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_inspect_requires_input() {
        let result = Cli::try_parse_from(["isthmus", "inspect", "-s", "u8"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_checksum_params_collect_in_order() {
        let cli = Cli::parse_from([
            "isthmus",
            "checksum",
            "--name",
            "connect",
            "--params",
            "string",
            "seq<u8>",
            "--returns",
            "u64",
        ]);
        match cli.command {
            Commands::Checksum { params, returns, .. } => {
                assert_eq!(params, vec!["string".to_string(), "seq<u8>".to_string()]);
                assert_eq!(returns.as_deref(), Some("u64"));
            }
            _ => panic!("Expected Checksum command"),
        }
    }

    #[test]
    fn test_global_log_flag() {
        let cli = Cli::parse_from(["isthmus", "inspect", "-s", "u8", "--hex", "01", "--log", "debug"]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
    }

    #[test]
    fn test_alias_c_for_check() {
        let cli = Cli::parse_from(["isthmus", "c"]);
        assert!(matches!(cli.command, Commands::Check { .. }));
    }
}
