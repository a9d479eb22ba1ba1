use std::{io::Write, path::PathBuf, process::ExitCode};

use anyhow::Result;
use burrow::{
    config::{Config, FormatterChoice},
    orchestrator::BundleOrchestrator,
};
use clap::Parser;
use log::LevelFilter;

/// Bundle a Go package and its internal dependencies into one file
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
struct Cli {
    /// Import path of the package to start from
    root: String,

    /// Output directory name under the destination root
    target: String,

    /// Name of the output file
    #[arg(long)]
    file_name: Option<String>,

    /// Package clause of the output file
    #[arg(long)]
    package_name: Option<String>,

    /// Import path prefix of first-party code to inline (repeatable)
    #[arg(long = "root-module", value_name = "PREFIX")]
    root_modules: Vec<String>,

    /// Directory the target directory is created in
    #[arg(long)]
    destination_root: Option<PathBuf>,

    /// Substring marking vendored code to inline (repeatable)
    #[arg(long = "vendor-marker", value_name = "STR")]
    vendor_markers: Vec<String>,

    /// Import path prefix that is never inlined (repeatable)
    #[arg(long = "known-external", value_name = "PREFIX")]
    known_external: Vec<String>,

    /// Extra source root searched as `<dir>/<import path>` (repeatable)
    #[arg(long = "src", value_name = "DIR")]
    src: Vec<PathBuf>,

    /// Directory holding the main module's go.mod
    #[arg(long, value_name = "DIR")]
    module_root: Option<PathBuf>,

    /// Formatter for the bundled source
    #[arg(long, value_enum)]
    formatter: Option<FormatterChoice>,

    /// Explicit config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the bundle instead of writing it
    #[arg(long)]
    stdout: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line flags are the last configuration layer
    fn apply_to(&self, config: &mut Config) {
        if let Some(file_name) = &self.file_name {
            config.file_name.clone_from(file_name);
        }
        if let Some(package_name) = &self.package_name {
            config.package_name.clone_from(package_name);
        }
        if let Some(destination_root) = &self.destination_root {
            config.destination_root.clone_from(destination_root);
        }
        if !self.root_modules.is_empty() {
            config.root_modules = self.root_modules.iter().cloned().collect();
        }
        if !self.vendor_markers.is_empty() {
            config.vendor_markers = self.vendor_markers.iter().cloned().collect();
        }
        if !self.known_external.is_empty() {
            config.known_external = self.known_external.iter().cloned().collect();
        }
        if !self.src.is_empty() {
            config.src.clone_from(&self.src);
        }
        if self.module_root.is_some() {
            config.module_root.clone_from(&self.module_root);
        }
        if let Some(formatter) = self.formatter {
            config.formatter = formatter;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    // RUST_LOG, when set, takes precedence over -v
    builder.parse_default_env();
    builder.init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    let orchestrator = BundleOrchestrator::new(config);

    if cli.stdout {
        let bundle = orchestrator.bundle(&cli.root)?;
        std::io::stdout().write_all(bundle.source.as_bytes())?;
        return Ok(());
    }
    let report = orchestrator.run(&cli.root, &cli.target)?;
    println!(
        "Wrote {} ({} packages inlined)",
        report.output_path.display(),
        report.inlined
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "burrow",
            "acme.io/app",
            "billing",
            "--root-module",
            "acme.io",
            "--root-module",
            "corp",
            "--package-name",
            "plugin",
            "--formatter",
            "builtin",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(
            config.root_modules.iter().collect::<Vec<_>>(),
            vec!["acme.io", "corp"]
        );
        assert_eq!(config.package_name, "plugin");
        assert_eq!(config.file_name, "plugin.go");
        assert_eq!(config.formatter, FormatterChoice::Builtin);
    }

    #[test]
    fn test_wrong_argument_count_is_usage_error() {
        let err = Cli::try_parse_from(["burrow", "acme.io/app"]).expect_err("missing target");
        assert_eq!(err.exit_code(), 2);
        let err = Cli::try_parse_from(["burrow", "a", "b", "c"]).expect_err("extra argument");
        assert_eq!(err.exit_code(), 2);
    }
}
