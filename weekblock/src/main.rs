use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use weekblock_core::config::DEFAULT_CONFIG_FILE;
use weekblock_core::{LedgerConfig, LedgerEditor};

mod formatter;

#[derive(Parser)]
#[command(name = "weekblock")]
#[command(about = "Append weekly count blocks to spreadsheet inventory ledgers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Sheet holding the ledger, instead of the configured one
    #[arg(short, long, value_name = "SHEET", global = true)]
    sheet: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Add the next week block
    Add {
        #[command(flatten)]
        target: Target,

        /// Date the fallback is counted from when the last header has no usable date
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,

        /// Show where the block would go without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Rewrite the formulas and checkboxes of every block
    Repair {
        #[command(flatten)]
        target: Target,
    },
    /// Remove the most recent block
    Undo {
        #[command(flatten)]
        target: Target,
    },
    /// Describe the blocks of a ledger
    Inspect {
        /// Path to the ledger workbook (.xlsx)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct Target {
    /// Path to the ledger workbook (.xlsx)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Write the result to this file
    #[arg(short, long, value_name = "OUTPUT", conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the input file
    #[arg(long)]
    in_place: bool,
}

impl Target {
    fn destination(&self) -> Result<PathBuf> {
        match (&self.output, self.in_place) {
            (Some(output), _) => Ok(output.clone()),
            (None, true) => Ok(self.file.clone()),
            (None, false) => bail!("Choose where to write the result with --output or --in-place"),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let exit_code = run(cli)?;
    std::process::exit(exit_code);
}

/// Execute a parsed command, returning the process exit code
fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    let editor = LedgerEditor::with_config(config).context("Invalid configuration")?;
    let sheet = cli.sheet.as_deref();

    match cli.command {
        Command::Add {
            target,
            today,
            dry_run,
        } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let mut ledger = open(&editor, &target.file, sheet)?;

            if dry_run {
                let plan = ledger.plan_next_block(today)?;
                match cli.format {
                    OutputFormat::Human => {
                        formatter::print_plan(&target.file, ledger.settings(), &plan)
                    }
                    OutputFormat::Json => {
                        formatter::print_json("add", &target.file, ledger.settings(), &plan)?
                    }
                }
                return Ok(0);
            }

            let destination = target.destination()?;
            let report = ledger.add_next_block(today)?;
            ledger
                .save(&destination)
                .with_context(|| format!("Failed to write {}", destination.display()))?;
            match cli.format {
                OutputFormat::Human => {
                    formatter::print_expansion(&destination, ledger.settings(), &report)
                }
                OutputFormat::Json => {
                    formatter::print_json("add", &destination, ledger.settings(), &report)?
                }
            }
        }
        Command::Repair { target } => {
            let destination = target.destination()?;
            let mut ledger = open(&editor, &target.file, sheet)?;
            let report = ledger.repair()?;
            ledger
                .save(&destination)
                .with_context(|| format!("Failed to write {}", destination.display()))?;
            match cli.format {
                OutputFormat::Human => formatter::print_repair(&destination, &report),
                OutputFormat::Json => {
                    formatter::print_json("repair", &destination, ledger.settings(), &report)?
                }
            }
        }
        Command::Undo { target } => {
            let destination = target.destination()?;
            let mut ledger = open(&editor, &target.file, sheet)?;
            let removed = ledger.undo_last_block()?;
            ledger
                .save(&destination)
                .with_context(|| format!("Failed to write {}", destination.display()))?;
            match cli.format {
                OutputFormat::Human => {
                    formatter::print_undo(&destination, ledger.settings(), &removed)
                }
                OutputFormat::Json => {
                    formatter::print_json("undo", &destination, ledger.settings(), &removed)?
                }
            }
        }
        Command::Inspect { file } => {
            let ledger = open(&editor, &file, sheet)?;
            let summary = ledger.inspect();
            match cli.format {
                OutputFormat::Human => formatter::print_summary(&file, ledger.settings(), &summary),
                OutputFormat::Json => {
                    formatter::print_json("inspect", &file, ledger.settings(), &summary)?
                }
            }
            // A ledger the next expansion would reject is reported as a failure
            if !summary.is_aligned() {
                return Ok(1);
            }
        }
    }

    Ok(0)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    if let Some(config_path) = path {
        return LedgerConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    // Try to load default config from current directory if it exists
    let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default_config_path.exists() {
        debug!(path = %default_config_path.display(), "using config from working directory");
        LedgerConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(LedgerConfig::default())
    }
}

fn open(editor: &LedgerEditor, file: &Path, sheet: Option<&str>) -> Result<weekblock_core::Ledger> {
    editor
        .open(file, sheet)
        .with_context(|| format!("Failed to open ledger: {}", file.display()))
}
