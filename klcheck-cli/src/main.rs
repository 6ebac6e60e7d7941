//! klcheck CLI - check KiCad symbol libraries against the KLC from the command line.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use klcheck::analyzer::{LogEntry, RuleRegistry};
use klcheck::report::{append_metrics, ErrorLog, JunitReport, METRICS_FILE};
use klcheck::{discover_symbol_files, CheckOptions, CheckSummary, KlcCore, Severity};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "klcheck")]
#[command(about = "Check KiCad symbol libraries against the KiCad Library Conventions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check .kicad_sym files or .kicad_symdir libraries
    Check(CheckArgs),

    /// List available KLC rules
    Rules {
        /// Show rule URLs
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Library files, directories or glob patterns
    #[arg(value_name = "FILE")]
    files: Vec<String>,

    /// Only run these rules (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    rules: Vec<String>,

    /// Skip these rules (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Check only the symbol with this name (case-insensitive)
    #[arg(short, long)]
    component: Option<String>,

    /// Check only symbols matching this regex (case-insensitive)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Fix violations where possible and save the library
    #[arg(long)]
    fix: bool,

    /// Print nothing, only set the exit code
    #[arg(short, long)]
    silent: bool,

    /// Print rule details (-v) or debug logging (-vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long)]
    nocolor: bool,

    /// Hide warnings, only report errors
    #[arg(short = 'w', long)]
    nowarnings: bool,

    /// Ignore KLC exceptions stored in symbols
    #[arg(short = 'x', long)]
    disable_exceptions: bool,

    /// Merge violations into this JSON log
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Write a JUnit XML report
    #[arg(long, value_name = "FILE")]
    junit: Option<PathBuf>,

    /// Append metrics to metrics.txt
    #[arg(short, long)]
    metrics: bool,

    /// Treat symbols as unit tests named <Pass|Warn|Fail>__<rule>__<description>
    #[arg(short, long)]
    unittest: bool,

    /// Worker threads (0 = number of CPUs)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Give up waiting for workers after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// List the selected rules and exit
    #[arg(long)]
    list_rules: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Check(args) => {
            init_tracing(args.verbose, args.nocolor);
            match handle_check(&args) {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("{}: {:#}", "error".red().bold(), e);
                    1
                }
            }
        }
        Commands::Rules { verbose } => {
            init_tracing(0, false);
            handle_rules(verbose);
            0
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: u8, nocolor: bool) {
    let level = if verbose >= 2 {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(!nocolor)
        .init();
}

fn options_from(args: &CheckArgs) -> CheckOptions {
    CheckOptions {
        rules: args.rules.clone(),
        exclude: args.exclude.clone(),
        component: args.component.clone(),
        pattern: args.pattern.clone(),
        fix: args.fix,
        no_warnings: args.nowarnings,
        disable_exceptions: args.disable_exceptions,
        unittest: args.unittest,
        jobs: args.jobs,
        timeout: args.timeout.map(Duration::from_secs),
    }
}

fn handle_check(args: &CheckArgs) -> anyhow::Result<i32> {
    if args.nocolor {
        colored::control::set_override(false);
    }
    let core = Arc::new(KlcCore::new(options_from(args))?);

    if args.list_rules {
        let registry = RuleRegistry::with_default_rules();
        for id in core.rule_ids() {
            if let Some(rule) = registry.create(id) {
                println!("{:<6} {}", id.bold(), rule.description());
            }
        }
        return Ok(0);
    }

    let files = discover_symbol_files(&args.files)?;
    if files.is_empty() {
        eprintln!("{}: no library files matched", "error".red().bold());
        return Ok(1);
    }

    let summary = Arc::clone(&core).check_files(&files);

    match args.format {
        OutputFormat::Human if !args.silent => output_human(&summary, args.verbose),
        OutputFormat::Human => {}
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if let Some(path) = &args.log {
        ErrorLog::merge_into(path, &summary)?;
    }
    if let Some(path) = &args.junit {
        JunitReport::from_summary(&summary).write(path)?;
    }
    if args.metrics || args.unittest {
        append_metrics(Path::new(METRICS_FILE), &summary)?;
    }

    Ok(summary.exit_code())
}

fn output_entry(entry: &LogEntry, verbose: u8) {
    let marker = match entry.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow(),
        Severity::Info => "info".cyan(),
        Severity::Success => "success".green(),
    };
    println!("    {}: {}", marker, entry.message);
    if verbose > 0 {
        for extra in &entry.extras {
            println!("      {}", extra);
        }
    }
}

fn output_human(summary: &CheckSummary, verbose: u8) {
    for library in &summary.libraries {
        if let Some(failure) = &library.failure {
            println!("{}: {}", "error".red().bold(), failure);
        }

        for symbol in &library.symbols {
            if let Some(outcome) = &symbol.unittest {
                let verdict = if outcome.passed {
                    "passed".green()
                } else {
                    "failed".red().bold()
                };
                println!("Test '{}' {}", symbol.name, verdict);
                if outcome.passed && verbose == 0 {
                    continue;
                }
            } else if symbol.rules.is_empty() {
                continue;
            } else {
                println!("Checking symbol '{}':", symbol.full_name().bold());
            }

            for rule in &symbol.rules {
                let headline = rule.headline(&symbol.library, &symbol.name);
                if rule.exception.is_some() {
                    println!("  {}", headline.cyan());
                } else if rule.errors > 0 {
                    println!("  {}", headline.red());
                } else {
                    println!("  {}", headline.yellow());
                }
                if verbose > 0 {
                    println!("    {}", rule.description.italic());
                }
                for entry in &rule.entries {
                    output_entry(entry, verbose);
                }
            }
            if symbol.fixed {
                println!("  {}", "Fixes applied".green());
            }
        }

        if library.written {
            println!("{} {}", "Saved".green().bold(), library.path.display());
        }
    }

    let errors = format!("{} errors", summary.errors);
    let warnings = format!("{} warnings", summary.warnings);
    println!(
        "\n{} libraries checked: {}, {}",
        summary.libraries.len(),
        if summary.errors > 0 { errors.red().bold() } else { errors.green() },
        if summary.warnings > 0 { warnings.yellow() } else { warnings.green() },
    );
}

fn handle_rules(verbose: bool) {
    println!("Available KLC rules:\n");

    let registry = RuleRegistry::with_default_rules();
    for id in registry.ids() {
        let Some(rule) = registry.create(id) else {
            continue;
        };
        println!("  {:<6} {}", id.bold(), rule.description());
        if verbose {
            println!("         {}", rule.url().dimmed());
        }
    }
}
