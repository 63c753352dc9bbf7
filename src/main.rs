mod compare;
mod config;
mod error;
mod loader;
mod matcher;
mod process;
mod report;
mod runner;
mod script;
mod vars;

use clap::{Parser, Subcommand, ValueEnum};
use report::{ShowLimit, Summary};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable progress and summary
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
}

#[derive(Parser)]
#[command(name = "sessiontest")]
#[command(about = "Run line-oriented test scripts against a command-line program")]
#[command(version)]
struct Cli {
    /// Log each instruction and the subject's output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute test scripts
    Run {
        /// Script files, or directories searched for *.in scripts
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Show details on up to N failing scripts, or "all"
        #[arg(long, value_name = "N")]
        show: Option<ShowLimit>,
        /// Keep the scratch directory of each script
        #[arg(long)]
        keep: bool,
        /// Directory prepended to the subject's PATH
        #[arg(long, value_name = "DIR")]
        progdir: Option<PathBuf>,
        /// Invocation prefix placed before every `>` operand
        #[arg(long, value_name = "CMD")]
        subject: Option<String>,
        /// Default number of seconds allowed to each subject invocation
        #[arg(long, value_name = "SEC")]
        timeout: Option<f64>,
        /// Directory holding reference files
        #[arg(long, value_name = "DIR")]
        refdir: Option<PathBuf>,
        /// Directory in which scratch directories are created
        #[arg(long, value_name = "DIR")]
        work_root: Option<PathBuf>,
        /// Suite config file (default: sessiontest.{yaml,yml,toml} if present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
    },
    /// Check script syntax without running anything
    Validate {
        /// Script files, or directories searched for *.in scripts
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Scaffold a new test script
    Init {
        /// Output path for the new script
        #[arg(default_value = "tests/example.in")]
        path: PathBuf,
    },
    /// Output the suite config schema
    Schema,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "sessiontest=debug"
    } else {
        "sessiontest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            paths,
            show,
            keep,
            progdir,
            subject,
            timeout,
            refdir,
            work_root,
            config,
            output,
        } => {
            let suite_config = match config {
                Some(path) => loader::load_config(&path).map(Some),
                None => loader::load_suite_config(Path::new(".")),
            };
            let suite_config = match suite_config {
                Ok(config) => config.unwrap_or_default(),
                Err(e) => {
                    eprintln!("Error loading suite config: {e}");
                    std::process::exit(1);
                }
            };

            let overrides = config::Overrides {
                timeout,
                subject,
                progdir,
                reference_dir: refdir,
                work_root,
                keep,
            };
            let run_config = match suite_config.resolve(&overrides) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };

            let scripts = match loader::find_scripts(&paths) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error finding scripts: {e}");
                    std::process::exit(1);
                }
            };

            let summary = run_all(&scripts, &run_config, show, output);
            std::process::exit(summary.exit_code());
        }
        Command::Validate { paths } => {
            let scripts = match loader::find_scripts(&paths) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error finding scripts: {e}");
                    std::process::exit(1);
                }
            };
            if scripts.is_empty() {
                eprintln!("No scripts found");
                std::process::exit(1);
            }

            let mut errors = 0;
            for path in &scripts {
                match validate_script(path) {
                    Ok(count) => println!("✓ {} ({count} instructions)", path.display()),
                    Err(e) => {
                        eprintln!("✗ {}: {e}", path.display());
                        errors += 1;
                    }
                }
            }

            if errors > 0 {
                eprintln!("\n{errors} script(s) failed validation");
                std::process::exit(1);
            }
            println!("\nAll {} script(s) valid", scripts.len());
        }
        Command::Init { path } => {
            let template = r#"# Example session. Lines are substituted before they run:
# ${NAME} is a D definition, ${1} a group from the last <<<* block.
T 5
D NAME "world"
> hello ${NAME}
hello ${NAME}
<<<
> id=42
id=(\d+)
<<<*
> ${1}
42
<<<
"#;
            if path.exists() {
                eprintln!("Error: file already exists: {}", path.display());
                std::process::exit(1);
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
                && let Err(e) = fs::create_dir_all(parent)
            {
                eprintln!("Error creating directory: {e}");
                std::process::exit(1);
            }
            if let Err(e) = fs::write(&path, template) {
                eprintln!("Error writing file: {e}");
                std::process::exit(1);
            }
            println!("Created: {}", path.display());
        }
        Command::Schema => {
            let schema = config::generate_schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing schema: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Run every script in order and report as we go.
fn run_all(
    scripts: &[PathBuf],
    config: &runner::RunConfig,
    show: Option<ShowLimit>,
    output: OutputFormat,
) -> Summary {
    let mut summary = Summary::default();
    let mut remaining_details = show;
    let mut json_results = Vec::new();

    for path in scripts {
        let result = runner::run_script(path, config);
        summary.record(&result.verdict);

        match output {
            OutputFormat::Human => {
                println!("{}: {}", result.name, report::status_line(&result));
                if let Some(dir) = &result.kept_dir {
                    println!("    Testing directory: {}", dir.display());
                }
                if !result.verdict.passed() {
                    print_details(&result, &mut remaining_details);
                }
            }
            OutputFormat::Json => json_results.push(report::to_json(&result)),
        }
    }

    match output {
        OutputFormat::Human => println!("\n{}", report::summary_line(&summary)),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "summary": summary,
                "results": json_results,
            });
            match serde_json::to_string_pretty(&output) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error serializing results: {e}"),
            }
        }
    }
    summary
}

fn print_details(result: &runner::ScriptResult, remaining: &mut Option<ShowLimit>) {
    match remaining {
        None => {}
        Some(ShowLimit::Count(0)) => println!("   Limit on error details exceeded."),
        Some(limit) => {
            if let Some(detail) = report::failure_detail(result) {
                println!("    {detail}");
            }
            match fs::read_to_string(&result.path) {
                Ok(source) => print!("{}", report::format_details(result, &source)),
                Err(e) => println!("    (could not read {}: {e})", result.path.display()),
            }
            if let ShowLimit::Count(n) = limit {
                *n -= 1;
            }
        }
    }
}

/// Parse a script without running it; returns the instruction count.
fn validate_script(path: &Path) -> Result<usize, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("could not read script: {e}"))?;
    let mut reader = script::ScriptReader::new(&text);
    let mut count = 0;
    loop {
        match reader.next_instruction(|line| Ok(line.to_string())) {
            Ok(Some(script::Instruction::Comment)) => {}
            Ok(Some(_)) => count += 1,
            Ok(None) => return Ok(count),
            Err(e) => return Err(format!("line {}: {e}", reader.line())),
        }
    }
}
