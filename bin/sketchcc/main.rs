//! sketchcc - compile a sketch through a console-driven shell
//!
//! Compiles one source file with the local shell sandbox and prints the
//! resulting Intel HEX, or writes it to a file.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use sketchcc::{
    CompilationParameters, Compiler, CompilerEvent, Config, EventKind, LocalShellSandbox,
};

/// Command line options
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Enable debug mode
    debug: bool,
    /// Target device override
    device: Option<String>,
    /// Clock rate override
    clock_rate: Option<String>,
    /// Write the artifact here instead of stdout
    output: Option<PathBuf>,
    /// Source file to compile
    source: Option<PathBuf>,
}

impl AppArgs {
    /// Parse command line arguments
    fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    app_args.config_path = Some(PathBuf::from(value_of(&args, i)?));
                    i += 1;
                }
                "--debug" | "-d" => {
                    app_args.debug = true;
                }
                "--device" | "-m" => {
                    app_args.device = Some(value_of(&args, i)?.to_string());
                    i += 1;
                }
                "--clock" | "-f" => {
                    app_args.clock_rate = Some(value_of(&args, i)?.to_string());
                    i += 1;
                }
                "--output" | "-o" => {
                    app_args.output = Some(PathBuf::from(value_of(&args, i)?));
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("{} v{}", sketchcc::NAME, sketchcc::VERSION);
                    process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    bail!("Unknown option: {}", arg);
                }
                path => {
                    if app_args.source.is_some() {
                        bail!("Only one source file can be compiled at a time");
                    }
                    app_args.source = Some(PathBuf::from(path));
                }
            }
            i += 1;
        }

        Ok(app_args)
    }
}

fn value_of(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("Missing value for {}", args[i]))
}

/// Print help information
fn print_help() {
    println!("sketchcc - {}", sketchcc::DESCRIPTION);
    println!();
    println!("USAGE:");
    println!("    sketchcc [OPTIONS] <SOURCE>");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -d, --debug            Enable debug logging");
    println!("    -m, --device <MCU>     Target device (default from config, atmega328p)");
    println!("    -f, --clock <F_CPU>    Clock rate define (default from config, 16000000L)");
    println!("    -o, --output <PATH>    Write the HEX artifact to a file");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("CONFIGURATION:");
    println!("    sketchcc looks for configuration files in the following order:");
    println!("    1. Path specified with --config");
    println!("    2. $SKETCHCC_CONFIG");
    println!("    3. $XDG_CONFIG_HOME/sketchcc/config.toml");
    println!("    4. ~/.config/sketchcc/config.toml");
    println!("    5. ~/.sketchcc/config.toml");
    println!("    6. ./.sketchcc/config.toml");
    println!("    7. Built-in defaults");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG               Set logging filter (sketchcc::serial=trace logs the console)");
}

fn init_logging(config: &Config, debug: bool) {
    let default_filter = if debug {
        "debug".to_string()
    } else {
        config.logging.filter_directive()
    };
    let env_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn load_configuration(args: &AppArgs) -> Result<Config> {
    match &args.config_path {
        Some(path) => sketchcc::init_with_config(path)
            .map_err(|e| anyhow::anyhow!(sketchcc::handle_startup_error(&e))),
        None => Ok(sketchcc::init()),
    }
}

fn register_observers(compiler: &Compiler<LocalShellSandbox>) {
    compiler.on_event(EventKind::DownloadProgress, "cli", |event| {
        if let CompilerEvent::DownloadProgress(percent) = event {
            info!("Downloading sandbox image: {:.0}%", percent);
        }
    });
    compiler.on_event(EventKind::SandboxReady, "cli", |_| info!("Sandbox ready"));
    compiler.on_event(EventKind::CommandError, "cli", |event| {
        if let CompilerEvent::CommandError(diagnostic) = event {
            if !diagnostic.is_empty() {
                eprintln!("{}", diagnostic);
            }
        }
    });
    for kind in [
        EventKind::SourceStaged,
        EventKind::ObjectBuilt,
        EventKind::ArtifactLinked,
        EventKind::ArtifactConverted,
    ] {
        compiler.on_event(kind, "cli", move |_| debug!("{}", kind));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("Failed to parse arguments: {}", e);
        print_help();
        process::exit(1);
    });

    // Logging settings live in the configuration
    let config = load_configuration(&args)?;
    init_logging(&config, args.debug);

    let Some(source_path) = &args.source else {
        print_help();
        process::exit(1);
    };
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read {}", source_path.display()))?;

    let config = config.for_local_shell();
    debug!("Local shell works in {}", config.pipeline.work_dir);
    let compiler = Compiler::new(LocalShellSandbox::new(config.sandbox.clone()), config);
    register_observers(&compiler);

    let parameters = CompilationParameters {
        device: args.device.clone(),
        clock_rate: args.clock_rate.clone(),
    };
    let result = compiler
        .compile(&source, Some(parameters))
        .await
        .context("Compilation could not run")?;

    if let Err(e) = compiler.shutdown().await {
        warn!("Failed to shut down sandbox: {}", e);
    }

    if !result.success {
        error!("{}", result.message.as_deref().unwrap_or("Compilation failed"));
        process::exit(2);
    }

    let hex = result.output.unwrap_or_default();
    match &args.output {
        Some(path) => {
            fs::write(path, &hex).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", hex.len(), path.display());
        }
        None => print!("{}", hex),
    }

    Ok(())
}
