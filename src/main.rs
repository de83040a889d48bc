use std::{io::Write, os::unix::process::CommandExt, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use ccwrap::{
    config::{WRAPPER_LOG_KEY, resolve_config},
    diagnostics::read_log,
    install::{Alias, DEFAULT_TOOLS, default_aliases, install_wrappers},
    is_admin, wrap_current_process,
    wrapper::Next,
};

#[derive(Parser)]
#[command(name = "ccwrap", version, about, long_about = None)]
struct Cli {
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the compilers in a toolchain's bin directory with the wrapper
    Install {
        /// e.g. out/stage2-install/bin
        bin_dir: PathBuf,
        #[arg(long = "tool")]
        /// Tool to wrap (default: clang, clang-tidy)
        tools: Vec<String>,
        #[arg(long = "alias")]
        /// NAME=TARGET, e.g. clang++=clang (default: clang++=clang)
        aliases: Vec<Alias>,
    },
    /// Summarize a diagnostics log written by the wrapper
    Log {
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        /// Print the full stderr of every entry
        full: bool,
    },
    /// Print the flags appended to compiler invocations
    Flags {
        /// Directory of an installed wrapper; defaults to the built-in flags
        dir: Option<PathBuf>,
    },
}

fn init_admin_logger(verbose: u8) {
    env_logger::builder()
        .filter_level(match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format(|buf, record| {
            let warn_style = buf.default_level_style(log::Level::Warn);
            match record.level() {
                log::Level::Info => {
                    writeln!(buf, "{}", record.args())
                }
                _ => {
                    writeln!(buf, "{warn_style}{}{warn_style:#}", record.args())
                }
            }
        })
        .init();
}

/// Compiler stderr is what the build sees, keep the wrapper quiet unless asked.
fn init_wrapper_logger() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(WRAPPER_LOG_KEY, "warn"))
        .format(|buf, record| writeln!(buf, "ccwrap: {}", record.args()))
        .init();
}

fn admin() -> Result<()> {
    let cli = Cli::parse();
    init_admin_logger(cli.verbose);

    match cli.command {
        Commands::Install {
            bin_dir,
            tools,
            aliases,
        } => {
            let tools = if tools.is_empty() {
                DEFAULT_TOOLS.iter().map(|s| s.to_string()).collect()
            } else {
                tools
            };
            let aliases = if aliases.is_empty() {
                default_aliases()
                    .into_iter()
                    .filter(|a| tools.contains(&a.target))
                    .collect()
            } else {
                aliases
            };
            let exe = std::env::current_exe().context("locating ccwrap")?;
            install_wrappers(&bin_dir, exe, &tools, &aliases)?;
        }
        Commands::Log { path, full } => {
            let entries = read_log(&path)?;
            for entry in &entries {
                println!("{}", entry.command.bold());
                if full {
                    print!("{}", String::from_utf8_lossy(&entry.stderr));
                } else if let Some(line) = entry.first_diagnostic() {
                    println!("    {}", line.dimmed());
                }
            }
            log::info!("{} entries in {}", entries.len(), path.display());
        }
        Commands::Flags { dir } => {
            let config = match dir {
                Some(dir) => resolve_config(dir)?,
                None => Default::default(),
            };
            log::info!("direct:  {}", config.direct_flags().collect::<Vec<_>>().join(" "));
            log::info!("capture: {}", config.capture_flags().collect::<Vec<_>>().join(" "));
        }
    };

    Ok(())
}

fn main() -> Result<()> {
    let exe = std::env::args_os().next().map(PathBuf::from).unwrap_or_default();
    if is_admin(&exe) {
        return admin();
    }

    init_wrapper_logger();
    match wrap_current_process()? {
        Next::Exit(code) => std::process::exit(code),
        Next::Replace(mut cmd) => {
            let err = cmd.exec();
            // exec() only returns on error
            bail!(
                "failed to execute {}: {}",
                cmd.get_program().to_string_lossy(),
                err
            );
        }
    }
}
