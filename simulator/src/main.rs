#[macro_use]
extern crate clap;

use clap::Parser;
use once_cell::sync::Lazy;
use pagesim::{Scenario, SimError};
use pagesim_console::{println, Console};
use pagesim_vm::{ConfigError, PolicyKind};
use std::{
    io::{IsTerminal, Write},
    path::PathBuf,
    process::ExitCode,
};

/// 环境变量 `LOG` 给出的缺省日志级别。
static LOG_LEVEL: Lazy<Option<String>> = Lazy::new(|| std::env::var("LOG").ok());

#[derive(Parser)]
#[clap(name = "pagesim")]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its trace and statistics.
    Run(RunArgs),
    /// Parse and validate a scenario without running it.
    Check(CheckArgs),
}

#[derive(Args)]
struct RunArgs {
    /// scenario file
    scenario: PathBuf,
    /// replacement policy (`fifo` or `second-chance`), overrides the scenario
    #[clap(long, value_parser = parse_policy)]
    policy: Option<PolicyKind>,
    /// number of frames, overrides the scenario
    #[clap(long)]
    frames: Option<usize>,
    /// frames the clock sweep tries to free, overrides the scenario
    #[clap(long)]
    wanted: Option<usize>,
    /// swap latency in ticks, overrides the scenario
    #[clap(long)]
    latency: Option<u64>,
    /// log level
    #[clap(long)]
    log: Option<String>,
    /// do not print the trace
    #[clap(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// scenario file
    scenario: PathBuf,
    /// log level
    #[clap(long)]
    log: Option<String>,
}

fn parse_policy(s: &str) -> Result<PolicyKind, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

struct Stdout;

impl Console for Stdout {
    #[inline]
    fn put_char(&self, c: u8) {
        let _ = std::io::stdout().write_all(&[c]);
    }

    #[inline]
    fn put_str(&self, s: &str) {
        let _ = std::io::stdout().lock().write_all(s.as_bytes());
    }

    fn colored(&self) -> bool {
        std::io::stdout().is_terminal()
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = match &cli.command {
        Commands::Run(args) => args.log.clone(),
        Commands::Check(args) => args.log.clone(),
    };
    let _ = pagesim_console::init_console(&Stdout);
    pagesim_console::set_log_level(log.as_deref().or(LOG_LEVEL.as_deref()));

    let result = match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.check(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

impl RunArgs {
    fn run(self) -> Result<(), SimError> {
        let mut scenario = Scenario::load(&self.scenario)?;
        scenario.override_with(self.policy, self.frames, self.wanted, self.latency);
        let report = pagesim::run(&scenario)?;
        if !self.quiet {
            for entry in &report.trace {
                println!("{}", report.line(entry));
            }
        }
        println!("{report}");
        report.audit.map_err(SimError::Audit)
    }
}

impl CheckArgs {
    fn check(self) -> Result<(), SimError> {
        let summary = Scenario::load(&self.scenario)?.check()?;
        let config = &summary.config;
        println!(
            "{}: {} tasks, {} contexts, {} ops, {} kills",
            self.scenario.display(),
            summary.tasks,
            summary.contexts.len(),
            summary.ops,
            summary.kills,
        );
        println!(
            "memory: {} frames, {}-bit addresses, {} pages per task, {} (wanted {}), latency {}",
            config.frames,
            config.virtual_address_bits,
            config.page_table_size(),
            config.policy,
            config.frames_wanted,
            summary.latency,
        );
        Ok(())
    }
}
