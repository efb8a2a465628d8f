// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;
mod telegram;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::RunCliOptions;
use ih_cancel::CancelToken;
use ih_config::HarnessConfig;
use ih_report::GroupBy;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Ingest pipeline test harness and integration runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file, merged under environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test-harness operations: run, capture, forward, status, history.
    Test {
        #[command(subcommand)]
        command: TestCommands,
    },
    /// Send a single ad hoc message (or upload a file) directly into the
    /// test input channel, bypassing the fixture store.
    Direct {
        /// Local file to upload as a document. With no file, sends `text`
        /// as a plain message.
        file: Option<PathBuf>,

        /// Message text or caption.
        #[arg(long)]
        text: Option<String>,

        /// Send into `production_channel_id` instead of the test input
        /// channel, bypassing the test harness entirely.
        #[arg(long)]
        skip_tests: bool,
    },
    /// Search the catalog by id or name substring.
    Search {
        /// Substring to search for.
        query: String,
    },
    /// Poll the test notification channel continuously, logging every
    /// notification observed.
    Watch,
}

#[derive(Subcommand, Debug)]
enum TestCommands {
    /// Run the selected specs against already-captured fixtures and
    /// render the result. Alias of `test integration`.
    Run(RunArgs),
    /// Run the selected specs end to end, triggering the pipeline and
    /// correlating notifications.
    Integration(RunArgs),
    /// Populate or refresh fixtures for the selected specs.
    Capture {
        /// `--id <testId>`.
        #[arg(long)]
        id: Option<String>,
        /// `--suite <category>`.
        #[arg(long)]
        suite: Option<String>,
        /// `--group <group>`.
        #[arg(long)]
        group: Option<String>,
        /// Delete every known fixture message first, then resend every
        /// selected spec.
        #[arg(long)]
        force: bool,
    },
    /// Re-send a single spec's committed fixture into the test input
    /// channel without waiting for a correlated notification.
    Forward {
        /// Spec id to forward, e.g. `TEST-SCOPE-001`.
        id: String,
        /// Forward the text/caption portion only, skipping media.
        #[arg(long)]
        skip_media: bool,
    },
    /// Render the most recent run, or a specific one by id, as Markdown.
    Status {
        /// Run id, e.g. `run-2026-07-27-001`. Defaults to the most recent.
        run_id: Option<String>,
    },
    /// List every sealed run id, most recent first.
    Runs,
    /// Render the rolling trend history.
    History {
        /// Restrict to a single test id. Omit for every test.
        test_id: Option<String>,
        /// How to group the rendered table when `test_id` is omitted.
        #[arg(long, value_enum, default_value_t = GroupByArg::None)]
        group_by: GroupByArg,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// `--id <testId>`.
    #[arg(long)]
    id: Option<String>,
    /// `--suite <category>`.
    #[arg(long)]
    suite: Option<String>,
    /// `--group <group>`.
    #[arg(long)]
    group: Option<String>,
    /// Run the selected specs concurrently, up to `runner_concurrency`.
    #[arg(long)]
    parallel: bool,
    /// Override each spec's own timeout, in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Forward text/caption only, skipping media sends.
    #[arg(long)]
    skip_media: bool,
    /// Never invoke the semantic judge, even for specs that carry one.
    #[arg(long)]
    skip_llm_judge: bool,
    /// Resolve and print the selected specs without forwarding any
    /// fixture or triggering the pipeline.
    #[arg(long)]
    dry_run: bool,
}

impl From<&RunArgs> for RunCliOptions {
    fn from(args: &RunArgs) -> Self {
        Self {
            id: args.id.clone(),
            suite: args.suite.clone(),
            group: args.group.clone(),
            parallel: args.parallel,
            timeout_ms: args.timeout,
            skip_media: args.skip_media,
            skip_llm_judge: args.skip_llm_judge,
            dry_run: args.dry_run,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum GroupByArg {
    None,
    Category,
    Group,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::None => GroupBy::None,
            GroupByArg::Category => GroupBy::Category,
            GroupByArg::Group => GroupBy::Group,
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ingest=debug,ih_runner=debug,ih_populator=debug,ih_backend_core=debug")
    } else {
        EnvFilter::new("ingest=info,ih_runner=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&std::path::Path>) -> std::result::Result<HarnessConfig, ih_error::IhError> {
    ih_config::load_config(path).map_err(ih_config::ConfigError::into_ih_error)
}

async fn run(cli: Cli) -> std::result::Result<(), ih_error::IhError> {
    let config = load_config(cli.config.as_deref())?;
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Test { command } => run_test_command(&config, command, &cancel).await,
        Commands::Direct { file, text, skip_tests } => {
            let message_id = commands::direct_send(&config, text.as_deref(), file.as_deref(), skip_tests).await?;
            println!("sent message id {message_id}");
            Ok(())
        }
        Commands::Search { query } => {
            let matches = commands::search_catalog(&query);
            if matches.is_empty() {
                println!("no specs matched {query:?}");
            } else {
                for spec in matches {
                    println!("{} — {} ({})", spec.id, spec.name, spec.category.path_segment());
                }
            }
            Ok(())
        }
        Commands::Watch => commands::watch_notifications(&config, &cancel).await,
    }
}

async fn run_test_command(
    config: &HarnessConfig,
    command: TestCommands,
    cancel: &CancelToken,
) -> std::result::Result<(), ih_error::IhError> {
    match command {
        TestCommands::Run(args) | TestCommands::Integration(args) => {
            let dry_run = args.dry_run;
            let opts = RunCliOptions::from(&args);
            let run = commands::run_tests(config, &opts, cancel).await?;
            if dry_run {
                return Ok(());
            }
            let markdown = commands::write_run_report(config, &run)?;
            println!("{markdown}");
            if run.summary.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        TestCommands::Capture { id, suite, group, force } => {
            let summary = commands::capture_fixtures(config, id.as_deref(), suite.as_deref(), group.as_deref(), force).await?;
            println!(
                "existing: {}, sent: {}, skipped: {}, errors: {}",
                summary.existing,
                summary.sent,
                summary.skipped,
                summary.errors.len()
            );
            for issue in &summary.errors {
                eprintln!("  {}: {}", issue.test_id, issue.reason);
            }
            Ok(())
        }
        TestCommands::Forward { id, skip_media } => {
            commands::forward_one(config, &id, skip_media).await?;
            println!("forwarded fixture for {id}");
            Ok(())
        }
        TestCommands::Status { run_id } => {
            let markdown = commands::run_status(config, run_id.as_deref())?;
            println!("{markdown}");
            Ok(())
        }
        TestCommands::Runs => {
            for id in commands::list_runs(config)? {
                println!("{id}");
            }
            Ok(())
        }
        TestCommands::History { test_id, group_by } => {
            let markdown = commands::test_history(config, test_id.as_deref(), group_by.into())?;
            println!("{markdown}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(err) = run(cli).await {
        eprintln!("error: {} ({})", err.message, err.code.as_str());
        std::process::exit(err.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_by_arg_maps_to_report_group_by() {
        assert_eq!(GroupBy::from(GroupByArg::None), GroupBy::None);
        assert_eq!(GroupBy::from(GroupByArg::Category), GroupBy::Category);
        assert_eq!(GroupBy::from(GroupByArg::Group), GroupBy::Group);
    }

    #[test]
    fn run_args_convert_into_run_cli_options() {
        let args = RunArgs {
            id: Some("TEST-SCOPE-001".to_string()),
            suite: None,
            group: None,
            parallel: true,
            timeout: Some(5_000),
            skip_media: true,
            skip_llm_judge: false,
            dry_run: false,
        };
        let opts = RunCliOptions::from(&args);
        assert_eq!(opts.id.as_deref(), Some("TEST-SCOPE-001"));
        assert!(opts.parallel);
        assert_eq!(opts.timeout_ms, Some(5_000));
        assert!(opts.skip_media);
        assert!(!opts.dry_run);
    }
}
