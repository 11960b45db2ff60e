//! `ofw` - drive the command executor from the command line

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, Command};
use ofw_commands::{CommandExecutor, ExecutorConfig, TracingMiddleware};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod workload;

use workload::{AddTwoNumbers, StressReport};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ExecutorConfig> {
    let Some(path) = path else {
        return Ok(ExecutorConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ExecutorConfig::from_json_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("ofw")
        .version(ofw_commands::VERSION)
        .about("Scoped command executor driver")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("demo").about("Run AddTwoNumbers(3, 5) through the tracing middleware"))
        .subcommand(
            Command::new("stress")
                .about("Run concurrent invocations and verify scope isolation")
                .arg(
                    Arg::new("invocations")
                        .long("invocations")
                        .default_value("1000")
                        .value_parser(value_parser!(usize))
                        .help("Number of concurrent invocations"),
                )
                .arg(
                    Arg::new("max-delay-ms")
                        .long("max-delay-ms")
                        .default_value("50")
                        .value_parser(value_parser!(u64))
                        .help("Upper bound of the random delay inside each command"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Executor configuration file (JSON)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("demo", _)) => {
            let container = workload::container();
            let executor = CommandExecutor::builder(Arc::new(container))
                .middleware(TracingMiddleware::new())
                .build();
            let sum = executor.invoke(&AddTwoNumbers { a: 3, b: 5 }).await?;
            println!("{sum}");
        }
        Some(("stress", args)) => {
            let invocations = args.get_one::<usize>("invocations").copied().unwrap_or(1000);
            let max_delay_ms = args.get_one::<u64>("max-delay-ms").copied().unwrap_or(50);
            let config = load_config(args.get_one::<PathBuf>("config"))?;

            tracing::info!(invocations, max_delay_ms, ?config, "starting stress run");
            let container = workload::container();
            let executor = Arc::new(
                CommandExecutor::builder(Arc::new(container.clone()))
                    .config(config)
                    .build(),
            );

            let report: StressReport =
                workload::run_stress(executor, &container, invocations, max_delay_ms).await?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            if !report.passed() {
                std::process::exit(1);
            }
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
