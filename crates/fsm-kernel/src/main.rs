use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fsm_kernel::config::HarnessConfig;
use fsm_kernel::convergence::DEFAULT_TTL_MONITOR_SLEEP_SECS;
use fsm_kernel::test_harness::{run_simulator, SimulatorConfig};
use fsm_kernel::workloads::IndexedInsertTtl;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("fsm-kernel")
        .version(fsm_kernel::VERSION)
        .about("FSM concurrency workloads")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run indexed_insert_ttl against the in-memory store")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("TOML harness configuration"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value("20")
                        .value_parser(value_parser!(usize))
                        .help("Number of concurrent workers"),
                )
                .arg(
                    Arg::new("iterations")
                        .long("iterations")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Steps per worker"),
                )
                .arg(
                    Arg::new("ttl-seconds")
                        .long("ttl-seconds")
                        .default_value("5")
                        .value_parser(value_parser!(u64))
                        .help("expireAfterSeconds of the TTL index"),
                )
                .arg(
                    Arg::new("monitor-secs")
                        .long("monitor-secs")
                        .default_value("60")
                        .value_parser(value_parser!(u64))
                        .help("Seconds between TTL monitor passes"),
                )
                .arg(
                    Arg::new("no-sweep")
                        .long("no-sweep")
                        .action(ArgAction::SetTrue)
                        .help("Do not run the TTL monitor (teardown will time out)"),
                )
                .arg(
                    Arg::new("ci")
                        .long("ci")
                        .action(ArgAction::SetTrue)
                        .help("Use the CI timeout multiplier"),
                )
                .arg(
                    Arg::new("balancer")
                        .long("balancer")
                        .action(ArgAction::SetTrue)
                        .help("Simulate a cluster with a balancer"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("timeout")
                .about("Print the teardown convergence timeout")
                .arg(
                    Arg::new("ttl-seconds")
                        .long("ttl-seconds")
                        .default_value("5")
                        .value_parser(value_parser!(u64))
                        .help("expireAfterSeconds of the TTL index"),
                )
                .arg(
                    Arg::new("ci")
                        .long("ci")
                        .action(ArgAction::SetTrue)
                        .help("Use the CI timeout multiplier"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn harness_config(args: &ArgMatches) -> anyhow::Result<HarnessConfig> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("loading harness config from {path}"))?,
        None => HarnessConfig::default(),
    }
    .with_env_overrides();

    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }
    if args.get_flag("ci") {
        config = config.with_ci(true);
    }
    if args.get_flag("balancer") {
        config = config.with_balancer(true);
    }
    Ok(config)
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let harness = harness_config(args)?;
    let config = SimulatorConfig {
        harness,
        thread_count: args.get_one::<usize>("threads").copied().unwrap_or(20),
        iterations: args.get_one::<u64>("iterations").copied().unwrap_or(200),
        ttl_seconds: args.get_one::<u64>("ttl-seconds").copied().unwrap_or(5),
        monitor_period: Duration::from_secs(
            args.get_one::<u64>("monitor-secs")
                .copied()
                .unwrap_or(DEFAULT_TTL_MONITOR_SLEEP_SECS),
        ),
        sweep_enabled: !args.get_flag("no-sweep"),
        ..Default::default()
    };

    let report = run_simulator(config).await;
    if args.get_flag("json") {
        println!("{}", report.to_json().context("serializing report")?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let passed = simulate(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("timeout", args)) => {
            let ttl = args.get_one::<u64>("ttl-seconds").copied().unwrap_or(5);
            let ci = args.get_flag("ci")
                || HarnessConfig::default().with_env_overrides().ci_environment;
            let timeout = IndexedInsertTtl::new()
                .with_ttl_seconds(ttl)
                .convergence_timeout(ci);
            println!("{}", timeout.as_millis());
        }
        _ => {
            println!("FSM Kernel v{}", fsm_kernel::VERSION);
            println!("Use --help for usage information");
        }
    }
    Ok(())
}
