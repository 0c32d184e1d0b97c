//! The dht-bench executable drives a running cluster and analyses what it measured.
//!
//! `dht-bench --nodes HOST:PORT,HOST:PORT,... <SUBCOMMAND>`
//!
//!     check       GET /helloworld on every node and verify each answers with its own address
//!     join-all    join every node to the first one
//!     leave-all   make every node leave
//!     join-leave  time repeated join-all/leave-all cycles (growth-and-measure mode)
//!     workload    time PUT/GET requests and append them to the sample logs
//!     probe       verify stored values survive a membership churn (or, with --crash, a crash)
//!
//! The node set can also be given as a JSON array (`--nodes-json`) or read from a deployment
//! `Nodes.json` file (`--nodes-file`). The first node is the bootstrap node.
//! Ctrl-C (or `--deadline-secs`) stops a cluster command between two node operations; whatever
//! was measured so far is still reported and written.
//!
//! `dht-bench stats <LOG>` prints the aggregated statistics of one sample log as JSON.
//! `dht-bench plot` renders PUT_log.txt and GET_log.txt into an SVG error-bar chart; it fails
//! with a non-zero exit code if either log holds no samples.
//! `dht-bench node-ids <Nodes.json>` writes the node ids of a deployment file to node_ids.txt.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use dhtbench::node::read_deployment;
use dhtbench::workload::random_keys;
use dhtbench::{
    Aggregator, BatchReport, BenchConfig, BenchError, BenchmarkContext, HttpNodeClient,
    MembershipController, NodeSet, PlotRenderer, ProbeOutcome, Result, SampleLogger,
    SvgPlotRenderer, TimedRunner, WorkloadBenchmark,
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_LOG_LEVEL: &str = "info";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: BenchConfig,
    nodes: Option<NodeSet>,
    deadline: Option<Duration>,
}

impl Opt {
    /// loads the configuration file, if any, then applies the command line overrides
    /// # Errors
    /// returns [`BenchError::Parsing`] if one of the parameters is invalid
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let mut config = match matches.value_of("config") {
            Some(path) => BenchConfig::from_file(Path::new(path))?,
            None => BenchConfig::default(),
        };
        if let Some(dir) = matches.value_of("out-dir") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_value::<u64>(matches, "timeout-ms")? {
            config.timeout_ms = ms;
        }

        match matches.subcommand() {
            ("join-leave", Some(args)) => {
                if let Some(amount) = parse_value(args, "amount")? {
                    config.cluster_size = amount;
                }
                if let Some(iterations) = parse_value(args, "iterations")? {
                    config.iterations = iterations;
                }
                if args.is_present("legacy-format") {
                    config.legacy_growth_format = true;
                }
            }
            ("workload", Some(args)) => {
                if let Some(keys) = parse_value(args, "keys")? {
                    config.key_count = keys;
                }
                if let Some(passes) = parse_value(args, "passes")? {
                    config.passes = passes;
                }
            }
            ("stats", Some(args)) | ("plot", Some(args)) => {
                if args.is_present("no-stddev") {
                    config.with_stddev = false;
                }
            }
            _ => {}
        }
        config.validate()?;

        let nodes = if let Some(addrs) = matches.values_of("nodes") {
            Some(NodeSet::parse(addrs)?)
        } else if let Some(json) = matches.value_of("nodes-json") {
            Some(NodeSet::from_json(json)?)
        } else if let Some(path) = matches.value_of("nodes-file") {
            Some(NodeSet::from_deployment(Path::new(path))?)
        } else {
            None
        };
        let deadline = parse_value::<u64>(matches, "deadline-secs")?.map(Duration::from_secs);

        Ok(Opt {
            config,
            nodes,
            deadline,
        })
    }

    /// builds the run context; fails if no node set was given
    fn context(self) -> Result<BenchmarkContext> {
        let nodes = self.nodes.ok_or_else(|| {
            BenchError::Parsing(
                "no nodes given, use --nodes, --nodes-json or --nodes-file".to_string(),
            )
        })?;
        let ctx = BenchmarkContext::new(nodes, self.config);
        if let Some(deadline) = self.deadline {
            ctx.cancel.cancel_after(deadline);
        }
        // Ctrl-C stops the run at the next node boundary so reports and dumps still get written
        let cancel = ctx.cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            warn!("interrupt received, stopping after the current request");
            cancel.cancel();
        }) {
            error!("failed to set Ctrl-C handler: {}", e);
        }
        Ok(ctx)
    }
}

fn main() {
    let matches = App::new("dht-bench")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("benchmarks membership changes and PUT/GET latency of a chord-like cluster")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("nodes")
            .long("nodes")
            .value_name("HOST:PORT,...")
            .help("comma separated node addresses, the first one is the bootstrap node")
            .takes_value(true)
            .multiple(true)
            .use_delimiter(true)
            .require_delimiter(true)
            .conflicts_with_all(&["nodes-json", "nodes-file"]))
        .arg(Arg::with_name("nodes-json")
            .long("nodes-json")
            .value_name("JSON")
            .help("node addresses as a JSON array of strings")
            .conflicts_with("nodes-file"))
        .arg(Arg::with_name("nodes-file")
            .long("nodes-file")
            .value_name("FILE")
            .help("a deployment Nodes.json file to take the node addresses from"))
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .help("a JSON configuration file"))
        .arg(Arg::with_name("out-dir")
            .long("out-dir")
            .value_name("DIR")
            .help("directory that receives logs, dumps and plots"))
        .arg(Arg::with_name("timeout-ms")
            .long("timeout-ms")
            .value_name("MILLIS")
            .help("per-request timeout, 0 disables it"))
        .arg(Arg::with_name("deadline-secs")
            .long("deadline-secs")
            .value_name("SECS")
            .help("stop the run between two node operations once this much time has passed"))
        .arg(Arg::with_name("log-level")
            .long("log-level")
            .value_name("LEVEL")
            .help("trace, debug, info, warn or error")
            .default_value(DEFAULT_LOG_LEVEL))
        .subcommands(vec![
            SubCommand::with_name("check")
                .about("verify every node answers /helloworld with its own address"),
            SubCommand::with_name("join-all")
                .about("join every node to the bootstrap node"),
            SubCommand::with_name("leave-all")
                .about("make every node leave the ring"),
            SubCommand::with_name("join-leave")
                .about("time repeated join-all/leave-all cycles")
                .arg(Arg::with_name("amount").long("amount").value_name("N")
                    .help("how many nodes take part, bootstrap included"))
                .arg(Arg::with_name("iterations").long("iterations").value_name("N")
                    .help("how many cycles to run"))
                .arg(Arg::with_name("legacy-format").long("legacy-format")
                    .help("write the timings as a bare array of arrays")),
            SubCommand::with_name("workload")
                .about("time PUT and GET requests round-robin across the nodes")
                .arg(Arg::with_name("keys").long("keys").value_name("N")
                    .help("how many random keys to write and read back"))
                .arg(Arg::with_name("passes").long("passes").value_name("N")
                    .help("how many full PUT passes, then GET passes, to run")),
            SubCommand::with_name("probe")
                .about("verify stored values survive a leave/rejoin of every node")
                .arg(Arg::with_name("crash").long("crash")
                    .help("simulate a crash of the second node instead of a leave/rejoin")),
            SubCommand::with_name("stats")
                .about("print the aggregated statistics of a sample log as JSON")
                .arg(Arg::with_name("LOG").required(true).index(1))
                .arg(Arg::with_name("no-stddev").long("no-stddev")
                    .help("only compute averages")),
            SubCommand::with_name("plot")
                .about("render the PUT and GET logs into an error-bar chart")
                .arg(Arg::with_name("put").long("put").value_name("FILE")
                    .help("the PUT sample log, defaults to PUT_log.txt in the output directory"))
                .arg(Arg::with_name("get").long("get").value_name("FILE")
                    .help("the GET sample log, defaults to GET_log.txt in the output directory"))
                .arg(Arg::with_name("output").long("output").value_name("FILE")
                    .help("where to write the chart"))
                .arg(Arg::with_name("no-stddev").long("no-stddev")
                    .help("draw averages without error bars")),
            SubCommand::with_name("node-ids")
                .about("write the ids of a deployment Nodes.json file, one per line")
                .arg(Arg::with_name("NODES_FILE").required(true).index(1))
                .arg(Arg::with_name("output").long("output").value_name("FILE")
                    .default_value("node_ids.txt")),
        ])
        .get_matches();

    // configure a subscriber that will log messages to STDERR
    let level = match matches.value_of("log-level").unwrap_or(DEFAULT_LOG_LEVEL).parse::<Level>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("invalid --log-level, expected trace, debug, info, warn or error");
            exit(1);
        }
    };
    subscriber_config(level);

    if let Err(e) = Opt::build(&matches).and_then(|opt| run(opt, &matches)) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the requested subcommand
fn run(opt: Opt, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("stats", Some(args)) => {
            let log = args.value_of("LOG").unwrap_or_default();
            let stats = Aggregator::new(opt.config.with_stddev).aggregate_file(Path::new(log))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        ("plot", Some(args)) => plot(&opt.config, args),
        ("node-ids", Some(args)) => {
            let nodes_file = args.value_of("NODES_FILE").unwrap_or_default();
            let output = args.value_of("output").unwrap_or("node_ids.txt");
            let ids: String = read_deployment(Path::new(nodes_file))?
                .iter()
                .map(|n| format!("{}\n", n.id))
                .collect();
            fs::write(output, ids)?;
            println!("wrote node ids to {}", output);
            Ok(())
        }
        (name, Some(args)) => {
            let ctx = opt.context()?;
            let client = HttpNodeClient::new(ctx.config.timeout())?;
            info!("dht-bench {} against {} nodes", env!("CARGO_PKG_VERSION"), ctx.nodes.len());
            run_against_cluster(name, args, &ctx, client)?;
            let counters = ctx.counters.snapshot();
            println!(
                "{} operations: {} ok, {} unreachable, {} error status, {} wrong values",
                counters.operations,
                counters.successes,
                counters.transport_failures,
                counters.application_failures,
                counters.correctness_failures
            );
            if ctx.cancel.is_cancelled() {
                println!("the run was cancelled before it completed");
            }
            Ok(())
        }
        _ => Err(BenchError::Parsing("unknown command received".to_string())),
    }
}

fn run_against_cluster(
    name: &str,
    args: &ArgMatches,
    ctx: &BenchmarkContext,
    client: HttpNodeClient,
) -> Result<()> {
    match name {
        "check" => {
            let report = WorkloadBenchmark::new(client).check_liveness(ctx);
            for (node, reason) in &report.failed {
                println!("\u{2716} {}: {}", node, reason);
            }
            print_verdict(report.all_alive());
        }
        "join-all" => {
            let report = MembershipController::new(client).join_all(&ctx.nodes, ctx);
            print_batch("join-all", &report);
        }
        "leave-all" => {
            let report = MembershipController::new(client).leave_all(&ctx.nodes, ctx);
            print_batch("leave-all", &report);
        }
        "join-leave" => {
            let (report, path) = TimedRunner::new(client).run_growth(ctx)?;
            println!(
                "{} iterations over {} nodes written to {}",
                report.iterations.len(),
                report.cluster_size,
                path.display()
            );
        }
        "workload" => {
            let keys = random_keys(ctx.config.key_count);
            let mut logger = SampleLogger::new(ctx.output.clone());
            let report = WorkloadBenchmark::new(client).run(ctx, &keys, ctx.config.passes, &mut logger)?;
            for pass in report.put_passes.iter().chain(report.get_passes.iter()) {
                println!(
                    "{:?} pass: {} requests, {} failed, {} wrong values, {:.2} seconds",
                    pass.kind,
                    pass.operations,
                    pass.http_failures,
                    pass.correctness_failures,
                    pass.elapsed.as_secs_f64()
                );
            }
            print_verdict(!report.failed());
        }
        "probe" => {
            let report = TimedRunner::new(client).probe(ctx, args.is_present("crash"))?;
            for check in &report.checks {
                match &check.outcome {
                    ProbeOutcome::Passed => {
                        println!("\u{2714} {} {} from {}", check.stage, check.key, check.node)
                    }
                    outcome => println!(
                        "\u{2716} {} {} from {}: {:?}",
                        check.stage, check.key, check.node, outcome
                    ),
                }
            }
            print_verdict(report.passed());
        }
        other => return Err(BenchError::Parsing(format!("unknown command {}", other))),
    }
    Ok(())
}

/// aggregates the PUT and GET logs and renders them
fn plot(config: &BenchConfig, args: &ArgMatches) -> Result<()> {
    let output = dhtbench::OutputPaths::new(&config.output_dir);
    let put_log = args.value_of("put").map(PathBuf::from).unwrap_or_else(|| output.put_log());
    let get_log = args.value_of("get").map(PathBuf::from).unwrap_or_else(|| output.get_log());
    for log in &[&put_log, &get_log] {
        if !log.exists() {
            return Err(BenchError::Parsing(format!("'{}' not found.", log.display())));
        }
    }

    let aggregator = Aggregator::new(config.with_stddev);
    let put = aggregator.aggregate_file(&put_log)?;
    println!("PUT times: {}", serde_json::to_string(&put)?);
    let get = aggregator.aggregate_file(&get_log)?;
    println!("GET times: {}", serde_json::to_string(&get)?);

    let target = args
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| output.file(&config.plot_file));
    SvgPlotRenderer::default().render(&put, &get, &target)?;
    println!("wrote {}", target.display());
    Ok(())
}

fn print_batch(what: &str, report: &BatchReport) {
    println!("{}: {}/{} succeeded", what, report.succeeded, report.attempted);
    for (node, reason) in &report.failed {
        println!("\u{2716} {}: {}", node, reason);
    }
}

fn print_verdict(success: bool) {
    if success {
        println!("Success!");
    } else {
        println!("Failure");
    }
}

/// parses the value of argument `name`, if present
fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    matches
        .value_of(name)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| BenchError::Parsing(format!("invalid value '{}' for --{}", v, name)))
        })
        .transpose()
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // spans/events at `level` and above are written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
