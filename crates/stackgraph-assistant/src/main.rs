use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use stackgraph_assistant::{synthesize, IngressMode, StackManifest, SynthesisConfig};
use stackgraph_kernel::types::RemovalPolicy;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_name("FILE")
        .help("TOML configuration file")
}

fn cli() -> Command {
    Command::new("stackgraph")
        .version(stackgraph_kernel::VERSION)
        .about("Synthesize the serverless LLM assistant deployment plan")
        .subcommand_required(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG is set"),
        )
        .subcommand(
            Command::new("synth")
                .about("Write the JSON plan")
                .arg(config_arg())
                .arg(Arg::new("region").long("region").help("Bedrock region"))
                .arg(Arg::new("model-id").long("model-id").help("LLM model identifier"))
                .arg(
                    Arg::new("retain")
                        .long("retain")
                        .action(ArgAction::SetTrue)
                        .help("Retain resources on stack deletion"),
                )
                .arg(
                    Arg::new("ingress")
                        .long("ingress")
                        .value_parser(["restricted", "open"])
                        .help("Database ingress mode"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_name("FILE")
                        .help("Write the plan here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about("List every grant and flag low-trust edges")
                .arg(config_arg())
                .arg(
                    Arg::new("deny-open-ingress")
                        .long("deny-open-ingress")
                        .action(ArgAction::SetTrue)
                        .help("Exit with status 1 if any low-trust edge exists"),
                ),
        )
        .subcommand(
            Command::new("outputs")
                .about("Print the output map")
                .arg(config_arg()),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if matches.get_flag("json-logs") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<SynthesisConfig> {
    match args.get_one::<String>("config") {
        Some(path) => SynthesisConfig::from_file(path)
            .with_context(|| format!("loading configuration from {path}")),
        None => Ok(SynthesisConfig::default()),
    }
}

fn apply_overrides(
    mut config: SynthesisConfig,
    args: &ArgMatches,
) -> anyhow::Result<SynthesisConfig> {
    if let Some(region) = args.get_one::<String>("region") {
        config = config.with_region(region);
    }
    if let Some(model) = args.get_one::<String>("model-id") {
        config = config.with_model_identifier(model);
    }
    if args.get_flag("retain") {
        config = config.with_removal_policy(RemovalPolicy::Retain);
    }
    match args.get_one::<String>("ingress").map(String::as_str) {
        Some("restricted") => config = config.with_ingress_mode(IngressMode::Restricted),
        Some("open") => config = config.with_ingress_mode(IngressMode::OpenForDevelopment),
        _ => {}
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_synth(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = apply_overrides(load_config(args)?, args)?;
    let graph = synthesize(&config).with_context(|| format!("synthesizing {}", config.stack_name))?;
    let plan = StackManifest::new(&config, &graph).to_json()?;

    match args.get_one::<String>("out") {
        Some(path) => {
            std::fs::write(path, plan).with_context(|| format!("writing plan to {path}"))?;
            tracing::info!(path = %path, digest = %graph.digest(), "plan written");
        }
        None => println!("{plan}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_audit(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = load_config(args)?;
    let graph = synthesize(&config)?;

    for edge in graph.grants() {
        let marker = if edge.is_low_trust() { "  [LOW TRUST]" } else { "" };
        println!(
            "{} -{:?}-> {} {:?}{marker}",
            edge.subject, edge.capability, edge.target, edge.scope
        );
    }

    let low_trust = graph.low_trust_grants().count();
    println!("{} grants, {low_trust} low-trust", graph.grants().len());

    if low_trust > 0 && args.get_flag("deny-open-ingress") {
        tracing::error!(low_trust, "low-trust grants present");
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_outputs(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = load_config(args)?;
    let graph = synthesize(&config)?;

    for output in graph.outputs().iter() {
        println!("{} = {}", output.name, output.value.token());
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match matches.subcommand() {
        Some(("synth", args)) => run_synth(args),
        Some(("audit", args)) => run_audit(args),
        Some(("outputs", args)) => run_outputs(args),
        _ => Ok(ExitCode::from(2)),
    }
}
