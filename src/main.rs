use anyhow::Context;
use owo_colors::OwoColorize;
use swarm::cli::{output::Output, Cli};
use swarm::utils::toml_config::SwarmConfig;
use swarm::ResearchPipeline;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match run(&cli, &output).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if cli.no_color {
                eprintln!("Error: {:#}", e);
            } else {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            }
            std::process::exit(2);
        }
    }
}

/// Returns whether the session reached DONE.
async fn run(cli: &Cli, output: &Output) -> anyhow::Result<bool> {
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose, cli.log_json)?;

    let question = cli
        .resolve_question()
        .with_context(|| format!("failed to read question from {:?}", cli.file))?;
    if question.is_empty() {
        anyhow::bail!("the research question is empty");
    }

    let mut config = SwarmConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config
        .apply_env_overrides()
        .context("invalid environment override")?;
    cli.apply_to(&mut config);
    config.validate().context("invalid configuration")?;

    let pipeline = ResearchPipeline::from_config(&config).await;
    match pipeline.run(&question).await {
        Ok(run) => {
            output.artifact(&run.artifact.path);
            Ok(true)
        }
        Err(failure) => {
            match &failure.session.failure {
                Some(record) => output.failure(record),
                None => output.error(&failure.error.to_string()),
            }
            Ok(false)
        }
    }
}

fn init_tracing(verbose: bool, json: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}
