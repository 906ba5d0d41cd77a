use clap::Parser;
use tierline::cli::{
    handle_classify, handle_completions, handle_config_init, handle_models, handle_policies,
    handle_validate, load_config, Cli, Commands, ConfigCommands,
};
use tierline::config::TierlineConfig;
use tierline::logging::init_tracing;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = match &cli.command {
        Commands::Models(args) => {
            let config = setup(&cli, &args.config)?;
            let registry = config.build_registry()?;
            handle_models(args, &registry)?
        }
        Commands::Classify(args) => {
            let config = setup(&cli, &args.config)?;
            let registry = config.build_registry()?;
            handle_classify(args, &config.build_classifier(), &registry)?
        }
        Commands::Validate(args) => handle_validate(args)?,
        Commands::Policies(args) => {
            let config = setup(&cli, &args.config)?;
            let registry = config.build_registry()?;
            let policies = config.build_policies(&registry)?;
            handle_policies(args, &policies)?
        }
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(args)?,
        Commands::Completions(args) => {
            handle_completions(args, &mut std::io::stdout());
            return Ok(());
        }
    };

    println!("{}", output);
    Ok(())
}

/// Load config, apply the CLI log level, and install tracing.
fn setup(cli: &Cli, path: &std::path::Path) -> anyhow::Result<TierlineConfig> {
    let mut config = load_config(path)?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
    Ok(config)
}
