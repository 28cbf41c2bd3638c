use std::path::Path;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use capsup::{
    cli::{Cli, Commands, parse_args},
    command::CaptureCommand,
    config::load_config,
    constants::exit_codes,
    error::CaptureError,
    signal::ShutdownFlag,
    supervisor::Supervisor,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    let result = match args.command {
        Commands::Run { config } => run_supervisor(&config),
        Commands::Plan { config, json } => print_plan(&config, json),
    };

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_supervisor(config_path: &Path) -> Result<(), CaptureError> {
    let settings = load_config(config_path)?.settings;
    settings.preflight()?;

    let shutdown = ShutdownFlag::install()?;
    info!(
        "Supervising captures on [{}] into {}",
        settings.interfaces.join(", "),
        settings.output_dir.display()
    );

    let mut supervisor = Supervisor::new(settings);
    supervisor.run(&shutdown)?;
    info!("capsup stopped");
    Ok(())
}

fn print_plan(config_path: &Path, json: bool) -> Result<(), CaptureError> {
    let settings = load_config(config_path)?.settings;
    let commands: Vec<CaptureCommand> = settings
        .interfaces
        .iter()
        .map(|iface| CaptureCommand::build(iface, &settings))
        .collect();

    if json {
        let rendered = serde_json::to_string_pretty(&commands)
            .map_err(|err| CaptureError::InvalidConfig(err.to_string()))?;
        println!("{rendered}");
    } else {
        for command in &commands {
            println!("{command}");
        }
    }

    Ok(())
}
