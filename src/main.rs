use clap::Parser;
use fleece_rust::FleeceError;
use fleece_rust::cli::commands::{self, App};
use fleece_rust::cli::{Cli, Commands};
use fleece_rust::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Hint: {suggestion}");
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), FleeceError> {
    if let Commands::Init { force } = &cli.command {
        return commands::init(*force);
    }

    let app = App::open(
        cli.project.as_deref(),
        cli.remote.as_deref(),
        cli.branch.as_deref(),
    )?;
    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Create(args) => commands::create(&app, args, cli.json).await,
        Commands::Show { ids } => commands::show(&app, ids, cli.json).await,
        Commands::List(args) => commands::list(&app, &args, cli.json).await,
        Commands::Ready => commands::ready(&app, cli.json).await,
        Commands::Update(args) => commands::update(&app, args, cli.json).await,
        Commands::Delete { id } => commands::delete(&app, &id).await,
        Commands::Parent { command } => commands::parent(&app, command).await,
        Commands::Status => commands::status(&app, cli.json).await,
        Commands::Sync => commands::sync(&app, cli.json).await,
        Commands::Pull { full } => commands::pull(&app, full, cli.json).await,
        Commands::Stash => commands::stash(&app).await,
        Commands::Discard { all } => commands::discard(&app, all).await,
        Commands::Undo => commands::undo(&app).await,
        Commands::Redo => commands::redo(&app).await,
        Commands::History => commands::history(&app, cli.json).await,
    }
}
