use crate::infra::list_stored_forms;
use crate::server;
use clap::{Args, Parser, Subcommand};
use intake_forms::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "intake-api",
    about = "Serve and inspect patient intake form submissions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect stored intake forms
    Forms {
        #[command(subcommand)]
        command: FormsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FormsCommand {
    /// Print every stored form as one JSON document per line
    List,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Forms {
            command: FormsCommand::List,
        } => {
            for line in list_stored_forms().await? {
                println!("{line}");
            }
            Ok(())
        }
    }
}
