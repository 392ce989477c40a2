use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use leaseflow::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "leaseflow",
    about = "Run the rental application and lease workflow service from the command line",
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
    /// Walk a sample portfolio through the application and lease workflows
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Organization the service acts for
    #[arg(long, default_value = "org-cedar")]
    pub(crate) organization: String,
    /// User id recorded on audit entries
    #[arg(long, default_value = "leasing-api")]
    pub(crate) actor: String,
    /// Load a starter portfolio of properties and prospects
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            organization: "org-cedar".to_string(),
            actor: "leasing-api".to_string(),
            seed_demo: false,
        }
    }
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
