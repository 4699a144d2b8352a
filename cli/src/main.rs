mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scriptjobs=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ArgParser::parse();
    let client = ClientCli::open(&args.config()).await?;

    match args.sub_command {
        SubCommand::Submit { file, name, run } => {
            client.submit_job(&file, name.as_deref(), run).await?;
        }
        SubCommand::Run { name } => {
            client.run_job(&name).await?;
        }
        SubCommand::Delete { name } => {
            client.delete_job(&name).await?;
        }
        SubCommand::List => {
            client.list_history().await;
        }
    }

    Ok(())
}
