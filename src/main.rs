use clap::Parser;
use model_archiver::cli::{run, Cli};
use model_archiver::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
