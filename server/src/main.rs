use {
    clap::Parser,
    filegate_server::{config::Config, run, util::setup_logger},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
#[clap(about = "HTTP gateway over a file store")]
pub struct Cli {
    /// Path to the JSON5 config file.
    #[clap(long)]
    pub config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::parse(&cli.config)?;
    setup_logger(config.log_file.as_deref(), &config.log_filter)?;
    run(config).await
}
