use {
    clap::{Parser, Subcommand},
    filegate_server::{config::Config, storage::Storage},
    sha2::{Digest, Sha256},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Prints the `password_hash` config value for a password.
    HashPassword { password: String },
    /// Prints a random secret usable as `envelope_secret` or `jwt_secret`.
    GenerateSecret,
    /// Parses the config and opens the storage it points to.
    CheckConfig {
        #[clap(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::HashPassword { password } => {
            println!("{}", hex::encode(Sha256::digest(password.as_bytes())));
        }
        Command::GenerateSecret => {
            println!("{}", hex::encode(rand::random::<[u8; 32]>()));
        }
        Command::CheckConfig { config } => {
            let config = Config::parse(&config)?;
            Storage::new(config.storage_path.clone(), config.max_file_size.as_u64())?;
            println!("{config:#?}");
            if config.envelope_secret.is_none() {
                println!("Warning: no envelope secret, encrypted transport is disabled.");
            }
            if config.password_hash.is_none() {
                println!("Warning: no password hash, the development password is accepted.");
            }
            println!("Config is valid.");
        }
    }
    Ok(())
}
