use async_trait::async_trait;
use clap::Subcommand;
use std::error::Error;
use std::fs;

pub mod cfg;
pub mod obfuscate;

#[derive(Subcommand)]
pub enum Cmd {
    /// Obfuscate JavaScript and print or write the result
    Obfuscate(obfuscate::ObfuscateArgs),

    /// Write the flattened block graphs as Graphviz DOT to stdout or a file
    Cfg(cfg::CfgArgs),
}

#[async_trait]
pub trait Command {
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Obfuscate(args) => args.execute().await,
            Cmd::Cfg(args) => args.execute().await,
        }
    }
}

/// Writes `text` to `path`, or to stdout when no path is given.
fn write_output(path: Option<&str>, text: &str) -> Result<(), Box<dyn Error>> {
    match path {
        Some(path) => fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}
