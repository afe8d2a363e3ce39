/// edgekit
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{debug, error};
use thiserror::Error;
use tokio::sync::watch;

use crate::deploy::Deployment;
use crate::prompt::StdPrompter;

mod aws;
mod certificate;
mod config;
mod deploy;
mod init;
mod naming;
mod pipeline;
mod poll;
mod prompt;
mod provision;

/// Deploy a static website to a CDN-fronted hosting setup in your own cloud
/// account.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Root of the website project.
    #[arg(default_value = ".")]
    project_directory: PathBuf,

    /// Directory holding the bundled infrastructure templates.
    /// Defaults to $EDGEKIT_HOME, then ~/.edgekit.
    #[arg(long)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Set up the hosting configuration for this project.
    Init {
        /// Deploy from an archive in a storage bucket instead of a GitHub repository.
        #[arg(long)]
        s3: bool,
    },
    /// Create or update the hosting infrastructure and publish the site.
    Deploy,
    /// Print the hosting configuration and the live site URL.
    Show,
    /// Print the current state of the deployment pipeline.
    Status,
    /// Tear down all hosting infrastructure for this project.
    Delete,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error("init: {0}")]
    Init(#[from] init::Error),

    #[error("deploy: {0}")]
    Deploy(#[from] deploy::Error),
}

impl Cli {
    /// Install directory of the bundled CDK app: `--home`, then
    /// $EDGEKIT_HOME, then `~/.edgekit`.
    fn home(&self) -> PathBuf {
        if let Some(home) = &self.home {
            return home.clone();
        }
        if let Some(home) = std::env::var_os("EDGEKIT_HOME") {
            return PathBuf::from(home);
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".edgekit")
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err.to_string());
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::init();

    let args = Cli::parse();
    let project_dir = args.project_directory.clone();

    match &args.command {
        Commands::Init { s3 } => {
            init::run(&project_dir, *s3, &StdPrompter)?;
            println!("Configuration written. Run 'edgekit deploy' to publish the site.");
            Ok(())
        }
        Commands::Deploy => {
            let hosting = config::load(&project_dir)?;
            let cloud = aws::Aws::new().await;
            let backend = provision::default_backend(&args.home(), &project_dir);

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupt received, winding down");
                    cancel_tx.send(true).ok();
                }
            });

            Deployment::new(&hosting, project_dir, &cloud, &backend, &StdPrompter)
                .with_cancel(cancel_rx)
                .run()
                .await?;
            Ok(())
        }
        Commands::Show => {
            let hosting = config::load(&project_dir)?;
            let cloud = aws::Aws::new().await;
            let backend = provision::default_backend(&args.home(), &project_dir);

            Deployment::new(&hosting, project_dir, &cloud, &backend, &StdPrompter)
                .show()
                .await?;
            Ok(())
        }
        Commands::Status => {
            let hosting = config::load(&project_dir)?;
            let cloud = aws::Aws::new().await;
            let backend = provision::default_backend(&args.home(), &project_dir);

            Deployment::new(&hosting, project_dir, &cloud, &backend, &StdPrompter)
                .status()
                .await?;
            Ok(())
        }
        Commands::Delete => {
            let hosting = config::load(&project_dir)?;
            let cloud = aws::Aws::new().await;
            let backend = provision::default_backend(&args.home(), &project_dir);

            Deployment::new(&hosting, project_dir, &cloud, &backend, &StdPrompter)
                .destroy()
                .await?;
            Ok(())
        }
    }
}
