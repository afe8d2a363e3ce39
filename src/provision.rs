use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use log::{debug, info};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("environment bootstrap failed with exit code {0}")]
    Bootstrap(ExitStatus),

    #[error("stack deployment failed with exit code {0}")]
    Deploy(ExitStatus),

    #[error("stack teardown failed with exit code {0}")]
    Destroy(ExitStatus),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Inputs the infrastructure templates resolve at synthesis time.
#[derive(Debug, Clone, Default)]
pub struct StackContext {
    /// Directory holding the hosting configuration file.
    pub config_dir: PathBuf,
    /// Certificate to attach to the distribution, when a domain is set up.
    pub certificate_arn: Option<String>,
}

/// Boundary to the infrastructure-as-code toolchain. The orchestrator only
/// ever names stacks and hands over context; template contents stay behind
/// this trait.
pub trait Provisioner {
    /// One-time preparation of the target account and region.
    fn bootstrap(&self) -> Result<(), Error>;

    /// Create or update a single stack. Idempotent on the toolchain side.
    fn deploy(&self, stack_name: &str, context: &StackContext) -> Result<(), Error>;

    /// Tear down every stack belonging to this project.
    fn destroy_all(&self, context: &StackContext) -> Result<(), Error>;
}

/// Provisioner shelling out to the CDK CLI in the bundled template project.
/// Tool output goes to a per-invocation log file, not the user's terminal.
pub struct CdkBackend {
    /// Directory containing the CDK app and its `cdk.json`.
    install_dir: PathBuf,
    log_dir: PathBuf,
}

impl CdkBackend {
    pub fn new(install_dir: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            install_dir,
            log_dir,
        }
    }

    fn run(&self, action: &str, args: &[&str], context: Option<&StackContext>) -> Result<ExitStatus, Error> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log_path = self
            .log_dir
            .join(format!("cdk-{action}-{}.log", chrono::Utc::now().format("%Y%m%d-%H%M%S")));
        let log_file = File::create(&log_path)?;
        info!("running cdk {action}, output in {}", log_path.display());

        let mut command = std::process::Command::new("npx");
        command
            .arg("cdk")
            .args(args)
            .current_dir(&self.install_dir)
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file));
        if let Some(context) = context {
            command
                .arg("--context")
                .arg(format!("config-path={}", context.config_dir.display()));
            if let Some(arn) = &context.certificate_arn {
                command.arg("--context").arg(format!("certificate-arn={arn}"));
            }
        }

        debug!("cdk command: {command:?}");
        Ok(command.status()?)
    }
}

impl Provisioner for CdkBackend {
    fn bootstrap(&self) -> Result<(), Error> {
        let status = self.run("bootstrap", &["bootstrap"], None)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Bootstrap(status))
        }
    }

    fn deploy(&self, stack_name: &str, context: &StackContext) -> Result<(), Error> {
        let status = self.run(
            "deploy",
            &["deploy", stack_name, "--require-approval", "never"],
            Some(context),
        )?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Deploy(status))
        }
    }

    fn destroy_all(&self, context: &StackContext) -> Result<(), Error> {
        let status = self.run("destroy", &["destroy", "--all", "--force"], Some(context))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Destroy(status))
        }
    }
}

/// Default locations relative to the tool's home directory.
pub fn default_backend(home: &Path, project_dir: &Path) -> CdkBackend {
    CdkBackend::new(
        home.join("cdk"),
        project_dir.join(crate::config::TOOL_DIR_NAME).join("logs"),
    )
}
