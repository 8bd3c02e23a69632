// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! pipy - Containerized Python Environments CLI

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::{Parser, Subcommand};
use miette::Result;

mod cmd_check;
mod cmd_close;
mod cmd_init;
mod cmd_install;
mod cmd_lock;
mod cmd_open;
mod cmd_run;
mod cmd_show;

use cmd_check::CmdCheck;
use cmd_close::CmdClose;
use cmd_init::CmdInit;
use cmd_install::{CmdInstall, CmdSync};
use cmd_lock::CmdLock;
use cmd_open::CmdOpen;
use cmd_run::CmdRun;
use cmd_show::CmdShow;

/// Exit status after an interrupt.
const INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[clap(
    name = "pipy",
    about = "Containerized Python Environments",
    version,
    long_about = "Run a Python project in per-version containers and lock its environments"
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    /// Project file declaring the [tool.pipy] table
    #[clap(short, long, global = true, default_value = pipy::PYPROJECT_FILENAME, env = "PIPY_FILE")]
    file: PathBuf,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Parser)]
struct Logging {
    /// Increase verbosity (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Add a [tool.pipy] table to pyproject.toml
    Init(CmdInit),

    /// Display declared environments and their locked pins
    Show(CmdShow),

    /// Enter an interactive shell in the session for a version
    Open(CmdOpen),

    /// Remove the session for a version
    Close(CmdClose),

    /// Run an alias inside the session for a version
    Run(CmdRun),

    /// Generate the lock file
    Lock(CmdLock),

    /// Verify the lock file matches the declarations
    Check(CmdCheck),

    /// Install locked packages into a throwaway session
    Install(CmdInstall),

    /// Install locked packages into a fresh persistent session
    Sync(CmdSync),
}

impl Command {
    async fn run(self, ctx: &Context) -> Result<i32> {
        match self {
            Command::Init(mut cmd) => cmd.run(ctx).await,
            Command::Show(mut cmd) => cmd.run(ctx).await,
            Command::Open(mut cmd) => cmd.run(ctx).await,
            Command::Close(mut cmd) => cmd.run(ctx).await,
            Command::Run(mut cmd) => cmd.run(ctx).await,
            Command::Lock(mut cmd) => cmd.run(ctx).await,
            Command::Check(mut cmd) => cmd.run(ctx).await,
            Command::Install(mut cmd) => cmd.run(ctx).await,
            Command::Sync(mut cmd) => cmd.run(ctx).await,
        }
    }
}

/// State shared by every command.
pub struct Context {
    pub file: PathBuf,
    pub config: pipy::Config,
    sessions: OnceLock<pipy::SessionManager>,
}

impl Context {
    fn new(file: PathBuf, config: pipy::Config) -> Self {
        Self {
            file,
            config,
            sessions: OnceLock::new(),
        }
    }

    /// Load the project declaration from the selected file.
    pub fn project(&self) -> Result<pipy::ProjectSpec> {
        Ok(pipy::ProjectSpec::load(&self.file)?)
    }

    /// Path of the lock file for `project`.
    pub fn lock_path(&self, project: &pipy::ProjectSpec) -> Result<PathBuf> {
        Ok(self.config.lock_path(&project.root()?))
    }

    /// Session manager for `project`, checking the container runtime on first use.
    pub fn sessions(&self, project: &pipy::ProjectSpec) -> Result<&pipy::SessionManager> {
        if let Some(sessions) = self.sessions.get() {
            return Ok(sessions);
        }
        let manager = pipy::SessionManager::new(
            Arc::new(pipy::SystemExecutor),
            self.config.clone(),
            project.root()?,
        );
        manager.check_runtime()?;
        Ok(self.sessions.get_or_init(|| manager))
    }

    /// Tear down throwaway sessions a failed or cancelled command left behind.
    async fn cleanup(&self) {
        if let Some(sessions) = self.sessions.get() {
            let outstanding = sessions.outstanding();
            if !outstanding.is_empty() {
                tracing::warn!("Removing {} leftover session(s)", outstanding.len());
            }
            sessions.release_all().await;
        }
    }
}

impl Opt {
    async fn run(self) -> Result<i32> {
        // Setup logging
        let log_level = match (self.logging.quiet, self.logging.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::WARN,
            (false, 1) => tracing::Level::INFO,
            (false, 2) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .init();

        let config = pipy::Config::load()?;
        let ctx = Context::new(self.file, config);

        tokio::select! {
            code = self.cmd.run(&ctx) => {
                if code.is_err() {
                    ctx.cleanup().await;
                }
                code
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted");
                ctx.cleanup().await;
                Ok(INTERRUPTED)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run().await?;
    std::process::exit(code);
}
