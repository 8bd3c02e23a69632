// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy install` and `pipy sync` commands.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::Context;

/// Install locked packages into a throwaway session
#[derive(Debug, Args)]
pub struct CmdInstall {
    /// Environment to install
    environment: String,

    /// Interpreter version, e.g. 3.9
    version: String,
}

impl CmdInstall {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let lock = pipy::LockFile::load(ctx.lock_path(&project)?)?;
        let sessions = ctx.sessions(&project)?;

        pipy::install(sessions, &lock, &project.name, &self.environment, &self.version).await?;
        println!(
            "{} {} (Python {})",
            "Installed".green(),
            self.environment,
            self.version
        );
        Ok(0)
    }
}

/// Install locked packages into a fresh persistent session
#[derive(Debug, Args)]
pub struct CmdSync {
    /// Environment to sync
    environment: String,

    /// Interpreter version, e.g. 3.9
    version: String,
}

impl CmdSync {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let lock = pipy::LockFile::load(ctx.lock_path(&project)?)?;
        let sessions = ctx.sessions(&project)?;

        pipy::sync(sessions, &lock, &project.name, &self.environment, &self.version).await?;
        let key = pipy::SessionKey::new(&project.name, &self.version);
        println!("{} {} into {key}", "Synced".green(), self.environment);
        Ok(0)
    }
}
