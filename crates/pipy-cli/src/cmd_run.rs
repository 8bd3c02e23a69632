// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy run` command.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::Context;

/// Run an alias inside the session for a version
#[derive(Debug, Args)]
pub struct CmdRun {
    /// Alias declared in [[tool.pipy.aliases]]
    alias: String,

    /// Interpreter version, e.g. 3.9
    version: String,
}

impl CmdRun {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let alias = project
            .alias(&self.alias)
            .ok_or_else(|| pipy::Error::UnknownAlias(self.alias.clone()))?;
        let sessions = ctx.sessions(&project)?;

        let key = pipy::SessionKey::new(&project.name, &self.version);
        let lease = sessions.acquire(key, pipy::Lifetime::Suspend).await?;

        let mut outcome = Ok(0);
        for command in &alias.commands {
            println!("{} {}", "$".dimmed(), command.cyan());
            outcome = lease.run(command).await;
            if !matches!(outcome, Ok(0)) {
                break;
            }
        }
        Ok(lease.release_with(outcome).await?)
    }
}
