// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy open` command.

use clap::Args;
use miette::Result;

use crate::Context;

/// Enter an interactive shell in the session for a version
#[derive(Debug, Args)]
pub struct CmdOpen {
    /// Interpreter version, e.g. 3.9
    version: String,

    /// Shell to start instead of the configured one
    #[clap(long)]
    shell: Option<String>,
}

impl CmdOpen {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let sessions = ctx.sessions(&project)?;
        let shell = self.shell.as_deref().unwrap_or(&ctx.config.shell);

        let key = pipy::SessionKey::new(&project.name, &self.version);
        let lease = sessions.acquire(key, pipy::Lifetime::Suspend).await?;
        tracing::info!("Attaching to {}", lease.key());

        // the session is paused again once the shell exits
        let outcome = lease.attach(shell).await;
        Ok(lease.release_with(outcome).await?)
    }
}
