// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Generate the lock file for a pipy project.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::Context;

/// Generate the lock file
///
/// Versions are locked one at a time unless `jobs` is raised in the
/// configuration or with PIPY_JOBS.
#[derive(Debug, Args)]
pub struct CmdLock {}

impl CmdLock {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let lock_path = ctx.lock_path(&project)?;

        // fail on bad declarations before checking for a runtime
        project.validate()?;
        let sessions = ctx.sessions(&project)?;

        let resolver = pipy::PypiHashResolver::new(&ctx.config)?;
        let lock = pipy::LockEngine::new(sessions, &resolver)
            .generate_lock(&project)
            .await?;

        // only a complete lock replaces the previous one
        lock.save(&lock_path)?;
        println!("{} {}", "Generated lock file:".green(), lock_path.display());

        Ok(0)
    }
}
