// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Verify that the lock file covers the current declarations.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::Context;

/// Exit status when no lock file exists.
const NO_LOCK: i32 = 2;

/// Verify the lock file matches the declarations
#[derive(Debug, Args)]
pub struct CmdCheck {
    /// Treat a missing lock file as an error
    #[clap(long)]
    strict: bool,
}

impl CmdCheck {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let lock_path = ctx.lock_path(&project)?;

        let lock = match pipy::LockFile::load(&lock_path) {
            Ok(lock) => lock,
            Err(err @ pipy::Error::LockNotFound(_)) if self.strict => return Err(err.into()),
            Err(pipy::Error::LockNotFound(_)) => {
                println!("{} No lock file found", "Warning:".yellow());
                return Ok(NO_LOCK);
            }
            Err(err) => return Err(err.into()),
        };

        let changes = pipy::verify_lock(&lock, &project)?;
        if changes.is_empty() {
            println!("{} Lock file is up to date", "✓".green());
            return Ok(0);
        }

        eprintln!("{}", "Lock file differs from declarations:".red());
        for change in &changes {
            match change.kind {
                pipy::LockChangeKind::PackageMissing => {
                    eprintln!(
                        "  - Package '{}' is not locked for {} (Python {})",
                        change.package.as_deref().unwrap_or_default(),
                        change.environment,
                        change.version.as_deref().unwrap_or_default()
                    );
                }
                _ => eprintln!("  - {change}"),
            }
        }
        eprintln!("\nRun 'pipy lock' to update the lock file");

        Ok(1)
    }
}
