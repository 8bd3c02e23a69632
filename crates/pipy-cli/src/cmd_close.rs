// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy close` command.

use clap::Args;
use miette::Result;

use crate::Context;

/// Remove the session for a version
#[derive(Debug, Args)]
pub struct CmdClose {
    /// Interpreter version, e.g. 3.9
    version: String,
}

impl CmdClose {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let key = pipy::SessionKey::new(&project.name, &self.version);

        // closing never fails, there may be nothing to close
        let sessions = match ctx.sessions(&project) {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!("Cannot close {key}: {err}");
                return Ok(0);
            }
        };
        if let Err(err) = sessions
            .teardown(&key, pipy::Strictness::BestEffort)
            .await
        {
            tracing::warn!("Failed to close {key}: {err}");
        }
        Ok(0)
    }
}
