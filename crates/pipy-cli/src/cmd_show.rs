// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy show` command.

use clap::Args;
use colored::Colorize;
use miette::Result;

use crate::Context;

/// Display declared environments and their locked pins
#[derive(Debug, Args)]
pub struct CmdShow {
    /// Only show this environment
    environment: Option<String>,

    /// Show declared aliases
    #[clap(long)]
    aliases: bool,
}

impl CmdShow {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let project = ctx.project()?;
        let lock = match pipy::LockFile::load(ctx.lock_path(&project)?) {
            Ok(lock) => Some(lock),
            Err(pipy::Error::LockNotFound(_)) => None,
            Err(err) => return Err(err.into()),
        };

        println!("{} {}", "Project:".bold(), project.name.cyan());
        println!("{} {}", "Versions:".bold(), project.versions.join(", "));
        println!();

        let selected: Vec<&pipy::EnvironmentSpec> = match &self.environment {
            Some(name) => vec![project
                .environment(name)
                .ok_or_else(|| pipy::Error::LockMissingEnvironment(name.clone()))?],
            None => project.environments.iter().collect(),
        };

        for env in selected {
            let composed = pipy::compose_environment(&project, &env.name)?;
            self.show_environment(&project, &composed, lock.as_ref());
        }

        if self.aliases {
            self.show_aliases(&project);
        }

        Ok(0)
    }

    fn show_environment(
        &self,
        project: &pipy::ProjectSpec,
        composed: &pipy::ComposedEnvironment,
        lock: Option<&pipy::LockFile>,
    ) {
        let includes = composed.sources.get(1..).unwrap_or_default();
        let includes_marker = if includes.is_empty() {
            String::new()
        } else {
            format!(" [includes: {}]", includes.join(", "))
        };
        println!("{}{}", composed.name.green().bold(), includes_marker.blue());

        if composed.packages.is_empty() {
            println!("  {}", "(no packages)".dimmed());
        }
        for (i, package) in composed.packages.iter().enumerate() {
            println!("  {}. {}", i + 1, package);
        }

        let Some(lock) = lock else {
            println!();
            return;
        };
        for version in &project.versions {
            match lock.packages(&composed.name, version) {
                Ok(pins) => {
                    println!("  {} {}", "Python".bold(), version.yellow());
                    for pin in pins {
                        println!("    {}", pin.pin().cyan());
                    }
                }
                Err(_) => {
                    println!("  {} {} {}", "Python".bold(), version.yellow(), "(not locked)".dimmed());
                }
            }
        }
        println!();
    }

    fn show_aliases(&self, project: &pipy::ProjectSpec) {
        println!("{}", "Aliases:".bold());
        if project.aliases.is_empty() {
            println!("  {}", "(no aliases)".dimmed());
        }
        for alias in &project.aliases {
            println!("  {}", alias.name.cyan());
            for command in &alias.commands {
                println!("    {} {}", "$".dimmed(), command);
            }
        }
    }
}
