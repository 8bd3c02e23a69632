// Copyright (c) Contributors to the pipy project.
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the `pipy init` command.

use std::io::Write;

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::Context;

#[cfg(test)]
#[path = "./cmd_init_test.rs"]
mod cmd_init_test;

/// Add a [tool.pipy] table to pyproject.toml
#[derive(Debug, Args)]
pub struct CmdInit {
    /// Project name, defaults to the directory name
    #[clap(long)]
    name: Option<String>,

    /// Supported interpreter version (repeatable)
    #[clap(long = "python", default_value = "3.9")]
    versions: Vec<String>,

    /// Package for the base environment (repeatable)
    #[clap(long = "package")]
    packages: Vec<String>,
}

impl CmdInit {
    pub async fn run(&mut self, ctx: &Context) -> Result<i32> {
        let path = &ctx.file;
        let existing = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err).into_diagnostic(),
        };

        if existing.lines().any(|line| line.trim() == "[tool.pipy]") {
            return Err(miette::miette!(
                "{} already has a [tool.pipy] table",
                path.display()
            ));
        }

        let name = match &self.name {
            Some(name) => name.clone(),
            None => self.default_name(ctx)?,
        };
        let mut content = String::new();
        if !existing.is_empty() && !existing.ends_with("\n\n") {
            content.push('\n');
        }
        content.push_str(&self.template(&name));

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .into_diagnostic()?;
        file.write_all(content.as_bytes()).into_diagnostic()?;

        println!("Added [tool.pipy] to {}", path.display());
        println!();
        println!("Next steps:");
        println!("  1. Edit the environments and the setup alias");
        println!("  2. Run 'pipy lock' to pin every environment");
        if let Some(version) = self.versions.first() {
            println!("  3. Run 'pipy sync base {version}' to build a session");
        }

        Ok(0)
    }

    fn default_name(&self, ctx: &Context) -> Result<String> {
        let parent = ctx
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let dir = std::fs::canonicalize(parent).into_diagnostic()?;
        dir.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| miette::miette!("Cannot derive a project name, pass --name"))
    }

    fn template(&self, name: &str) -> String {
        let quoted = |items: &[String]| {
            items
                .iter()
                .map(|item| toml_string(item))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "[tool.pipy]\n\
            name = {}\n\
            versions = [{}]\n\
            \n\
            [[tool.pipy.environments]]\n\
            name = \"base\"\n\
            packages = [{}]\n\
            \n\
            # [[tool.pipy.environments]]\n\
            # name = \"test\"\n\
            # packages = [\"pytest\"]\n\
            # includes = [\"base\"]\n\
            \n\
            [[tool.pipy.aliases]]\n\
            name = \"setup\"\n\
            commands = [\"python -m pip install -e .\"]\n",
            toml_string(name),
            quoted(&self.versions),
            quoted(&self.packages),
        )
    }
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
