//! Key/value signaling to the surrounding workflow runner.
//!
//! Values are appended to the files named by `$GITHUB_OUTPUT` and
//! `$GITHUB_ENV` when the runner provides them. Older runners only
//! understand the `::set-output` and `::set-env` workflow commands
//! printed on stdout, which is what we fall back to.
use crate::config::Config;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const OUTPUT_NAME: &str = "build_number";
pub const ENV_NAME: &str = "BUILD_NUMBER";

/// Escapes the message portion of a workflow command
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

/// The annotation that marks a run as failed in the workflow log
pub fn error_annotation(message: &str) -> String {
    format!("::error::{}", escape_data(message))
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowCommands {
    output_file: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

impl WorkflowCommands {
    pub fn new(config: &Config) -> Self {
        Self {
            output_file: config.github_output.clone(),
            env_file: config.github_env.clone(),
        }
    }

    pub fn set_output<W: Write>(&self, name: &str, value: &str, out: &mut W) -> anyhow::Result<()> {
        match &self.output_file {
            Some(path) => append_key_value(path, name, value),
            None => {
                writeln!(
                    out,
                    "::set-output name={}::{}",
                    escape_property(name),
                    escape_data(value)
                )?;
                Ok(())
            }
        }
    }

    pub fn export_variable<W: Write>(
        &self,
        name: &str,
        value: &str,
        out: &mut W,
    ) -> anyhow::Result<()> {
        match &self.env_file {
            Some(path) => append_key_value(path, name, value),
            None => {
                writeln!(
                    out,
                    "::set-env name={}::{}",
                    escape_property(name),
                    escape_data(value)
                )?;
                Ok(())
            }
        }
    }

    /// Publishes the build number through both channels
    pub fn publish_build_number<W: Write>(&self, value: &str, out: &mut W) -> anyhow::Result<()> {
        self.export_variable(ENV_NAME, value, out)?;
        self.set_output(OUTPUT_NAME, value, out)?;
        Ok(())
    }
}

fn append_key_value(path: &Path, name: &str, value: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        !value.contains('\n') && !value.contains('\r'),
        "refusing to write multi-line value for {name} to {}",
        path.display()
    );

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{name}={value}").with_context(|| format!("writing to {}", path.display()))?;
    Ok(())
}
