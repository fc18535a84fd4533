use crate::build_number::{next_from_registry_snapshot, BuildIdentifier, RefMatcher};
use crate::config::{Config, RegistryInputs};
use crate::date_key::DateKey;
use crate::error::SyncError;
use crate::registry::{RegistryEntry, TagRegistry};
use crate::state::{load_build_number, save_build_number};
use crate::workflow::WorkflowCommands;
use std::io::Write;

/// How a run arrived at its build number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An earlier job of this workflow run already minted it
    Cached(String),
    /// Freshly derived from the registry
    Fresh {
        build_number: String,
        identifier: BuildIdentifier,
    },
}

impl RunOutcome {
    pub fn build_number(&self) -> &str {
        match self {
            Self::Cached(build_number) => build_number,
            Self::Fresh { build_number, .. } => build_number,
        }
    }
}

/// Drives a single run: reuse the cached build number when there is
/// one, otherwise derive the next one from the registry, publish it,
/// remember it for later jobs and tag the commit with it.
pub struct Synchronizer<'a> {
    config: &'a Config,
    commands: WorkflowCommands,
}

impl<'a> Synchronizer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            commands: WorkflowCommands::new(config),
        }
    }

    /// `connect` is only invoked once the registry inputs are known
    /// to be present, and not at all when a cached value is used.
    pub async fn run<R, F, W>(
        &self,
        today: DateKey,
        connect: F,
        out: &mut W,
    ) -> anyhow::Result<RunOutcome>
    where
        R: TagRegistry,
        F: FnOnce(&RegistryInputs<'_>) -> anyhow::Result<R>,
        W: Write,
    {
        if let Some(cached) = load_build_number(&self.config.state_path)? {
            log::info!(
                "Build number already generated in earlier jobs, using build number {cached}..."
            );
            self.commands.publish_build_number(&cached, out)?;
            return Ok(RunOutcome::Cached(cached));
        }

        let inputs = self.config.registry_inputs()?;
        let registry = connect(&inputs)?;

        let identifier = self.compute(&registry, today).await?;
        let build_number = self.config.tag_name(&identifier);
        log::info!("Updating build counter to {build_number}...");

        self.commands.publish_build_number(&build_number, out)?;

        if let Err(err) = save_build_number(&self.config.state_path, &build_number) {
            log::warn!("Failed to save build number for later jobs: {err:#}");
        }

        let entry = RegistryEntry::tag(&build_number, inputs.commit_sha);
        if self.config.dry_run {
            log::info!("would have tagged {} as {}", entry.sha, entry.git_ref);
        } else {
            registry.create_tag(&entry).await?;
            log::info!("Successfully updated build number to {build_number}");
        }

        Ok(RunOutcome::Fresh {
            build_number,
            identifier,
        })
    }

    async fn compute<R: TagRegistry>(
        &self,
        registry: &R,
        today: DateKey,
    ) -> anyhow::Result<BuildIdentifier> {
        let tag_prefix = self.config.tag_prefix();
        let matcher = RefMatcher::new(&tag_prefix, today)?;
        let namespace = format!("{tag_prefix}{today}");

        let entries = registry.list_tags(&namespace).await?;
        if !entries.is_empty() && matcher.counters(&entries).next().is_none() {
            return Err(SyncError::MalformedResponse {
                url: namespace,
                reason: format!(
                    "none of the {} refs returned look like build numbers",
                    entries.len()
                ),
            }
            .into());
        }

        let next = next_from_registry_snapshot(&entries, &matcher).map_err(|err| {
            SyncError::MalformedResponse {
                url: namespace,
                reason: err.to_string(),
            }
        })?;
        Ok(next)
    }
}
