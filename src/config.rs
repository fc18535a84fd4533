use crate::build_number::BuildIdentifier;
use crate::error::SyncError;
use crate::registry::DEFAULT_API_URL;
use std::path::PathBuf;

pub const DEFAULT_STATE_PATH: &str = "BUILD_NUMBER/BUILD_NUMBER";

/// Inputs are normally supplied by the pipeline through the
/// environment; each may also be passed on the command line.
#[derive(clap::Parser, Debug, Default)]
#[command(version = crate::version_info::tool_version(), about)]
pub struct ActionArguments {
    /// Token used to authenticate against the GitHub API.
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// The repository to tag, in owner/name form.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// The commit that the new build number tag points at.
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: Option<String>,

    /// Prepended (followed by a dash) to every build number.
    #[arg(long, env = "INPUT_PREFIX")]
    pub prefix: Option<String>,

    #[arg(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,

    /// Where the build number is cached for later jobs of the
    /// same workflow run.
    #[arg(long, env = "INPUT_STATE_PATH")]
    pub state_path: Option<String>,

    /// Compute and publish the build number, but don't create the tag.
    #[arg(
        long,
        env = "INPUT_DRY_RUN",
        value_parser = parse_flag,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub dry_run: Option<bool>,

    #[arg(long, env = "GITHUB_OUTPUT")]
    pub github_output: Option<String>,

    #[arg(long, env = "GITHUB_ENV")]
    pub github_env: Option<String>,
}

/// Accepts the usual spellings of a boolean action input.
/// An empty value is the runner's way of saying "not specified".
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        other => Err(format!("expected true or false, got {other:?}")),
    }
}

/// Unset and empty inputs are equivalent; the runner passes
/// unspecified action inputs as empty strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The configuration for a run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: Option<String>,
    pub repository: Option<String>,
    pub commit_sha: Option<String>,
    pub prefix: Option<String>,
    pub api_url: String,
    pub state_path: PathBuf,
    pub dry_run: bool,
    pub github_output: Option<PathBuf>,
    pub github_env: Option<PathBuf>,
}

/// The inputs needed to talk to the registry
#[derive(Debug, Clone, Copy)]
pub struct RegistryInputs<'a> {
    pub token: &'a str,
    pub repository: &'a str,
    pub commit_sha: &'a str,
}

impl From<ActionArguments> for Config {
    fn from(args: ActionArguments) -> Self {
        Self {
            token: non_empty(args.token),
            repository: non_empty(args.repository),
            commit_sha: non_empty(args.sha),
            prefix: non_empty(args.prefix),
            api_url: non_empty(args.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            state_path: PathBuf::from(
                non_empty(args.state_path).unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            ),
            dry_run: args.dry_run.unwrap_or(false),
            github_output: non_empty(args.github_output).map(PathBuf::from),
            github_env: non_empty(args.github_env).map(PathBuf::from),
        }
    }
}

impl Config {
    /// Returns the registry inputs, or an error naming every one
    /// of them that is absent.
    pub fn registry_inputs(&self) -> Result<RegistryInputs<'_>, SyncError> {
        let (Some(token), Some(repository), Some(commit_sha)) =
            (&self.token, &self.repository, &self.commit_sha)
        else {
            let missing = [
                ("INPUT_TOKEN", self.token.is_none()),
                ("GITHUB_REPOSITORY", self.repository.is_none()),
                ("GITHUB_SHA", self.commit_sha.is_none()),
            ]
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name.to_string())
            .collect();
            return Err(SyncError::MissingEnvironment(missing));
        };

        if !is_owner_and_name(repository) {
            return Err(SyncError::InvalidEnvironment {
                name: "GITHUB_REPOSITORY".to_string(),
                value: repository.to_string(),
                expected: "owner/name",
            });
        }

        Ok(RegistryInputs {
            token,
            repository,
            commit_sha,
        })
    }

    /// The text that precedes the date key in tag names
    pub fn tag_prefix(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}-"),
            None => String::new(),
        }
    }

    /// The published form of a build number, including the prefix
    pub fn tag_name(&self, id: &BuildIdentifier) -> String {
        format!("{}{id}", self.tag_prefix())
    }
}

fn is_owner_and_name(repo: &str) -> bool {
    match repo.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}
