use crate::config::{ActionArguments, Config};
use crate::date_key::current_date_key;
use crate::registry::GitHubRegistry;
use crate::synchronizer::{RunOutcome, Synchronizer};
use clap::error::ErrorKind;
use clap::Parser;

mod build_number;
mod config;
mod date_key;
mod error;
mod registry;
mod state;
mod synchronizer;
mod version_info;
mod workflow;

async fn run(config: Config) -> anyhow::Result<()> {
    let today = current_date_key();
    log::debug!(
        "build-number {} starting for period {today}",
        version_info::tool_version()
    );

    let mut stdout = std::io::stdout().lock();
    let outcome = Synchronizer::new(&config)
        .run(
            today,
            |inputs| GitHubRegistry::new(&config.api_url, inputs.repository, inputs.token),
            &mut stdout,
        )
        .await?;

    match &outcome {
        RunOutcome::Cached(build_number) => log::debug!("reused {build_number}"),
        RunOutcome::Fresh {
            build_number,
            identifier,
        } => log::debug!(
            "minted {build_number}: period {} build {}",
            identifier.date_key(),
            identifier.minor
        ),
    }
    Ok(())
}

/// Marks the workflow step as failed and exits
fn fail(message: &str) -> ! {
    println!("{}", workflow::error_annotation(message));
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    color_backtrace::install();
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match ActionArguments::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => err.exit(),
            _ => fail(&err.to_string()),
        },
    };

    if let Err(err) = run(Config::from(args)).await {
        fail(&format!("{err:#}"));
    }
}
