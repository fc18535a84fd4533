use crate::date_key::DateKey;
use crate::registry::RegistryEntry;
use regex::Regex;
use std::str::FromStr;

/// A `YYYY.MM.minor.patch` build number.
///
/// `minor` counts builds within a month and resets to zero when the
/// month changes. `patch` is never bumped automatically; it is
/// reserved for manual hotfix numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildIdentifier {
    pub year: i32,
    pub month: u32,
    pub minor: u64,
    pub patch: u64,
}

impl BuildIdentifier {
    /// The first build number of a month
    pub fn first_of(today: DateKey) -> Self {
        Self::with_minor(today, 0)
    }

    fn with_minor(today: DateKey, minor: u64) -> Self {
        Self {
            year: today.year,
            month: today.month,
            minor,
            patch: 0,
        }
    }

    pub fn date_key(&self) -> DateKey {
        DateKey {
            year: self.year,
            month: self.month,
        }
    }
}

impl std::fmt::Display for BuildIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.date_key(), self.minor, self.patch)
    }
}

impl FromStr for BuildIdentifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let fields: Vec<&str> = s.trim().split('.').collect();
        let [year, month, minor, patch] = fields.as_slice() else {
            anyhow::bail!("expected YYYY.MM.minor.patch but got {s:?}");
        };

        let key = DateKey::new(year.parse()?, month.parse()?)?;
        Ok(Self {
            year: key.year,
            month: key.month,
            minor: minor.parse()?,
            patch: patch.parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    #[error("build counter in {0} does not fit in 64 bits")]
    TooLarge(String),
    #[error("build counter of {0} cannot be incremented any further")]
    Exhausted(BuildIdentifier),
}

/// Computes the successor of `latest` for the period `today`.
/// Within the same month the minor counter advances; a different
/// month starts over at zero. The patch number is always reset.
pub fn next_from_latest(
    latest: &BuildIdentifier,
    today: DateKey,
) -> Result<BuildIdentifier, CounterError> {
    if latest.date_key() != today {
        return Ok(BuildIdentifier::first_of(today));
    }
    let minor = latest
        .minor
        .checked_add(1)
        .ok_or(CounterError::Exhausted(*latest))?;
    Ok(BuildIdentifier::with_minor(today, minor))
}

/// Recognizes the tag refs that belong to a given month and extracts
/// their counter.
///
/// Two shapes are accepted underneath `refs/tags/<prefix><YYYY.MM>`:
///
/// * `<n>-<counter>`, optionally preceded by a dot: counter tags; the
///   trailing number is the counter.
/// * `.<minor>.<patch>`: build numbers minted by this tool; the minor
///   number is the counter.
#[derive(Debug, Clone)]
pub struct RefMatcher {
    today: DateKey,
    regex: Regex,
}

impl RefMatcher {
    pub fn new(tag_prefix: &str, today: DateKey) -> Result<Self, regex::Error> {
        let pattern = format!(
            r"^refs/tags/{prefix}{date}(?:\.?\d+-(\d+)|\.(\d+)\.\d+)$",
            prefix = regex::escape(tag_prefix),
            date = regex::escape(&today.to_string())
        );
        Ok(Self {
            today,
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn date_key(&self) -> DateKey {
        self.today
    }

    /// Returns the counter encoded in `git_ref`, or None if the ref
    /// is not one of ours for this month.
    pub fn counter(&self, git_ref: &str) -> Result<Option<u64>, CounterError> {
        let Some(caps) = self.regex.captures(git_ref) else {
            return Ok(None);
        };
        let Some(counter) = caps.get(1).or_else(|| caps.get(2)) else {
            return Ok(None);
        };
        counter
            .as_str()
            .parse()
            .map(Some)
            .map_err(|_| CounterError::TooLarge(git_ref.to_string()))
    }

    pub fn counters<'a>(
        &'a self,
        entries: &'a [RegistryEntry],
    ) -> impl Iterator<Item = Result<u64, CounterError>> + 'a {
        entries
            .iter()
            .filter_map(|entry| self.counter(&entry.git_ref).transpose())
    }
}

/// Computes the next build number from the set of tags currently
/// held by the registry. Duplicate counters are harmless; only the
/// maximum matters.
pub fn next_from_registry_snapshot(
    entries: &[RegistryEntry],
    matcher: &RefMatcher,
) -> Result<BuildIdentifier, CounterError> {
    let today = matcher.date_key();
    let mut last = None;
    for counter in matcher.counters(entries) {
        last = last.max(Some(counter?));
    }

    match last {
        Some(last) => {
            log::info!("Last build nr was {last}.");
            next_from_latest(&BuildIdentifier::with_minor(today, last), today)
        }
        None => Ok(BuildIdentifier::first_of(today)),
    }
}
