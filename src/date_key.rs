use chrono::{Datelike, Utc};

/// The `(year, month)` tagging period that build numbers are
/// grouped under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey {
    pub year: i32,
    pub month: u32,
}

impl DateKey {
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (1..=12).contains(&month),
            "month {month} is outside of the range 1-12"
        );
        Ok(Self { year, month })
    }

    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// Always `YYYY.MM`, zero padded, regardless of the host locale.
impl std::fmt::Display for DateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}.{:02}", self.year, self.month)
    }
}

/// The tagging period for the current moment, in UTC.
pub fn current_date_key() -> DateKey {
    DateKey::from_date(&Utc::now())
}
