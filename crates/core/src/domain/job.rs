// Job Domain Model - one entry of the at(1) queue

use crate::domain::time::parse_at_time;
use crate::error::{BridgeError, Result};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Listing grammars, tried in order
///
/// 1. `atq` style: `<id>\t<time> a <owner>` (queue letter then owner)
/// 2. `at` acknowledgment style: `job <id> at <time>`
///
/// Formats seen on other installations go at the end of this table.
static LISTING_GRAMMARS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^([0-9]+)\t(.+) a [^ \n]+\n?$",
        r"^job ([0-9]+) at (.+)\n?$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("listing grammar must compile"))
    .collect()
});

/// A job queued with the daemon
///
/// Two jobs are equal iff their names are equal: the daemon does not reuse
/// an identifier while the job is queued.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    name: String,
    time: NaiveDateTime,
}

impl Job {
    pub fn new(name: impl Into<String>, time: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            time,
        }
    }

    /// Identifier shown by `at -l`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time at which the job is to run (local, minute precision)
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    /// Parse one line of listing output (trailing newline optional)
    ///
    /// A line matching no grammar is an error, never skipped: hiding a job
    /// from the caller is worse than failing the whole listing.
    ///
    /// # Example
    /// ```
    /// use atbridge_core::domain::Job;
    ///
    /// let job = Job::parse(b"job 20 at Tue Jun 26 11:37:00 2018\n").unwrap();
    /// assert_eq!(job.name(), "20");
    /// assert!(Job::parse(b"garbage line").is_err());
    /// ```
    pub fn parse(line: &[u8]) -> Result<Job> {
        let unrecognized = || BridgeError::Parse {
            line: String::from_utf8_lossy(line).into_owned(),
        };

        let captures = LISTING_GRAMMARS
            .iter()
            .find_map(|grammar| grammar.captures(line))
            .ok_or_else(unrecognized)?;

        let name = std::str::from_utf8(&captures[1]).map_err(|_| unrecognized())?;
        let time_text = std::str::from_utf8(&captures[2]).map_err(|_| unrecognized())?;
        let time = parse_at_time(time_text).ok_or_else(unrecognized)?;

        Ok(Job::new(name, time))
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.time.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// A job given either as a [`Job`] or as its bare identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRef(String);

impl JobRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_name(self) -> String {
        self.0
    }
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        JobRef(job.name.clone())
    }
}

impl From<Job> for JobRef {
    fn from(job: Job) -> Self {
        JobRef(job.name)
    }
}

impl From<&str> for JobRef {
    fn from(name: &str) -> Self {
        JobRef(name.to_string())
    }
}

impl From<String> for JobRef {
    fn from(name: String) -> Self {
        JobRef(name)
    }
}

impl From<&String> for JobRef {
    fn from(name: &String) -> Self {
        JobRef(name.clone())
    }
}

/// One or many jobs, normalized to identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSelection(Vec<JobRef>);

impl JobSelection {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(JobRef::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<R: Into<JobRef>> FromIterator<R> for JobSelection {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        JobSelection(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&Job> for JobSelection {
    fn from(job: &Job) -> Self {
        JobSelection(vec![job.into()])
    }
}

impl From<Job> for JobSelection {
    fn from(job: Job) -> Self {
        JobSelection(vec![job.into()])
    }
}

impl From<&str> for JobSelection {
    fn from(name: &str) -> Self {
        JobSelection(vec![name.into()])
    }
}

impl From<String> for JobSelection {
    fn from(name: String) -> Self {
        JobSelection(vec![name.into()])
    }
}

impl From<&[Job]> for JobSelection {
    fn from(jobs: &[Job]) -> Self {
        jobs.iter().collect()
    }
}

impl<R: Into<JobRef>> From<Vec<R>> for JobSelection {
    fn from(refs: Vec<R>) -> Self {
        refs.into_iter().collect()
    }
}

impl<R: Into<JobRef>, const N: usize> From<[R; N]> for JobSelection {
    fn from(refs: [R; N]) -> Self {
        refs.into_iter().collect()
    }
}
