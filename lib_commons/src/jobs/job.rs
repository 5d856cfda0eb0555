//! # Job
//!
//! A named unit of pending work. Only `name` and `due_time` are persisted;
//! `description` rides along in process for the caller's bookkeeping.

use std::fmt;

/// Separator between `tag=value` pairs in a job name.
pub const TAG_SEPARATOR: char = ';';

/// A pending job.
///
/// `name` is the identity inside a registry: adding a job whose name already
/// exists only moves its `due_time`. The due time orders the registry but
/// does not gate claiming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<D = ()> {
    /// Unique name, conventionally `tag1=val1;tag2=val2` (e.g. `user=42`).
    pub name: String,
    /// Sort score, in seconds (absolute or logical).
    pub due_time: i64,
    /// Caller payload. Never written to the store.
    pub description: Option<D>,
}

impl Job {
    pub fn new(name: impl Into<String>, due_time: i64) -> Self {
        Self {
            name: name.into(),
            due_time,
            description: None,
        }
    }

    /// Builds a job named from `tag=value` pairs joined by `;`.
    pub fn from_tags<I, K, V>(tags: I, due_time: i64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let name = tags
            .into_iter()
            .map(|(tag, value)| format!("{}={}", tag.as_ref(), value.as_ref()))
            .collect::<Vec<_>>()
            .join(&TAG_SEPARATOR.to_string());
        Self::new(name, due_time)
    }

    /// Attaches an in-process description, e.g. to a job returned by a claim.
    pub fn with_description<D>(self, description: D) -> Job<D> {
        Job {
            name: self.name,
            due_time: self.due_time,
            description: Some(description),
        }
    }
}

impl<D> Job<D> {
    /// True for the zero-value job (no name, zero due time).
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.due_time == 0
    }

    /// Parses the name back into `tag=value` pairs.
    ///
    /// Segments without `=` are returned with an empty value.
    pub fn tags(&self) -> Vec<(&str, &str)> {
        self.name
            .split(TAG_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.split_once('=').unwrap_or((segment, "")))
            .collect()
    }

    /// Drops the description, leaving only what the store knows about.
    pub fn without_description(&self) -> Job {
        Job::new(self.name.clone(), self.due_time)
    }
}

impl<D> fmt::Display for Job<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.due_time)
    }
}
