//! Update runs (jobs) and their lifecycle
//!
//! `pending -> running -> {succeeded, failed}`. Terminal states are
//! absorbing, and a terminal run rejects further log lines.

use crate::error::RunError;
use crate::hybrid::Market;
use crate::source::SourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique job identifier (ULID, sortable by creation time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Generate new job ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim()).map(Self)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet started
    Pending,
    /// Executing
    Running,
    /// Finished; individual sources or attributes may have been skipped
    Succeeded,
    /// No reliable progress was possible
    Failed,
}

impl RunStatus {
    /// Whether the status is absorbing
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Statuses reachable in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [RunStatus] {
        use RunStatus::{Failed, Pending, Running, Succeeded};
        match self {
            Pending => &[Running, Failed],
            Running => &[Succeeded, Failed],
            Succeeded | Failed => &[],
        }
    }

    /// Lowercase label used on the wire and in storage
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Validate a status transition
///
/// # Errors
/// `AlreadyFinalized` when leaving a terminal status, `IllegalTransition`
/// for any other edge the state machine does not have.
pub fn validate_transition(job_id: JobId, from: RunStatus, to: RunStatus) -> Result<(), RunError> {
    if from.is_terminal() {
        return Err(RunError::AlreadyFinalized(job_id));
    }
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(RunError::IllegalTransition { from, to })
    }
}

/// One timestamped, human-readable log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    /// Message
    pub message: String,
    /// When it was appended
    pub at: DateTime<Utc>,
}

/// Progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Product pages discovered by adapters
    pub discovered: u64,
    /// Products parsed into candidates
    pub parsed: u64,
    /// Attributes newly written
    pub added: u64,
    /// Attributes replaced with different content
    pub updated: u64,
    /// Attributes observed again unchanged
    pub unchanged: u64,
    /// Attribute writes rejected
    pub skipped: u64,
    /// Source-level failures
    pub errors: u64,
}

impl RunCounts {
    /// Attribute writes that reached the store
    #[inline]
    #[must_use]
    pub fn written(&self) -> u64 {
        self.added + self.updated + self.unchanged
    }

    /// Accumulate another set of counts
    pub fn absorb(&mut self, other: &RunCounts) {
        self.discovered += other.discovered;
        self.parsed += other.parsed;
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// What a job was asked to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Markets to cover
    #[serde(default)]
    pub markets: Vec<Market>,
    /// Sources to run
    #[serde(default)]
    pub sources: Vec<SourceId>,
    /// Run adapters without writing
    #[serde(default)]
    pub dry_run: bool,
}

impl RunRequest {
    /// Create request
    #[must_use]
    pub fn new<M, S>(markets: M, sources: S) -> Self
    where
        M: IntoIterator,
        M::Item: Into<Market>,
        S: IntoIterator,
        S::Item: Into<SourceId>,
    {
        Self {
            markets: markets.into_iter().map(Into::into).collect(),
            sources: sources.into_iter().map(Into::into).collect(),
            dry_run: false,
        }
    }

    /// As dry run
    #[inline]
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Describe why the request is structurally invalid, if it is
    #[must_use]
    pub fn malformation(&self) -> Option<String> {
        if self.markets.iter().any(Market::is_blank) {
            return Some("request contains a blank market".to_string());
        }
        if self.sources.iter().any(SourceId::is_blank) {
            return Some("request contains a blank source id".to_string());
        }
        None
    }
}

/// One execution of the update pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Identifier
    pub job_id: JobId,
    /// What was requested
    pub request: RunRequest,
    /// Current status
    pub status: RunStatus,
    /// Append-only audit log
    pub step_logs: Vec<StepLog>,
    /// Progress counters
    pub counts: RunCounts,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Set once terminal
    pub ended_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a pending run
    #[must_use]
    pub fn new(job_id: JobId, request: RunRequest, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            request,
            status: RunStatus::Pending,
            step_logs: Vec::new(),
            counts: RunCounts::default(),
            started_at: now,
            ended_at: None,
        }
    }

    /// Append a log line
    ///
    /// # Errors
    /// `AlreadyFinalized` if the run is terminal
    pub fn log(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), RunError> {
        if self.status.is_terminal() {
            return Err(RunError::AlreadyFinalized(self.job_id));
        }
        self.step_logs.push(StepLog {
            message: message.into(),
            at,
        });
        Ok(())
    }

    /// Move to another status
    ///
    /// Entering a terminal status stamps `ended_at`.
    ///
    /// # Errors
    /// See [`validate_transition`]
    pub fn transition(&mut self, to: RunStatus, at: DateTime<Utc>) -> Result<(), RunError> {
        validate_transition(self.job_id, self.status, to)?;
        self.status = to;
        if to.is_terminal() {
            self.ended_at = Some(at);
        }
        Ok(())
    }

    /// Whether the run is terminal
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Summary without the log
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            job_id: self.job_id,
            status: self.status,
            sources: self.request.sources.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            counts: self.counts,
        }
    }
}

/// Run without its log, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier
    pub job_id: JobId,
    /// Status
    pub status: RunStatus,
    /// Requested sources
    pub sources: Vec<SourceId>,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Terminal time
    pub ended_at: Option<DateTime<Utc>>,
    /// Counters
    pub counts: RunCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> Run {
        Run::new(JobId::new(), RunRequest::new(["UA"], ["bayer_ua_dekalb"]), Utc::now())
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut r = run();
        r.transition(RunStatus::Running, Utc::now()).unwrap();
        r.log("working", Utc::now()).unwrap();
        r.transition(RunStatus::Succeeded, Utc::now()).unwrap();
        assert!(r.is_terminal());
        assert!(r.ended_at.is_some());
    }

    #[test]
    fn terminal_is_absorbing() {
        let mut r = run();
        r.transition(RunStatus::Running, Utc::now()).unwrap();
        r.transition(RunStatus::Failed, Utc::now()).unwrap();
        for to in [RunStatus::Pending, RunStatus::Running, RunStatus::Succeeded] {
            assert_eq!(
                r.transition(to, Utc::now()),
                Err(RunError::AlreadyFinalized(r.job_id))
            );
        }
        assert!(r.log("late", Utc::now()).is_err());
    }

    #[test]
    fn pending_cannot_succeed_directly() {
        let mut r = run();
        assert!(matches!(
            r.transition(RunStatus::Succeeded, Utc::now()),
            Err(RunError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&RunStatus::Succeeded).unwrap(), "\"succeeded\"");
        assert_eq!("running".parse::<RunStatus>().unwrap(), RunStatus::Running);
    }

    #[test]
    fn job_id_round_trips_as_string() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn malformed_requests_detected() {
        assert!(RunRequest::new([""], ["a"]).malformation().is_some());
        assert!(RunRequest::new(["UA"], [" "]).malformation().is_some());
        assert!(RunRequest::new(["UA"], ["a"]).malformation().is_none());
        assert!(RunRequest::default().malformation().is_none());
    }

    #[test]
    fn counts_absorb() {
        let mut a = RunCounts { added: 1, ..Default::default() };
        a.absorb(&RunCounts { updated: 2, unchanged: 3, ..Default::default() });
        assert_eq!(a.written(), 6);
    }
}
