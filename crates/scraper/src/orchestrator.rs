//! The scrape-and-store pass.
//!
//! One pass: load the prior snapshot (absence is fine), fetch fresh
//! data through a [`FetchStrategy`], compare, and write a new
//! versioned document only when something changed, with a changelog
//! message from the delta reporter. State carried between passes
//! (prior snapshot and version token) lives on the [`Orchestrator`]
//! value, never in process-wide globals.

use gridwatch_core::{
    diff, parse_snapshot, render_message, serialize_snapshot, OutageRecord, Renderer, ReportStyle,
};
use gridwatch_store::{ContentClient, StoreError, Transport};

use crate::error::ScrapeError;
use crate::kubra::KubraResolver;

/// Produces a fresh snapshot for one pass.
///
/// `Ok(None)` is the transient "no data" signal: the pass stops
/// without writing and without treating it as a failure.
pub trait FetchStrategy {
    fn fetch(&mut self) -> Result<Option<Vec<OutageRecord>>, ScrapeError>;
}

/// [`FetchStrategy`] backed by the Kubra tile resolver.
pub struct KubraFetch<T: Transport> {
    resolver: KubraResolver<T>,
    /// (requests, bytes) of the most recent fetch.
    last_stats: Option<(u64, u64)>,
}

impl<T: Transport> KubraFetch<T> {
    pub fn new(resolver: KubraResolver<T>) -> Self {
        KubraFetch {
            resolver,
            last_stats: None,
        }
    }

    pub fn last_stats(&self) -> Option<(u64, u64)> {
        self.last_stats
    }
}

impl<T: Transport> FetchStrategy for KubraFetch<T> {
    fn fetch(&mut self) -> Result<Option<Vec<OutageRecord>>, ScrapeError> {
        let resolution = self.resolver.resolve()?;
        self.last_stats = Some((resolution.requests, resolution.bytes));
        Ok(Some(resolution.into_snapshot()))
    }
}

/// Renders outage records in changelog blocks.
pub struct OutageRenderer;

impl Renderer<OutageRecord> for OutageRenderer {
    fn display_record(&self, record: &OutageRecord) -> String {
        let customers = record
            .customers_affected
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "  {} out with {} customers affected ({})",
            record.number_out,
            customers,
            record.cause.as_deref().unwrap_or("cause unknown"),
        )
    }
}

/// Outcome of one pass.
#[derive(Debug)]
pub enum PassOutcome {
    /// The fetch strategy returned no data; nothing written.
    NoData,
    /// Fresh snapshot is structurally equal to the prior one.
    Unchanged,
    /// Dry run: the message that would have been committed.
    DryRun { message: String },
    /// A new document version was written.
    Written {
        content_sha: String,
        commit_sha: String,
        message: String,
    },
}

/// Errors aborting a pass. No partial writes: any of these leaves the
/// remote document untouched.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("snapshot document is not valid JSON: {0}")]
    Document(#[from] serde_json::Error),
}

/// Ties resolver, delta reporter, and content client together.
pub struct Orchestrator<T: Transport, R: Renderer<OutageRecord>> {
    client: ContentClient<T>,
    path: String,
    style: ReportStyle,
    renderer: R,
    last_snapshot: Option<Vec<OutageRecord>>,
    last_sha: Option<String>,
}

impl<T: Transport, R: Renderer<OutageRecord>> Orchestrator<T, R> {
    pub fn new(client: ContentClient<T>, path: impl Into<String>, style: ReportStyle, renderer: R) -> Self {
        Orchestrator {
            client,
            path: path.into(),
            style,
            renderer,
            last_snapshot: None,
            last_sha: None,
        }
    }

    /// Run one LoadPrior → Fetch → Compare → {NoOp | Write} pass.
    pub fn run_pass(
        &mut self,
        fetch: &mut dyn FetchStrategy,
        dry_run: bool,
    ) -> Result<PassOutcome, PassError> {
        if self.last_snapshot.is_none() || self.last_sha.is_none() {
            match self.client.read(&self.path) {
                Ok((bytes, sha)) => {
                    self.last_snapshot = Some(parse_snapshot(&bytes)?);
                    self.last_sha = Some(sha);
                }
                // Document not created yet: empty prior, no token.
                Err(StoreError::NotFound { .. }) => {
                    self.last_snapshot = None;
                    self.last_sha = None;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let Some(snapshot) = fetch.fetch()? else {
            return Ok(PassOutcome::NoData);
        };

        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return Ok(PassOutcome::Unchanged);
        }

        let prior = self.last_snapshot.as_deref().unwrap_or(&[]);
        let delta = diff(prior, &snapshot, |r| r.id.clone());
        let created = self.last_sha.is_none();
        let message = render_message(&self.style, &self.renderer, &delta, created);

        if dry_run {
            return Ok(PassOutcome::DryRun { message });
        }

        let bytes = serialize_snapshot(&snapshot)?;
        let (content_sha, commit_sha) =
            self.client
                .write(&self.path, &bytes, self.last_sha.as_deref(), &message)?;

        self.last_sha = Some(content_sha.clone());
        self.last_snapshot = Some(snapshot);

        Ok(PassOutcome::Written {
            content_sha,
            commit_sha,
            message,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
