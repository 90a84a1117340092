//! Local host: keeps persisted state in a JSON file and decides which
//! lifecycle operation each configured resource needs.
//!
//! `apply` plans per resource:
//! - no record: Create
//! - bucket, glob or prefix changed: Delete, then Create
//! - otherwise Read, then Update when the refreshed digests or any other
//!   field differ from the record
//!
//! Records whose resource is gone from the configuration are deleted.
//! The state file is rewritten after every resource, so a failure part way
//! through keeps what already succeeded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use fileset_sync_core::diagnostics::Diagnostics;
use fileset_sync_core::{
    FilesetConfiguration, ObjectStore, Operation, OperationContext, Outcome, PersistedState,
    Reconciler, StateChange,
};

pub const DEFAULT_STATE_FILE: &str = "fileset-sync.state.json";

/// What the host recorded for one resource after its last successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub config: FilesetConfiguration,
    pub state: PersistedState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl HostState {
    /// Reads the state file; a missing file is an empty state.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse state file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(state_path = %path.display(), "No state file yet, starting empty");
                Ok(Self::default())
            }
            Err(e) => {
                error!(error = ?e, state_path = %path.display(), "Failed to read state file");
                Err(anyhow!("Failed to read state file {}: {e}", path.display()))
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write state file {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Replaced,
    Updated,
    Unchanged,
    Refreshed,
    Removed,
    Imported,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Created => "created",
            Action::Replaced => "replaced",
            Action::Updated => "updated",
            Action::Unchanged => "unchanged",
            Action::Refreshed => "refreshed",
            Action::Removed => "removed",
            Action::Imported => "imported",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub name: String,
    pub action: Action,
    pub diagnostics: Diagnostics,
}

/// Drives a [`Reconciler`] for every resource and persists the results.
pub struct LocalHost<S: ObjectStore> {
    reconciler: Reconciler<S>,
    state_path: PathBuf,
}

impl<S: ObjectStore> LocalHost<S> {
    pub fn new(reconciler: Reconciler<S>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            reconciler,
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub async fn load_state(&self) -> Result<HostState> {
        HostState::load(&self.state_path).await
    }

    /// Converges every configured resource, then deletes orphaned records.
    pub async fn apply(
        &self,
        resources: &BTreeMap<String, FilesetConfiguration>,
        ctx: &OperationContext,
    ) -> Result<Vec<ResourceReport>> {
        let mut host_state = self.load_state().await?;
        let mut reports = Vec::new();

        for (name, desired) in resources {
            let report = match host_state.resources.get(name).cloned() {
                None => {
                    let outcome = self.run(name, Operation::Create { desired }, ctx).await;
                    let report = self.record(&mut host_state, name, desired, outcome, Action::Created);
                    self.checkpoint(&host_state, report).await?
                }
                Some(record) if !record.config.same_identity_fields(desired) => {
                    info!(resource = %name, "Identity-defining fields changed, replacing");
                    let deleted = self
                        .run(name, Operation::Delete { prior: &record.state }, ctx)
                        .await;
                    host_state.resources.remove(name);

                    let outcome = self.run(name, Operation::Create { desired }, ctx).await;
                    let mut report =
                        self.record(&mut host_state, name, desired, outcome, Action::Replaced);
                    let mut diagnostics = deleted.diagnostics;
                    diagnostics.merge(report.diagnostics);
                    report.diagnostics = diagnostics;
                    self.checkpoint(&host_state, report).await?
                }
                Some(record) => {
                    let read = self
                        .run(
                            name,
                            Operation::Read {
                                prior: &record.state,
                                desired,
                            },
                            ctx,
                        )
                        .await;
                    let refreshed = match read.written_state() {
                        Some(state) => state.clone(),
                        None => {
                            let report = failed_report(name, Action::Refreshed, read);
                            return Err(self.fail(&host_state, report).await);
                        }
                    };

                    if refreshed.file_digests != record.state.file_digests
                        || &record.config != desired
                    {
                        info!(resource = %name, "Files or options drifted, updating");
                        let outcome = self
                            .run(
                                name,
                                Operation::Update {
                                    prior: &refreshed,
                                    desired,
                                },
                                ctx,
                            )
                            .await;
                        let report =
                            self.record(&mut host_state, name, desired, outcome, Action::Updated);
                        self.checkpoint(&host_state, report).await?
                    } else {
                        let report =
                            self.record(&mut host_state, name, desired, read, Action::Unchanged);
                        self.checkpoint(&host_state, report).await?
                    }
                }
            };
            reports.push(report);
        }

        let orphans: Vec<String> = host_state
            .resources
            .keys()
            .filter(|name| !resources.contains_key(*name))
            .cloned()
            .collect();
        for name in orphans {
            info!(resource = %name, "Resource no longer configured, removing");
            let report = self.delete(&mut host_state, &name, ctx).await;
            reports.push(self.checkpoint(&host_state, report).await?);
        }

        Ok(reports)
    }

    /// Re-reads every recorded resource against its recorded configuration.
    pub async fn refresh(&self, ctx: &OperationContext) -> Result<Vec<ResourceReport>> {
        let mut host_state = self.load_state().await?;
        let mut reports = Vec::new();

        let records: Vec<(String, ResourceRecord)> = host_state
            .resources
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, record) in records {
            let outcome = self
                .run(
                    &name,
                    Operation::Read {
                        prior: &record.state,
                        desired: &record.config,
                    },
                    ctx,
                )
                .await;
            let report =
                self.record(&mut host_state, &name, &record.config, outcome, Action::Refreshed);
            reports.push(self.checkpoint(&host_state, report).await?);
        }
        Ok(reports)
    }

    /// Forgets every recorded resource. Uploaded objects are left in place.
    pub async fn destroy(&self, ctx: &OperationContext) -> Result<Vec<ResourceReport>> {
        let mut host_state = self.load_state().await?;
        let mut reports = Vec::new();

        let names: Vec<String> = host_state.resources.keys().cloned().collect();
        for name in names {
            let report = self.delete(&mut host_state, &name, ctx).await;
            reports.push(self.checkpoint(&host_state, report).await?);
        }
        Ok(reports)
    }

    /// Adopts an existing fileset under `name` without uploading anything.
    pub async fn import(
        &self,
        name: &str,
        config: &FilesetConfiguration,
        identity: &str,
        ctx: &OperationContext,
    ) -> Result<ResourceReport> {
        let mut host_state = self.load_state().await?;
        if host_state.resources.contains_key(name) {
            return Err(anyhow!("Resource `{name}` is already managed"));
        }
        let outcome = self.run(name, Operation::Import { identity }, ctx).await;
        let report = self.record(&mut host_state, name, config, outcome, Action::Imported);
        self.checkpoint(&host_state, report).await
    }

    async fn run(&self, name: &str, op: Operation<'_>, ctx: &OperationContext) -> Outcome {
        let outcome = self.reconciler.reconcile(op, ctx).await;
        for diag in outcome.diagnostics.warnings() {
            warn!(resource = %name, summary = %diag.summary, detail = %diag.detail, "Warning");
        }
        outcome
    }

    async fn delete(
        &self,
        host_state: &mut HostState,
        name: &str,
        ctx: &OperationContext,
    ) -> ResourceReport {
        let Some(record) = host_state.resources.get(name).cloned() else {
            return ResourceReport {
                name: name.to_string(),
                action: Action::Removed,
                diagnostics: Diagnostics::default(),
            };
        };
        let outcome = self
            .run(name, Operation::Delete { prior: &record.state }, ctx)
            .await;
        if outcome.state == StateChange::Remove {
            host_state.resources.remove(name);
        }
        ResourceReport {
            name: name.to_string(),
            action: Action::Removed,
            diagnostics: outcome.diagnostics,
        }
    }

    /// Applies an outcome's state change to the in-memory record.
    fn record(
        &self,
        host_state: &mut HostState,
        name: &str,
        config: &FilesetConfiguration,
        outcome: Outcome,
        action: Action,
    ) -> ResourceReport {
        match outcome.state {
            StateChange::Write(state) => {
                host_state.resources.insert(
                    name.to_string(),
                    ResourceRecord {
                        config: config.clone(),
                        state,
                    },
                );
            }
            StateChange::Remove => {
                host_state.resources.remove(name);
            }
            StateChange::Keep => {}
        }
        ResourceReport {
            name: name.to_string(),
            action,
            diagnostics: outcome.diagnostics,
        }
    }

    /// Persists the state, then turns an errored report into a failure.
    async fn checkpoint(&self, host_state: &HostState, report: ResourceReport) -> Result<ResourceReport> {
        if report.diagnostics.has_error() {
            return Err(self.fail(host_state, report).await);
        }
        host_state.save(&self.state_path).await?;
        info!(resource = %report.name, action = %report.action, "Resource done");
        Ok(report)
    }

    async fn fail(&self, host_state: &HostState, report: ResourceReport) -> anyhow::Error {
        if let Err(e) = host_state.save(&self.state_path).await {
            error!(error = ?e, "Failed to persist state after error");
        }
        let detail = report
            .diagnostics
            .errors()
            .map(|d| format!("{}: {}", d.summary, d.detail))
            .collect::<Vec<_>>()
            .join("; ");
        error!(resource = %report.name, action = %report.action, %detail, "Resource failed");
        anyhow!("Resource `{}` failed: {detail}", report.name)
    }
}

fn failed_report(name: &str, action: Action, outcome: Outcome) -> ResourceReport {
    ResourceReport {
        name: name.to_string(),
        action,
        diagnostics: outcome.diagnostics,
    }
}
