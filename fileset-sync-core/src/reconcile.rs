//! Lifecycle reconciler: decides, per host operation, what to do with the
//! local fileset and the remote objects, and what state to hand back.
//!
//! # Operations
//! - **Create**: discover, upload, derive identity, persist `{identity, file_digests}`.
//! - **Read**: re-discover against the desired pattern (no upload) and
//!   refresh the persisted record, making local drift visible without a write.
//! - **Update**: exactly a Create. Every update republishes the full fileset.
//! - **Delete**: no filesystem or store action. Warns that objects remain in
//!   the bucket and removes the record.
//! - **Import**: adopt an externally supplied identity without uploading.
//!
//! # Error Handling
//! Fail-fast. Any error becomes an error diagnostic and the state change is
//! [`StateChange::Keep`], so a failed operation never persists partial state.
//!
//! Whether a change to bucket, glob or prefix requires Delete-then-Create is
//! the host's decision; this module only executes the operation it is given.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::FilesetConfiguration;
use crate::context::OperationContext;
use crate::contract::ObjectStore;
use crate::diagnostics::Diagnostics;
use crate::discover::discover_and_load;
use crate::error::SyncError;
use crate::fileset::{ContentDigest, Fileset};
use crate::identity::FilesetIdentity;
use crate::publish::{ConfirmationPolicy, Publisher, UploadRecord};
use crate::state::PersistedState;

/// A host-driven lifecycle operation.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Create {
        desired: &'a FilesetConfiguration,
    },
    Read {
        prior: &'a PersistedState,
        desired: &'a FilesetConfiguration,
    },
    Update {
        prior: &'a PersistedState,
        desired: &'a FilesetConfiguration,
    },
    Delete {
        prior: &'a PersistedState,
    },
    Import {
        identity: &'a str,
    },
}

impl Operation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Read { .. } => "read",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Import { .. } => "import",
        }
    }
}

/// What the host should do with its persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Write(PersistedState),
    Remove,
    Keep,
}

/// Per-operation summary of a converge. Logged and returned, never persisted.
#[derive(Debug, Clone)]
pub struct ConvergeReport {
    pub identity: FilesetIdentity,
    pub aggregate_digest: ContentDigest,
    pub uploads: Vec<UploadRecord>,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub state: StateChange,
    pub diagnostics: Diagnostics,
    pub report: Option<ConvergeReport>,
}

impl Outcome {
    fn write(state: PersistedState, report: Option<ConvergeReport>) -> Self {
        Self {
            state: StateChange::Write(state),
            diagnostics: Diagnostics::default(),
            report,
        }
    }

    fn failed(err: &SyncError) -> Self {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push_sync_error(err);
        Self {
            state: StateChange::Keep,
            diagnostics,
            report: None,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_error()
    }

    /// The state written by this operation, if any.
    pub fn written_state(&self) -> Option<&PersistedState> {
        match &self.state {
            StateChange::Write(state) => Some(state),
            StateChange::Remove | StateChange::Keep => None,
        }
    }
}

/// Executes lifecycle operations against one object store.
pub struct Reconciler<S: ObjectStore> {
    store: S,
    root: PathBuf,
    confirmation: ConfirmationPolicy,
}

impl<S: ObjectStore> Reconciler<S> {
    /// Reconciler rooted at the process working directory.
    pub fn new(store: S) -> Self {
        Self {
            store,
            root: PathBuf::from("."),
            confirmation: ConfirmationPolicy::default(),
        }
    }

    /// Resolve match patterns relative to `root` instead.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation = policy;
        self
    }

    /// Runs one operation to completion.
    pub async fn reconcile(&self, op: Operation<'_>, ctx: &OperationContext) -> Outcome {
        info!(operation = op.name(), "[RECONCILE] Starting operation");

        let outcome = match op {
            Operation::Create { desired } | Operation::Update { desired, .. } => {
                match self.converge(desired, ctx).await {
                    Ok((state, report)) => Outcome::write(state, Some(report)),
                    Err(e) => Outcome::failed(&e),
                }
            }
            Operation::Read { prior, desired } => match self.refresh(prior, desired, ctx).await {
                Ok(state) => Outcome::write(state, None),
                Err(e) => Outcome::failed(&e),
            },
            Operation::Delete { prior } => {
                warn!(
                    identity = %prior.identity,
                    files = prior.file_digests.len(),
                    "[RECONCILE] Leaving uploaded objects in place"
                );
                let mut diagnostics = Diagnostics::default();
                diagnostics.add_warning(
                    "Not deleting files",
                    "This resource treats its files as immutable. To delete previously managed \
                     files, either remove them from the bucket manually or allow them to expire \
                     based on the bucket lifecycle policy.",
                );
                Outcome {
                    state: StateChange::Remove,
                    diagnostics,
                    report: None,
                }
            }
            Operation::Import { identity } => {
                if identity.trim().is_empty() {
                    Outcome::failed(&SyncError::HostProtocol(
                        "import requires a non-empty identity".into(),
                    ))
                } else {
                    info!(identity, "[RECONCILE] Imported existing fileset");
                    Outcome::write(
                        PersistedState::imported(FilesetIdentity::from_external(identity)),
                        None,
                    )
                }
            }
        };

        for diag in outcome.diagnostics.errors() {
            error!(
                operation = op.name(),
                summary = %diag.summary,
                detail = %diag.detail,
                "[RECONCILE] Operation failed"
            );
        }
        outcome
    }

    /// Full discover + upload pipeline shared by Create and Update.
    async fn converge(
        &self,
        desired: &FilesetConfiguration,
        ctx: &OperationContext,
    ) -> Result<(PersistedState, ConvergeReport), SyncError> {
        desired.validate()?;
        desired.trace_loaded();

        let files = self.load(desired, ctx).await?;
        let uploads = Publisher::new(&self.store)
            .with_confirmation_policy(self.confirmation.clone())
            .publish(&files, desired, ctx)
            .await?;

        let identity = FilesetIdentity::of(desired);
        let report = ConvergeReport {
            identity: identity.clone(),
            aggregate_digest: files.aggregate_digest(),
            uploads,
        };
        info!(
            identity = %report.identity,
            aggregate_digest = %report.aggregate_digest,
            uploaded = report.uploads.len(),
            "[RECONCILE] Fileset converged"
        );
        Ok((PersistedState::new(identity, &files), report))
    }

    async fn refresh(
        &self,
        prior: &PersistedState,
        desired: &FilesetConfiguration,
        ctx: &OperationContext,
    ) -> Result<PersistedState, SyncError> {
        desired.validate()?;
        let files = self.load(desired, ctx).await?;
        let state = PersistedState::new(FilesetIdentity::of(desired), &files);

        if state.file_digests != prior.file_digests {
            info!(
                identity = %state.identity,
                before = prior.file_digests.len(),
                after = state.file_digests.len(),
                "[RECONCILE] Local files drifted from recorded state"
            );
        }
        Ok(state)
    }

    async fn load(
        &self,
        desired: &FilesetConfiguration,
        ctx: &OperationContext,
    ) -> Result<Fileset, SyncError> {
        discover_and_load(&self.root, &desired.glob, ctx).await
    }
}
