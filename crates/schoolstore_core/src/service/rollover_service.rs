//! Academic-year rollover.
//!
//! # Responsibility
//! - Switch the active session.
//! - Carry master tables forward and start log tables empty.
//! - Report the outcome of every master category explicitly.
//!
//! # Invariants
//! - Runs entirely inside one store lock critical section.
//! - The previous session's containers are read, never modified.
//! - The pointer switch is not rolled back when a later step fails; the
//!   report states which categories were not carried forward.

use crate::lock::{LockError, LockManager};
use crate::model::container::FolderId;
use crate::model::module::{master_tables, Module, TableSpec};
use crate::model::session::{SessionContext, SessionId};
use crate::repo::error::{RepoError, RepoResult};
use crate::service::directory_service::DirectoryResolver;
use crate::service::provision_service::{ProvisionService, ProvisionSummary};
use crate::service::table_service::TableAccessor;
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Rollover state machine stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverStage {
    Idle,
    PointerSwitched,
    MastersCopied,
    LogsReprovisioned,
    Done,
}

/// Outcome of carrying one master table forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MasterCopyOutcome {
    /// Data rows copied (header excluded).
    Copied { rows: usize },
    /// Old container or table did not exist.
    SkippedMissingSource,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterCopyReport {
    pub module: Module,
    pub table: &'static str,
    pub outcome: MasterCopyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloverReport {
    pub old_session: SessionId,
    pub new_session: SessionId,
    /// Folder of the new session, present once the rollover is done.
    pub session_folder: Option<FolderId>,
    pub stage: RolloverStage,
    pub masters: Vec<MasterCopyReport>,
    /// Log/master tables newly created in the new session.
    pub provisioned_tables: usize,
    pub provision_error: Option<String>,
    /// Set when the new session folder could not be resolved.
    pub session_folder_error: Option<String>,
}

impl RolloverReport {
    /// `true` when every step completed and no category failed.
    pub fn is_complete(&self) -> bool {
        self.stage == RolloverStage::Done
            && self.provision_error.is_none()
            && self.session_folder_error.is_none()
            && self
                .masters
                .iter()
                .all(|report| !matches!(report.outcome, MasterCopyOutcome::Failed { .. }))
    }

    /// Master categories that were not carried forward because of a failure.
    pub fn failed_masters(&self) -> impl Iterator<Item = &MasterCopyReport> {
        self.masters
            .iter()
            .filter(|report| matches!(report.outcome, MasterCopyOutcome::Failed { .. }))
    }
}

#[derive(Debug)]
pub enum RolloverError {
    Busy(LockError),
    /// The requested session is already active.
    SameSession(SessionId),
    /// Failure before the pointer switch.
    Repo(RepoError),
}

impl Display for RolloverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy(err) => write!(f, "{err}"),
            Self::SameSession(session) => write!(f, "session {session} is already active"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RolloverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Busy(err) => Some(err),
            Self::SameSession(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<LockError> for RolloverError {
    fn from(value: LockError) -> Self {
        Self::Busy(value)
    }
}

impl From<RepoError> for RolloverError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub struct RolloverService<'a> {
    resolver: DirectoryResolver<'a>,
    tables: TableAccessor<'a>,
    lock: &'a LockManager,
    lock_timeout: Duration,
}

impl<'a> RolloverService<'a> {
    pub fn new(
        resolver: DirectoryResolver<'a>,
        tables: TableAccessor<'a>,
        lock: &'a LockManager,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            tables,
            lock,
            lock_timeout,
        }
    }

    /// Switches the active session to `new_session`, carrying masters
    /// forward and provisioning empty log tables.
    pub fn rollover(&self, new_session: &SessionId) -> Result<RolloverReport, RolloverError> {
        self.lock
            .with_lock(self.lock_timeout, || self.run(new_session))?
    }

    fn run(&self, new_session: &SessionId) -> Result<RolloverReport, RolloverError> {
        let started_at = Instant::now();
        let old_session = self.resolver.active_session()?;
        if &old_session == new_session {
            return Err(RolloverError::SameSession(old_session));
        }
        info!(
            "event=session_rollover module=rollover status=start old_session={} new_session={}",
            old_session, new_session
        );

        let mut report = RolloverReport {
            old_session: old_session.clone(),
            new_session: new_session.clone(),
            session_folder: None,
            stage: RolloverStage::Idle,
            masters: Vec::new(),
            provisioned_tables: 0,
            provision_error: None,
            session_folder_error: None,
        };

        self.resolver.set_active_session(new_session)?;
        report.stage = RolloverStage::PointerSwitched;

        let old_ctx = SessionContext::pinned(old_session);
        let new_ctx = SessionContext::pinned(new_session.clone());
        for spec in master_tables() {
            let outcome = match self.copy_master(&old_ctx, &new_ctx, spec) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        "event=master_copy module=rollover status=error target={} table={} error={}",
                        spec.module, spec.name, err
                    );
                    MasterCopyOutcome::Failed {
                        message: err.to_string(),
                    }
                }
            };
            report.masters.push(MasterCopyReport {
                module: spec.module,
                table: spec.name,
                outcome,
            });
        }
        report.stage = RolloverStage::MastersCopied;

        match ProvisionService::new(self.resolver, self.tables).provision_all(&new_ctx) {
            Ok(ProvisionSummary { created, .. }) => {
                report.provisioned_tables = created.len();
                report.stage = RolloverStage::LogsReprovisioned;
            }
            Err(err) => {
                error!(
                    "event=session_provision module=rollover status=error session={} error={}",
                    new_session, err
                );
                report.provision_error = Some(err.to_string());
            }
        }

        match self.resolver.session_folder(&new_ctx) {
            Ok(folder) => report.session_folder = Some(folder),
            Err(err) => {
                error!(
                    "event=session_folder module=rollover status=error session={} error={}",
                    new_session, err
                );
                report.session_folder_error = Some(err.to_string());
            }
        }
        if report.provision_error.is_none() && report.session_folder_error.is_none() {
            report.stage = RolloverStage::Done;
        }

        let status = if report.is_complete() { "ok" } else { "partial" };
        info!(
            "event=session_rollover module=rollover status={} old_session={} new_session={} duration_ms={}",
            status,
            report.old_session,
            report.new_session,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn copy_master(
        &self,
        old_ctx: &SessionContext,
        new_ctx: &SessionContext,
        spec: &TableSpec,
    ) -> RepoResult<MasterCopyOutcome> {
        let Some(source) = self.resolver.find_existing(old_ctx, spec.module)? else {
            warn!(
                "event=master_copy module=rollover status=skip target={} table={} reason=missing_container",
                spec.module, spec.name
            );
            return Ok(MasterCopyOutcome::SkippedMissingSource);
        };
        let rows = self.tables.read_all_rows(&source, spec.name)?;
        if rows.is_empty() {
            warn!(
                "event=master_copy module=rollover status=skip target={} table={} reason=missing_table",
                spec.module, spec.name
            );
            return Ok(MasterCopyOutcome::SkippedMissingSource);
        }

        let target = self.resolver.resolve(new_ctx, spec.module)?;
        let table = self.tables.get_or_create(&target, spec.name, spec.header)?;
        self.tables.replace_contents(&table, &rows)?;
        let copied = rows.len() - 1;
        info!(
            "event=master_copy module=rollover status=ok target={} table={} rows={}",
            spec.module, spec.name, copied
        );
        Ok(MasterCopyOutcome::Copied { rows: copied })
    }
}
