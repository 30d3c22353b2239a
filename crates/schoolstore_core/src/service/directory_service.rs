//! Directory resolver: (module, session) -> container.
//!
//! # Responsibility
//! - Resolve containers through persisted pointers.
//! - Self-heal stale or missing pointers by name-based discovery.
//! - Own the persisted active-session pointer.
//!
//! # Invariants
//! - Discovery always looks up by name before creating.
//! - A stale pointer is never surfaced as an error; it is rediscovered and
//!   overwritten.
//! - Switching the active session does not touch handles already resolved.

use crate::config::StoreConfig;
use crate::model::container::{Container, ContainerId, FolderId};
use crate::model::module::Module;
use crate::model::session::{SessionContext, SessionId};
use crate::repo::config_repo::{container_id_key, folder_id_key, ConfigStore, ACTIVE_SESSION_KEY};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::storage_repo::StorageBackend;
use log::{info, warn};

/// Resolves module containers and session folders.
#[derive(Clone, Copy)]
pub struct DirectoryResolver<'a> {
    backend: &'a dyn StorageBackend,
    config_store: &'a dyn ConfigStore,
    settings: &'a StoreConfig,
}

impl<'a> DirectoryResolver<'a> {
    pub fn new(
        backend: &'a dyn StorageBackend,
        config_store: &'a dyn ConfigStore,
        settings: &'a StoreConfig,
    ) -> Self {
        Self {
            backend,
            config_store,
            settings,
        }
    }

    /// Reads the persisted active session.
    ///
    /// Falls back to the configured default when nothing (or an unparsable
    /// value) is persisted.
    pub fn active_session(&self) -> RepoResult<SessionId> {
        if let Some(value) = self.config_store.get(ACTIVE_SESSION_KEY)? {
            match SessionId::parse(&value) {
                Ok(session) => return Ok(session),
                Err(err) => warn!(
                    "event=active_session_read module=directory status=error error_code=invalid_session error={}",
                    err
                ),
            }
        }
        self.settings
            .default_session()
            .map_err(|err| RepoError::InvalidData(err.to_string()))
    }

    /// Captures the active session as a request-bound context.
    pub fn current_context(&self) -> RepoResult<SessionContext> {
        self.active_session().map(SessionContext::pinned)
    }

    /// Overwrites the persisted active-session pointer.
    pub fn set_active_session(&self, session: &SessionId) -> RepoResult<()> {
        self.config_store.set(ACTIVE_SESSION_KEY, session.as_str())?;
        info!(
            "event=active_session_set module=directory status=ok session={}",
            session
        );
        Ok(())
    }

    /// Resolves the container of `module` for the context's session,
    /// provisioning it on first access.
    pub fn resolve(&self, ctx: &SessionContext, module: Module) -> RepoResult<Container> {
        let session = ctx.session();
        let key = container_id_key(module, session);

        if let Some(id) = self.config_store.get(&key)? {
            let id = ContainerId::new(id);
            if self.backend.container_exists(&id)? {
                return Ok(Container {
                    id,
                    module,
                    session: session.clone(),
                });
            }
            warn!(
                "event=directory_resolve module=directory status=stale target={} session={} container_id={}",
                module, session, id
            );
        }

        let folder = self.session_folder(ctx)?;
        let ensured = self
            .backend
            .ensure_container(&folder, module.container_name())?;
        self.config_store.set(&key, ensured.id.as_str())?;
        info!(
            "event=directory_resolve module=directory status=ok target={} session={} created={}",
            module, session, ensured.created
        );

        Ok(Container {
            id: ensured.id,
            module,
            session: session.clone(),
        })
    }

    /// Looks up an existing container without provisioning anything.
    pub fn find_existing(
        &self,
        ctx: &SessionContext,
        module: Module,
    ) -> RepoResult<Option<Container>> {
        let session = ctx.session();
        if let Some(id) = self.config_store.get(&container_id_key(module, session))? {
            let id = ContainerId::new(id);
            if self.backend.container_exists(&id)? {
                return Ok(Some(Container {
                    id,
                    module,
                    session: session.clone(),
                }));
            }
        }

        let Some(root) = self
            .backend
            .find_folder(None, &self.settings.root_folder_name)?
        else {
            return Ok(None);
        };
        let Some(folder) = self
            .backend
            .find_folder(Some(&root), &self.settings.session_folder_name(session))?
        else {
            return Ok(None);
        };
        let id = self
            .backend
            .find_container(&folder, module.container_name())?;
        Ok(id.map(|id| Container {
            id,
            module,
            session: session.clone(),
        }))
    }

    /// Resolves the session folder (root -> session), provisioning it on
    /// first access.
    pub fn session_folder(&self, ctx: &SessionContext) -> RepoResult<FolderId> {
        let session = ctx.session();
        let key = folder_id_key(session);
        if let Some(id) = self.config_store.get(&key)? {
            let id = FolderId::new(id);
            if self.backend.folder_exists(&id)? {
                return Ok(id);
            }
            warn!(
                "event=session_folder_resolve module=directory status=stale session={} folder_id={}",
                session, id
            );
        }

        let root = self
            .backend
            .ensure_folder(None, &self.settings.root_folder_name)?;
        let folder = self.backend.ensure_folder(
            Some(&root.id),
            &self.settings.session_folder_name(session),
        )?;
        self.config_store.set(&key, folder.id.as_str())?;
        info!(
            "event=session_folder_resolve module=directory status=ok session={} created={}",
            session, folder.created
        );
        Ok(folder.id)
    }

    /// Resolves `root/<uploads>/<category>` for uploaded assets.
    pub fn asset_folder(&self, category: &str) -> RepoResult<FolderId> {
        let category = category.trim();
        if category.is_empty() {
            return Err(RepoError::InvalidData(
                "asset category must not be empty".to_string(),
            ));
        }
        let root = self
            .backend
            .ensure_folder(None, &self.settings.root_folder_name)?;
        let uploads = self
            .backend
            .ensure_folder(Some(&root.id), &self.settings.uploads_folder_name)?;
        let folder = self.backend.ensure_folder(Some(&uploads.id), category)?;
        Ok(folder.id)
    }
}
