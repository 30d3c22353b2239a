//! Standard table provisioning for a session.

use crate::model::module::Module;
use crate::model::session::SessionContext;
use crate::repo::error::RepoResult;
use crate::service::directory_service::DirectoryResolver;
use crate::service::table_service::TableAccessor;
use log::info;

/// Tables touched by one provisioning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    /// `(module, table)` pairs created by this pass.
    pub created: Vec<(Module, String)>,
    /// Number of standard tables that already existed.
    pub existing: usize,
}

#[derive(Clone, Copy)]
pub struct ProvisionService<'a> {
    resolver: DirectoryResolver<'a>,
    tables: TableAccessor<'a>,
}

impl<'a> ProvisionService<'a> {
    pub fn new(resolver: DirectoryResolver<'a>, tables: TableAccessor<'a>) -> Self {
        Self { resolver, tables }
    }

    /// Ensures the standard tables of one module exist in the session.
    pub fn provision_module(
        &self,
        ctx: &SessionContext,
        module: Module,
    ) -> RepoResult<ProvisionSummary> {
        let container = self.resolver.resolve(ctx, module)?;
        let mut summary = ProvisionSummary::default();
        for spec in module.standard_tables() {
            let ensured = self.tables.ensure_standard(&container, spec)?;
            if ensured.created {
                summary.created.push((module, spec.name.to_string()));
            } else {
                summary.existing += 1;
            }
        }
        Ok(summary)
    }

    /// Ensures every module's standard tables exist in the session.
    pub fn provision_all(&self, ctx: &SessionContext) -> RepoResult<ProvisionSummary> {
        let mut summary = ProvisionSummary::default();
        for module in Module::ALL {
            let module_summary = self.provision_module(ctx, module)?;
            summary.created.extend(module_summary.created);
            summary.existing += module_summary.existing;
        }
        info!(
            "event=provision_all module=provision status=ok session={} created={} existing={}",
            ctx.session(),
            summary.created.len(),
            summary.existing
        );
        Ok(summary)
    }
}
