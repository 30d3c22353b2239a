//! Storage handles: folders, containers and tables.

use crate::model::module::Module;
use crate::model::session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Persisted id of a folder (root, session or upload collection).
    FolderId
);
opaque_id!(
    /// Persisted id of a module container.
    ContainerId
);
opaque_id!(
    /// Backend id of one table inside a container.
    TableId
);

/// Durable handle for one (module, session) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerId,
    pub module: Module,
    pub session: SessionId,
}

/// Handle for one named table inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    pub id: TableId,
    pub container_id: ContainerId,
    pub name: String,
}
