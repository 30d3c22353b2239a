//! Logical modules and their standard table catalog.
//!
//! # Responsibility
//! - Enumerate the fixed logical databases of the school store.
//! - Map each module to its container name and standard tables.
//! - Declare which tables are masters (carried across sessions) and which
//!   are logs (reset every session).
//!
//! # Invariants
//! - Container names are unique across modules.
//! - Table names are unique within one module.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fixed logical database identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Students,
    Fees,
    Homework,
    Results,
    Events,
    Expenses,
    Staff,
    Users,
    Archive,
}

/// Whether a table survives a session rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Identity registry copied forward into the next session.
    Master,
    /// Transactional/history data that starts empty every session.
    Log,
}

/// Declaration of one standard table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub module: Module,
    pub name: &'static str,
    pub kind: TableKind,
    pub header: &'static [&'static str],
}

pub const STUDENTS_TABLE: &str = "Students";
pub const ATTENDANCE_TABLE: &str = "Attendance";
pub const FEE_PAYMENTS_TABLE: &str = "Fee_Payments";
pub const HOMEWORK_TABLE: &str = "Homework";
pub const RESULTS_TABLE: &str = "Results";
pub const EVENTS_TABLE: &str = "Events";
pub const EXPENSES_TABLE: &str = "Expenses";
pub const EMPLOYEES_TABLE: &str = "Employees";
pub const USERS_TABLE: &str = "Users";
pub const ARCHIVE_TABLE: &str = "Deleted_Records";

/// Column layout of the archive table.
pub const ARCHIVE_HEADER: &[&str] = &["Timestamp", "Actor", "Module", "Original ID", "Snapshot"];

/// Column layout of per-exam result tables created through dynamic naming.
pub const EXAM_RESULTS_HEADER: &[&str] =
    &["Student ID", "Subject", "Marks", "Max Marks", "Grade", "Remarks"];

const TABLE_CATALOG: &[TableSpec] = &[
    TableSpec {
        module: Module::Students,
        name: STUDENTS_TABLE,
        kind: TableKind::Master,
        header: &[
            "Student ID",
            "Name",
            "Class",
            "Section",
            "Roll No",
            "Parent Name",
            "Phone",
            "Address",
            "Photo URL",
            "Status",
        ],
    },
    TableSpec {
        module: Module::Students,
        name: ATTENDANCE_TABLE,
        kind: TableKind::Log,
        header: &["Date", "Student ID", "Class", "Status", "Marked By"],
    },
    TableSpec {
        module: Module::Fees,
        name: FEE_PAYMENTS_TABLE,
        kind: TableKind::Log,
        header: &["Receipt No", "Student ID", "Amount", "Date", "Mode", "Remarks"],
    },
    TableSpec {
        module: Module::Homework,
        name: HOMEWORK_TABLE,
        kind: TableKind::Log,
        header: &[
            "Homework ID",
            "Class",
            "Subject",
            "Title",
            "Description",
            "Due Date",
            "Attachment URL",
            "Posted By",
        ],
    },
    TableSpec {
        module: Module::Results,
        name: RESULTS_TABLE,
        kind: TableKind::Log,
        header: &["Exam", "Student ID", "Subject", "Marks", "Max Marks", "Grade"],
    },
    TableSpec {
        module: Module::Events,
        name: EVENTS_TABLE,
        kind: TableKind::Log,
        header: &["Event ID", "Title", "Date", "Description", "Image URL"],
    },
    TableSpec {
        module: Module::Expenses,
        name: EXPENSES_TABLE,
        kind: TableKind::Log,
        header: &[
            "Expense ID",
            "Date",
            "Category",
            "Amount",
            "Description",
            "Receipt URL",
        ],
    },
    TableSpec {
        module: Module::Staff,
        name: EMPLOYEES_TABLE,
        kind: TableKind::Master,
        header: &[
            "Employee ID",
            "Name",
            "Role",
            "Phone",
            "Email",
            "Joining Date",
            "Photo URL",
        ],
    },
    TableSpec {
        module: Module::Users,
        name: USERS_TABLE,
        kind: TableKind::Master,
        header: &["Username", "Role", "Linked ID", "Status"],
    },
    TableSpec {
        module: Module::Archive,
        name: ARCHIVE_TABLE,
        kind: TableKind::Log,
        header: ARCHIVE_HEADER,
    },
];

impl Module {
    /// All modules in provisioning order.
    pub const ALL: [Module; 9] = [
        Module::Students,
        Module::Fees,
        Module::Homework,
        Module::Results,
        Module::Events,
        Module::Expenses,
        Module::Staff,
        Module::Users,
        Module::Archive,
    ];

    /// Stable string id used in config keys and archive records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Fees => "fees",
            Self::Homework => "homework",
            Self::Results => "results",
            Self::Events => "events",
            Self::Expenses => "expenses",
            Self::Staff => "staff",
            Self::Users => "users",
            Self::Archive => "archive",
        }
    }

    /// Name of the container discovered inside a session folder.
    pub fn container_name(self) -> &'static str {
        match self {
            Self::Students => "Students_DB",
            Self::Fees => "Fees_DB",
            Self::Homework => "Homework_DB",
            Self::Results => "Results_DB",
            Self::Events => "Events_DB",
            Self::Expenses => "Expenses_DB",
            Self::Staff => "Staff_DB",
            Self::Users => "Users_DB",
            Self::Archive => "Archive_DB",
        }
    }

    /// Standard tables provisioned for this module in every session.
    pub fn standard_tables(self) -> impl Iterator<Item = &'static TableSpec> {
        TABLE_CATALOG.iter().filter(move |spec| spec.module == self)
    }

    /// Looks up one standard table of this module by name.
    pub fn table_spec(self, name: &str) -> Option<&'static TableSpec> {
        self.standard_tables().find(|spec| spec.name == name)
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the whole standard table catalog.
pub fn table_catalog() -> &'static [TableSpec] {
    TABLE_CATALOG
}

/// Master tables carried forward by a session rollover.
pub fn master_tables() -> impl Iterator<Item = &'static TableSpec> {
    TABLE_CATALOG
        .iter()
        .filter(|spec| spec.kind == TableKind::Master)
}

/// Parses a module from its stable string id (case-insensitive).
pub fn parse_module(value: &str) -> Result<Module, ModuleParseError> {
    let normalized = value.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(ModuleParseError::Empty);
    }
    Module::ALL
        .into_iter()
        .find(|module| module.as_str() == normalized)
        .ok_or(ModuleParseError::Unknown(normalized))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleParseError {
    Empty,
    Unknown(String),
}

impl Display for ModuleParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "module name must not be empty"),
            Self::Unknown(value) => write!(f, "unknown module: {value}"),
        }
    }
}

impl Error for ModuleParseError {}

#[cfg(test)]
mod tests {
    use super::{master_tables, parse_module, table_catalog, Module, ModuleParseError, TableKind};
    use std::collections::HashSet;

    #[test]
    fn container_names_are_unique() {
        let names: HashSet<_> = Module::ALL.iter().map(|m| m.container_name()).collect();
        assert_eq!(names.len(), Module::ALL.len());
    }

    #[test]
    fn every_module_has_a_standard_table() {
        for module in Module::ALL {
            assert!(module.standard_tables().next().is_some(), "{module}");
        }
    }

    #[test]
    fn master_list_is_the_identity_registries() {
        let masters: Vec<_> = master_tables().map(|spec| (spec.module, spec.name)).collect();
        assert_eq!(
            masters,
            vec![
                (Module::Students, "Students"),
                (Module::Staff, "Employees"),
                (Module::Users, "Users"),
            ]
        );
    }

    #[test]
    fn attendance_is_a_log_table_of_students() {
        let spec = Module::Students
            .table_spec("Attendance")
            .expect("attendance spec");
        assert_eq!(spec.kind, TableKind::Log);
        assert!(table_catalog().iter().all(|spec| !spec.header.is_empty()));
    }

    #[test]
    fn parse_module_is_case_insensitive() {
        assert_eq!(parse_module(" Students ").expect("parse"), Module::Students);
        assert_eq!(parse_module("").unwrap_err(), ModuleParseError::Empty);
        assert_eq!(
            parse_module("library").unwrap_err(),
            ModuleParseError::Unknown("library".to_string())
        );
    }
}
