use serde::{Deserialize, Serialize};

use super::text_enum;

/// Staff role carried by a connection and by the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    StandLead,
    Supervisor,
    DepartmentManager,
    OperationsManager,
    Executive,
    External,
    Responder,
    #[serde(other)]
    Staff,
}

text_enum!(Role {
    StandLead => "stand_lead",
    Supervisor => "supervisor",
    DepartmentManager => "department_manager",
    OperationsManager => "operations_manager",
    Executive => "executive",
    External => "external",
    Responder => "responder",
    Staff => "staff",
});

/// Roles that receive every new alert regardless of escalation level.
pub const SUPERVISORY_ROLES: &[Role] = &[
    Role::StandLead,
    Role::Supervisor,
    Role::DepartmentManager,
    Role::OperationsManager,
];

impl Role {
    pub fn is_supervisory(&self) -> bool {
        SUPERVISORY_ROLES.contains(self)
    }

    /// Lenient parse for rows written by other subsystems.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(Role::Staff)
    }
}
