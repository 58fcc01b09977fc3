//! # Principals and Permissions
//!
//! The engine receives an already-authenticated [`Principal`] and only
//! performs role checks and branch scoping.
//!
//! ## Permission Matrix
//! ```text
//! ┌──────────────────────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//! │                      │ DEV │ OWN │ ADM │ CSH │ DLV │ CCA │ CCU │
//! ├──────────────────────┼─────┼─────┼─────┼─────┼─────┼─────┼─────┤
//! │ CreateOrder          │  ✓  │  ✓  │  ✓  │  ✓  │     │  ✓  │  ✓  │
//! │ UpdateOrder          │  ✓  │  ✓  │  ✓  │  ✓  │  ✓  │  ✓  │  ✓  │
//! │ Dispatch             │  ✓  │  ✓  │  ✓  │  ✓  │     │  ✓  │  ✓  │
//! │ Settle               │     │     │  ✓  │  ✓  │     │     │     │
//! │ CloseShift           │     │     │  ✓  │     │     │     │     │
//! │ ViewShift            │  ✓  │  ✓  │  ✓  │  ✓  │     │  ✓  │  ✓  │
//! └──────────────────────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//! ```
//!
//! Call-center roles work across branches and name the target branch on
//! each request; everyone else is pinned to their own branch.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::OrderSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Developer,
    Owner,
    Admin,
    Cashier,
    Delivery,
    CallCenterAdmin,
    CallCenterUser,
}

impl Role {
    pub fn is_call_center(self) -> bool {
        matches!(self, Role::CallCenterAdmin | Role::CallCenterUser)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Developer => "DEVELOPER",
            Role::Owner => "OWNER",
            Role::Admin => "ADMIN",
            Role::Cashier => "CASHIER",
            Role::Delivery => "DELIVERY",
            Role::CallCenterAdmin => "CALL_CENTER_ADMIN",
            Role::CallCenterUser => "CALL_CENTER_USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    CreateOrder,
    UpdateOrder,
    Dispatch,
    Settle,
    CloseShift,
    ViewShift,
}

impl Permission {
    pub fn allows(self, role: Role) -> bool {
        match self {
            Permission::UpdateOrder => true,
            Permission::CreateOrder | Permission::Dispatch | Permission::ViewShift => {
                role != Role::Delivery
            }
            Permission::Settle => matches!(role, Role::Cashier | Role::Admin),
            Permission::CloseShift => role == Role::Admin,
        }
    }

    /// Human-readable verb used in authorization errors.
    pub const fn action(self) -> &'static str {
        match self {
            Permission::CreateOrder => "create orders",
            Permission::UpdateOrder => "update orders",
            Permission::Dispatch => "dispatch deliveries",
            Permission::Settle => "settle deliveries",
            Permission::CloseShift => "close shifts",
            Permission::ViewShift => "view shifts",
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(
        tenant_id: impl Into<String>,
        branch_id: Option<String>,
        user_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Principal {
            tenant_id: tenant_id.into(),
            branch_id,
            user_id: user_id.into(),
            role,
        }
    }

    pub fn authorize(&self, permission: Permission) -> CoreResult<()> {
        if permission.allows(self.role) {
            Ok(())
        } else {
            Err(CoreError::unauthorized(self.role, permission.action()))
        }
    }

    pub fn order_source(&self) -> OrderSource {
        if self.role.is_call_center() {
            OrderSource::CallCenter
        } else {
            OrderSource::Cashier
        }
    }

    /// The principal's own branch.
    pub fn home_branch(&self) -> CoreResult<&str> {
        self.branch_id.as_deref().ok_or_else(|| {
            ValidationError::Required {
                field: "branchId".to_string(),
            }
            .into()
        })
    }

    /// Branch a write targets.
    ///
    /// Call-center roles must name it (falling back to their own branch, if
    /// they have one); other roles always write to their own branch.
    pub fn target_branch(&self, requested: Option<&str>) -> CoreResult<String> {
        if self.role.is_call_center() {
            match requested.filter(|b| !b.trim().is_empty()) {
                Some(branch) => Ok(branch.to_string()),
                None => self.home_branch().map(str::to_string),
            }
        } else {
            self.home_branch().map(str::to_string)
        }
    }

    /// Branch filter for reads: `None` means tenant-wide.
    pub fn branch_scope(&self) -> Option<&str> {
        if self.role.is_call_center() {
            None
        } else {
            self.branch_id.as_deref()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
