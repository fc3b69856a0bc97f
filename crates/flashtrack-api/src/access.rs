//! Role and tenant checks applied before any domain operation.

use flashtrack_db::models::AccountRow;
use flashtrack_types::models::Role;

use crate::error::AccessError;

/// The authenticated account behind a request, as currently stored.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub society_id: i64,
}

impl Caller {
    pub fn from_row(row: AccountRow) -> anyhow::Result<Self> {
        let role = row.role()?;
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            society_id: row.society_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateComplaint,
    AssignStaff,
    ResolveComplaint,
    SubmitFeedback,
    ViewSocietyFeedback,
    ListStaff,
    ViewPoints,
}

impl Action {
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Self::CreateComplaint | Self::SubmitFeedback => &[Role::Resident],
            Self::AssignStaff | Self::ViewSocietyFeedback | Self::ListStaff => &[Role::Admin],
            Self::ResolveComplaint | Self::ViewPoints => &[Role::Staff],
        }
    }
}

pub fn authorize(caller: &Caller, action: Action) -> Result<(), AccessError> {
    if action.allowed_roles().contains(&caller.role) {
        Ok(())
    } else {
        Err(AccessError::WrongRole(caller.role))
    }
}

pub fn require_tenant(caller: &Caller, society_id: i64) -> Result<(), AccessError> {
    if caller.society_id == society_id {
        Ok(())
    } else {
        Err(AccessError::WrongTenant)
    }
}

pub fn require_owner(caller: &Caller, owner_id: i64) -> Result<(), AccessError> {
    if caller.id == owner_id {
        Ok(())
    } else {
        Err(AccessError::NotOwner)
    }
}
