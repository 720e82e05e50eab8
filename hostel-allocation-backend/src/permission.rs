use core::fmt;

use hostel_allocation_database::models::Role;
use hostel_allocation_database::{HostelError, HostelStore};
use tracing::warn;

use crate::error::AppError;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewDashboard,
    ManageBeds,
    ManageStudents,
    ReviewRequests,
    ViewOwnOverview,
    SubmitRequests,
}

impl Permission {
    #[must_use]
    pub const fn granted_to(self, role: Role) -> bool {
        match role {
            Role::Admin => !matches!(self, Self::SubmitRequests),
            Role::Student => matches!(self, Self::ViewOwnOverview | Self::SubmitRequests),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ViewDashboard => "view the dashboard",
            Self::ManageBeds => "manage beds",
            Self::ManageStudents => "manage students",
            Self::ReviewRequests => "review bed change requests",
            Self::ViewOwnOverview => "view your overview",
            Self::SubmitRequests => "submit bed change requests",
        })
    }
}

/// The signed in profile behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub profile_id: i32,
    pub role: Role,
}

impl Actor {
    /// The role is looked up again for every request so a deleted or demoted
    /// profile loses access immediately.
    pub async fn authenticate(store: &dyn HostelStore, session: &Session) -> Result<Self, AppError> {
        let profile_id = session.profile_id().ok_or(AppError::Unauthenticated)?;
        match store.role(profile_id).await {
            Ok(role) => Ok(Self { profile_id, role }),
            Err(HostelError::NotFound { .. }) => Err(AppError::Unauthenticated),
            Err(error) => Err(error.into()),
        }
    }

    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if permission.granted_to(self.role) {
            Ok(())
        } else {
            warn!(profile = self.profile_id, role = %self.role, "missing permission to {permission}");
            Err(AppError::Forbidden(permission))
        }
    }
}
