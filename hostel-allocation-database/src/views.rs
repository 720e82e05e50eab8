//! Read models handed out by the stores, shaped for the admin and student screens.

use serde::Serialize;

use crate::models::{Bed, BedChangeRequest, Profile, RequestStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BedOwner {
    pub id: i32,
    pub full_name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BedLabel {
    pub id: i32,
    pub room_number: String,
    pub bed_identifier: String,
}

impl From<&Bed> for BedLabel {
    fn from(bed: &Bed) -> Self {
        Self {
            id: bed.id,
            room_number: bed.room_number.clone(),
            bed_identifier: bed.bed_identifier.clone(),
        }
    }
}

impl From<(i32, String, String)> for BedLabel {
    fn from((id, room_number, bed_identifier): (i32, String, String)) -> Self {
        Self {
            id,
            room_number,
            bed_identifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BedView {
    #[serde(flatten)]
    pub bed: Bed,
    pub owner: Option<BedOwner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentView {
    #[serde(flatten)]
    pub profile: Profile,
    pub allocated_bed: Option<BedLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStudent {
    pub id: i32,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: BedChangeRequest,
    pub student: RequestStudent,
    pub current_bed: Option<BedLabel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_beds: usize,
    pub allocated_beds: usize,
    pub vacant_beds: usize,
}

impl DashboardStats {
    pub fn from_beds<'a>(beds: impl IntoIterator<Item = &'a Bed>) -> Self {
        beds.into_iter().fold(Self::default(), |mut stats, bed| {
            stats.total_beds += 1;
            if bed.is_occupied {
                stats.allocated_beds += 1;
            } else {
                stats.vacant_beds += 1;
            }
            stats
        })
    }
}

/// The caller's own page: who they are, where they sleep, and their latest request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub profile: Profile,
    pub allocated_bed: Option<BedLabel>,
    pub latest_request: Option<BedChangeRequest>,
    pub can_submit_request: bool,
}

impl Overview {
    #[must_use]
    pub fn new(
        profile: Profile,
        allocated_bed: Option<&Bed>,
        latest_request: Option<BedChangeRequest>,
        has_active_request: bool,
    ) -> Self {
        let can_submit_request = profile.role == Role::Student && !has_active_request;
        Self {
            profile,
            allocated_bed: allocated_bed.map(BedLabel::from),
            latest_request,
            can_submit_request,
        }
    }

    #[must_use]
    pub fn latest_status(&self) -> Option<RequestStatus> {
        self.latest_request.as_ref().map(|request| request.status)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn student_view_flattens_the_profile() {
        let now = Utc::now();
        let view = StudentView {
            profile: Profile {
                id: 2,
                username: "jdoe".to_owned(),
                full_name: "John Doe".to_owned(),
                email: None,
                contact_info: None,
                course: Some("Physics".to_owned()),
                role: Role::Student,
                deleted: false,
                created_at: now,
                updated_at: now,
            },
            allocated_bed: Some(BedLabel {
                id: 5,
                room_number: "103".to_owned(),
                bed_identifier: "A".to_owned(),
            }),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["username"], "jdoe");
        assert_eq!(json["role"], "student");
        assert_eq!(json["allocated_bed"]["room_number"], "103");
        assert!(json.get("deleted").is_none());
        assert!(json.get("profile").is_none());
    }
}
