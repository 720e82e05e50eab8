//! Preconditions shared by every store. Each store evaluates them while it
//! holds the rows involved (row locks in PostgreSQL, the state lock in
//! memory), so the check and the write that follows it are one atomic step.

use crate::error::HostelError;
use crate::models::{
    Bed, BedChangeRequest, NewBed, NewProfile, Profile, ProfileChanges, RequestStatus,
    RequestSubmission, Role,
};

/// Trims `value` and rejects it if nothing is left.
pub fn required(field: &str, value: &str) -> Result<String, HostelError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(HostelError::validation(format!("{field} is required")));
    }
    Ok(value.to_owned())
}

/// Blank optional text is stored as `NULL`.
#[must_use]
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub fn validate_new_bed(bed: &NewBed) -> Result<NewBed, HostelError> {
    Ok(NewBed {
        room_number: required("room_number", &bed.room_number)?,
        bed_identifier: required("bed_identifier", &bed.bed_identifier)?,
    })
}

pub fn validate_new_profile(profile: &NewProfile) -> Result<NewProfile, HostelError> {
    Ok(NewProfile {
        username: required("username", &profile.username)?,
        full_name: required("full_name", &profile.full_name)?,
        email: optional(profile.email.as_deref()),
        contact_info: optional(profile.contact_info.as_deref()),
        course: optional(profile.course.as_deref()),
        role: profile.role,
    })
}

pub fn validate_changes(changes: &ProfileChanges) -> Result<ProfileChanges, HostelError> {
    let clear_blank = |value: &Option<Option<String>>| {
        value
            .as_ref()
            .map(|inner| optional(inner.as_deref()))
    };
    Ok(ProfileChanges {
        full_name: changes
            .full_name
            .as_deref()
            .map(|full_name| required("full_name", full_name))
            .transpose()?,
        email: clear_blank(&changes.email),
        contact_info: clear_blank(&changes.contact_info),
        course: clear_blank(&changes.course),
        updated_at: changes.updated_at,
    })
}

pub fn validate_submission(submission: &RequestSubmission) -> Result<RequestSubmission, HostelError> {
    Ok(RequestSubmission {
        reason: required("reason", &submission.reason)?,
        requested_bed_id: submission.requested_bed_id,
    })
}

pub fn ensure_student(profile: &Profile) -> Result<(), HostelError> {
    if profile.role != Role::Student {
        return Err(HostelError::validation(format!(
            "{} is not a student",
            profile.username
        )));
    }
    Ok(())
}

/// `owned` is the bed currently referencing `student`, if any.
pub fn check_allocation(bed: &Bed, student: &Profile, owned: Option<&Bed>) -> Result<(), HostelError> {
    check_target(bed, student)?;
    if let Some(owned) = owned {
        return Err(HostelError::conflict(format!(
            "{} already holds bed {}",
            student.username,
            owned.label()
        )));
    }
    Ok(())
}

/// The bed a student is allocated or moved to must be free.
pub fn check_target(bed: &Bed, student: &Profile) -> Result<(), HostelError> {
    ensure_student(student)?;
    if bed.is_occupied {
        return Err(HostelError::conflict(format!(
            "bed {} is already occupied",
            bed.label()
        )));
    }
    Ok(())
}

pub fn check_deallocation(bed: &Bed) -> Result<(), HostelError> {
    if !bed.is_occupied {
        return Err(HostelError::conflict(format!(
            "bed {} is not occupied",
            bed.label()
        )));
    }
    Ok(())
}

pub fn check_submission(
    student: &Profile,
    active: Option<&BedChangeRequest>,
) -> Result<(), HostelError> {
    ensure_student(student)?;
    if let Some(active) = active {
        return Err(HostelError::conflict(format!(
            "{} already has a bed change request that is {}",
            student.username, active.status
        )));
    }
    Ok(())
}

pub fn check_decision_target(status: RequestStatus) -> Result<(), HostelError> {
    if status == RequestStatus::Pending {
        return Err(HostelError::validation(
            "a decision must approve or reject the request",
        ));
    }
    Ok(())
}

pub fn check_decision(request: &BedChangeRequest, status: RequestStatus) -> Result<(), HostelError> {
    check_decision_target(status)?;
    if request.status != RequestStatus::Pending {
        return Err(HostelError::conflict(format!(
            "bed change request {} was already {}",
            request.id, request.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn bed(id: i32, owner: Option<i32>) -> Bed {
        Bed {
            id,
            room_number: "101".to_owned(),
            bed_identifier: "A".to_owned(),
            is_occupied: owner.is_some(),
            allocated_to: owner,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn profile(id: i32, role: Role) -> Profile {
        Profile {
            id,
            username: format!("user{id}"),
            full_name: format!("User {id}"),
            email: None,
            contact_info: None,
            course: None,
            role,
            deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request(status: RequestStatus) -> BedChangeRequest {
        BedChangeRequest {
            id: 7,
            student_id: 1,
            current_bed_id: None,
            requested_bed_id: None,
            status,
            reason: "noise".to_owned(),
            admin_notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn required_fields_are_trimmed() {
        assert_eq!(required("reason", "  noise ").unwrap(), "noise");
        assert!(matches!(
            required("reason", "   "),
            Err(HostelError::Validation(message)) if message == "reason is required"
        ));
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" a@b.c ")), Some("a@b.c".to_owned()));
    }

    #[test]
    fn occupied_bed_cannot_be_allocated() {
        let result = check_allocation(&bed(1, Some(2)), &profile(3, Role::Student), None);
        assert!(matches!(result, Err(HostelError::Conflict(_))));
    }

    #[test]
    fn student_cannot_hold_two_beds() {
        let owned = bed(2, Some(3));
        let result = check_allocation(&bed(1, None), &profile(3, Role::Student), Some(&owned));
        assert!(matches!(result, Err(HostelError::Conflict(_))));
        assert!(check_allocation(&bed(1, None), &profile(3, Role::Student), None).is_ok());
    }

    #[test]
    fn admins_do_not_get_beds() {
        let result = check_allocation(&bed(1, None), &profile(3, Role::Admin), None);
        assert!(matches!(result, Err(HostelError::Validation(_))));
    }

    #[test]
    fn vacant_bed_cannot_be_deallocated() {
        assert!(matches!(
            check_deallocation(&bed(1, None)),
            Err(HostelError::Conflict(_))
        ));
        assert!(check_deallocation(&bed(1, Some(3))).is_ok());
    }

    #[test]
    fn one_active_request_per_student() {
        let student = profile(1, Role::Student);
        assert!(check_submission(&student, None).is_ok());
        for status in RequestStatus::ACTIVE {
            assert!(matches!(
                check_submission(&student, Some(&request(status))),
                Err(HostelError::Conflict(_))
            ));
        }
    }

    #[test]
    fn only_pending_requests_are_decided() {
        let pending = request(RequestStatus::Pending);
        assert!(check_decision(&pending, RequestStatus::Approved).is_ok());
        assert!(check_decision(&pending, RequestStatus::Rejected).is_ok());
        assert!(matches!(
            check_decision(&pending, RequestStatus::Pending),
            Err(HostelError::Validation(_))
        ));
        for terminal in [RequestStatus::Approved, RequestStatus::Rejected] {
            assert!(matches!(
                check_decision(&request(terminal), RequestStatus::Rejected),
                Err(HostelError::Conflict(_))
            ));
        }
    }

    #[test]
    fn blank_changes_clear_optional_fields() {
        let changes = ProfileChanges {
            email: Some(Some("  ".to_owned())),
            course: Some(Some("Physics".to_owned())),
            ..ProfileChanges::new()
        };
        let changes = validate_changes(&changes).unwrap();
        assert_eq!(changes.email, Some(None));
        assert_eq!(changes.course, Some(Some("Physics".to_owned())));
        assert_eq!(changes.contact_info, None);

        let blank_name = ProfileChanges {
            full_name: Some(String::new()),
            ..ProfileChanges::new()
        };
        assert!(validate_changes(&blank_name).is_err());
    }
}
