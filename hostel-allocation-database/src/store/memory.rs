use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use super::HostelStore;
use crate::error::{Entity, HostelError};
use crate::models::{
    Bed, BedChangeRequest, Decision, NewBed, NewProfile, Profile, ProfileChanges, RequestStatus,
    RequestSubmission, Role,
};
use crate::rules;
use crate::views::{
    BedLabel, BedOwner, BedView, Overview, RequestStudent, RequestView, StudentView,
};

/// Keeps the three tables in maps behind one lock. Every operation takes the
/// lock once, so it observes and mutates a consistent snapshot.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A small hostel: one admin, two housed students, five beds in three rooms.
    pub fn with_demo_data() -> Result<Self, HostelError> {
        let mut state = State::default();
        state.insert_profile(NewProfile {
            username: "admin".to_owned(),
            full_name: "Hostel Admin".to_owned(),
            email: Some("admin@hostel.edu".to_owned()),
            contact_info: None,
            course: None,
            role: Role::Admin,
        })?;
        let john = state.insert_profile(NewProfile {
            username: "student".to_owned(),
            full_name: "John Smith".to_owned(),
            email: Some("john@student.com".to_owned()),
            contact_info: Some("+1234567890".to_owned()),
            course: Some("Computer Science".to_owned()),
            role: Role::Student,
        })?;
        let jane = state.insert_profile(NewProfile {
            username: "jdoe".to_owned(),
            full_name: "Jane Doe".to_owned(),
            email: None,
            contact_info: None,
            course: None,
            role: Role::Student,
        })?;
        let mut beds = Vec::new();
        for (room_number, bed_identifier) in
            [("101", "A"), ("101", "B"), ("102", "A"), ("102", "B"), ("103", "A")]
        {
            beds.push(state.insert_bed(NewBed {
                room_number: room_number.to_owned(),
                bed_identifier: bed_identifier.to_owned(),
            })?);
        }
        state.allocate(beds[0].id, john.id)?;
        state.allocate(beds[2].id, jane.id)?;
        info!("seeded in-memory store with demo data");
        Ok(Self {
            state: Mutex::new(state),
        })
    }
}

#[derive(Default)]
struct State {
    profiles: BTreeMap<i32, Profile>,
    beds: BTreeMap<i32, Bed>,
    requests: BTreeMap<i32, BedChangeRequest>,
}

/// Rows are never removed, so the next id is one past the largest key.
fn next_id<T>(table: &BTreeMap<i32, T>) -> i32 {
    table.keys().next_back().map_or(1, |id| id + 1)
}

impl State {
    fn live_profile(&self, profile_id: i32) -> Result<&Profile, HostelError> {
        self.profiles
            .get(&profile_id)
            .filter(|profile| !profile.deleted)
            .ok_or(HostelError::not_found(Entity::Student, profile_id))
    }

    fn bed(&self, bed_id: i32) -> Result<&Bed, HostelError> {
        self.beds
            .get(&bed_id)
            .ok_or(HostelError::not_found(Entity::Bed, bed_id))
    }

    fn owned_bed(&self, student_id: i32) -> Option<&Bed> {
        self.beds
            .values()
            .find(|bed| bed.allocated_to == Some(student_id))
    }

    fn requests_of(&self, student_id: i32) -> impl Iterator<Item = &BedChangeRequest> {
        self.requests
            .values()
            .filter(move |request| request.student_id == student_id)
    }

    fn active_request(&self, student_id: i32) -> Option<&BedChangeRequest> {
        self.requests_of(student_id)
            .find(|request| request.status.is_active())
    }

    fn insert_profile(&mut self, profile: NewProfile) -> Result<Profile, HostelError> {
        let profile = rules::validate_new_profile(&profile)?;
        // deleted profiles keep their username reserved
        if self
            .profiles
            .values()
            .any(|existing| existing.username == profile.username)
        {
            return Err(HostelError::conflict(format!(
                "username {} is already taken",
                profile.username
            )));
        }
        let now = Utc::now();
        let profile = Profile {
            id: next_id(&self.profiles),
            username: profile.username,
            full_name: profile.full_name,
            email: profile.email,
            contact_info: profile.contact_info,
            course: profile.course,
            role: profile.role,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    fn insert_bed(&mut self, bed: NewBed) -> Result<Bed, HostelError> {
        let bed = rules::validate_new_bed(&bed)?;
        if self.beds.values().any(|existing| {
            existing.room_number == bed.room_number && existing.bed_identifier == bed.bed_identifier
        }) {
            return Err(HostelError::conflict(format!(
                "bed {}-{} already exists",
                bed.room_number, bed.bed_identifier
            )));
        }
        let now = Utc::now();
        let bed = Bed {
            id: next_id(&self.beds),
            room_number: bed.room_number,
            bed_identifier: bed.bed_identifier,
            is_occupied: false,
            allocated_to: None,
            created_at: now,
            updated_at: now,
        };
        self.beds.insert(bed.id, bed.clone());
        Ok(bed)
    }

    fn set_owner(&mut self, bed_id: i32, owner: Option<i32>) -> Result<Bed, HostelError> {
        let bed = self
            .beds
            .get_mut(&bed_id)
            .ok_or(HostelError::not_found(Entity::Bed, bed_id))?;
        bed.allocated_to = owner;
        bed.is_occupied = owner.is_some();
        bed.updated_at = Utc::now();
        Ok(bed.clone())
    }

    fn allocate(&mut self, bed_id: i32, student_id: i32) -> Result<Bed, HostelError> {
        let student = self.live_profile(student_id)?;
        let bed = self.bed(bed_id)?;
        rules::check_allocation(bed, student, self.owned_bed(student_id))?;
        self.set_owner(bed_id, Some(student_id))
    }

    fn release(&mut self, bed_id: i32) -> Result<Bed, HostelError> {
        rules::check_deallocation(self.bed(bed_id)?)?;
        self.set_owner(bed_id, None)
    }

    fn bed_view(&self, bed: &Bed) -> BedView {
        BedView {
            bed: bed.clone(),
            owner: bed
                .allocated_to
                .and_then(|owner| self.profiles.get(&owner))
                .map(|owner| BedOwner {
                    id: owner.id,
                    full_name: owner.full_name.clone(),
                    username: owner.username.clone(),
                }),
        }
    }

    fn student_view(&self, profile: &Profile) -> StudentView {
        StudentView {
            profile: profile.clone(),
            allocated_bed: self.owned_bed(profile.id).map(BedLabel::from),
        }
    }
}

fn newest_first(left: &BedChangeRequest, right: &BedChangeRequest) -> core::cmp::Ordering {
    (right.created_at, right.id).cmp(&(left.created_at, left.id))
}

#[async_trait]
impl HostelStore for MemoryStore {
    async fn role(&self, profile_id: i32) -> Result<Role, HostelError> {
        let state = self.state.lock().await;
        Ok(state.live_profile(profile_id)?.role)
    }

    async fn create_bed(&self, bed: NewBed) -> Result<Bed, HostelError> {
        let mut state = self.state.lock().await;
        state.insert_bed(bed)
    }

    async fn list_beds(&self, vacant_only: bool) -> Result<Vec<BedView>, HostelError> {
        let state = self.state.lock().await;
        let mut beds: Vec<BedView> = state
            .beds
            .values()
            .filter(|bed| !(vacant_only && bed.is_occupied))
            .map(|bed| state.bed_view(bed))
            .collect();
        beds.sort_by(|left, right| {
            (&left.bed.room_number, &left.bed.bed_identifier)
                .cmp(&(&right.bed.room_number, &right.bed.bed_identifier))
        });
        Ok(beds)
    }

    async fn allocate(&self, bed_id: i32, student_id: i32) -> Result<Bed, HostelError> {
        let mut state = self.state.lock().await;
        state.allocate(bed_id, student_id)
    }

    async fn deallocate(&self, bed_id: i32) -> Result<Bed, HostelError> {
        let mut state = self.state.lock().await;
        state.release(bed_id)
    }

    async fn reallocate(&self, student_id: i32, bed_id: i32) -> Result<Bed, HostelError> {
        let mut state = self.state.lock().await;
        let student = state.live_profile(student_id)?;
        let bed = state.bed(bed_id)?;
        rules::check_target(bed, student)?;
        if let Some(owned) = state.owned_bed(student_id).map(|owned| owned.id) {
            state.set_owner(owned, None)?;
        }
        state.set_owner(bed_id, Some(student_id))
    }

    async fn create_student(
        &self,
        profile: NewProfile,
        bed_id: Option<i32>,
    ) -> Result<StudentView, HostelError> {
        let mut state = self.state.lock().await;
        let profile = rules::validate_new_profile(&profile)?;
        if let Some(bed_id) = bed_id {
            // check the bed before inserting so a failure leaves nothing behind
            if profile.role != Role::Student {
                return Err(HostelError::validation(format!(
                    "{} is not a student",
                    profile.username
                )));
            }
            let bed = state.bed(bed_id)?;
            if bed.is_occupied {
                return Err(HostelError::conflict(format!(
                    "bed {} is already occupied",
                    bed.label()
                )));
            }
        }
        let profile = state.insert_profile(profile)?;
        if let Some(bed_id) = bed_id {
            state.allocate(bed_id, profile.id)?;
        }
        Ok(state.student_view(&profile))
    }

    async fn update_student(
        &self,
        student_id: i32,
        changes: ProfileChanges,
    ) -> Result<Profile, HostelError> {
        let mut state = self.state.lock().await;
        rules::ensure_student(state.live_profile(student_id)?)?;
        let changes = rules::validate_changes(&changes)?;
        let profile = state
            .profiles
            .get_mut(&student_id)
            .ok_or(HostelError::not_found(Entity::Student, student_id))?;
        if let Some(full_name) = changes.full_name {
            profile.full_name = full_name;
        }
        if let Some(email) = changes.email {
            profile.email = email;
        }
        if let Some(contact_info) = changes.contact_info {
            profile.contact_info = contact_info;
        }
        if let Some(course) = changes.course {
            profile.course = course;
        }
        profile.updated_at = changes.updated_at;
        Ok(profile.clone())
    }

    async fn delete_student(&self, student_id: i32) -> Result<(), HostelError> {
        let mut state = self.state.lock().await;
        rules::ensure_student(state.live_profile(student_id)?)?;
        if let Some(owned) = state.owned_bed(student_id).map(|owned| owned.id) {
            state.set_owner(owned, None)?;
        }
        if let Some(profile) = state.profiles.get_mut(&student_id) {
            profile.deleted = true;
            profile.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_students(&self) -> Result<Vec<StudentView>, HostelError> {
        let state = self.state.lock().await;
        let mut students: Vec<StudentView> = state
            .profiles
            .values()
            .filter(|profile| profile.role == Role::Student && !profile.deleted)
            .map(|profile| state.student_view(profile))
            .collect();
        students.sort_by(|left, right| {
            (&left.profile.full_name, left.profile.id)
                .cmp(&(&right.profile.full_name, right.profile.id))
        });
        Ok(students)
    }

    async fn submit_request(
        &self,
        student_id: i32,
        submission: RequestSubmission,
    ) -> Result<BedChangeRequest, HostelError> {
        let mut state = self.state.lock().await;
        let submission = rules::validate_submission(&submission)?;
        let student = state.live_profile(student_id)?;
        rules::check_submission(student, state.active_request(student_id))?;
        if let Some(requested_bed_id) = submission.requested_bed_id {
            state.bed(requested_bed_id)?;
        }
        let now = Utc::now();
        let request = BedChangeRequest {
            id: next_id(&state.requests),
            student_id,
            current_bed_id: state.owned_bed(student_id).map(|bed| bed.id),
            requested_bed_id: submission.requested_bed_id,
            status: RequestStatus::Pending,
            reason: submission.reason,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn decide_request(
        &self,
        request_id: i32,
        decision: Decision,
    ) -> Result<BedChangeRequest, HostelError> {
        rules::check_decision_target(decision.status)?;
        let mut state = self.state.lock().await;
        let request = state
            .requests
            .get_mut(&request_id)
            .ok_or(HostelError::not_found(Entity::Request, request_id))?;
        rules::check_decision(request, decision.status)?;
        request.status = decision.status;
        if let Some(admin_notes) = decision.admin_notes {
            request.admin_notes = Some(admin_notes);
        }
        request.updated_at = decision.updated_at;
        Ok(request.clone())
    }

    async fn list_requests(&self) -> Result<Vec<RequestView>, HostelError> {
        let state = self.state.lock().await;
        let mut requests: Vec<&BedChangeRequest> = state.requests.values().collect();
        requests.sort_by(|left, right| newest_first(left, right));
        Ok(requests
            .into_iter()
            .map(|request| RequestView {
                request: request.clone(),
                student: RequestStudent {
                    id: request.student_id,
                    full_name: state
                        .profiles
                        .get(&request.student_id)
                        .map(|profile| profile.full_name.clone())
                        .unwrap_or_default(),
                },
                current_bed: request
                    .current_bed_id
                    .and_then(|bed_id| state.beds.get(&bed_id))
                    .map(BedLabel::from),
            })
            .collect())
    }

    async fn student_requests(
        &self,
        student_id: i32,
    ) -> Result<Vec<BedChangeRequest>, HostelError> {
        let state = self.state.lock().await;
        state.live_profile(student_id)?;
        let mut requests: Vec<BedChangeRequest> = state.requests_of(student_id).cloned().collect();
        requests.sort_by(newest_first);
        Ok(requests)
    }

    async fn overview(&self, profile_id: i32) -> Result<Overview, HostelError> {
        let state = self.state.lock().await;
        let profile = state.live_profile(profile_id)?.clone();
        let latest_request = state
            .requests_of(profile_id)
            .min_by(|left, right| newest_first(left, right))
            .cloned();
        Ok(Overview::new(
            profile,
            state.owned_bed(profile_id),
            latest_request,
            state.active_request(profile_id).is_some(),
        ))
    }
}
