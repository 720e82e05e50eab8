pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::HostelError;
use crate::models::{
    Bed, BedChangeRequest, Decision, NewBed, NewProfile, Profile, ProfileChanges, RequestSubmission,
    Role,
};
use crate::views::{BedView, DashboardStats, Overview, RequestView, StudentView};

/// The persistence boundary. Every mutating method is a single atomic step:
/// implementations check the preconditions in [`crate::rules`] and write
/// while holding the rows involved, so concurrent callers cannot interleave
/// between the check and the write.
#[async_trait]
pub trait HostelStore: Send + Sync {
    /// Role of a profile that has not been deleted.
    async fn role(&self, profile_id: i32) -> Result<Role, HostelError>;

    async fn create_bed(&self, bed: NewBed) -> Result<Bed, HostelError>;

    /// Beds ordered by room number and label.
    async fn list_beds(&self, vacant_only: bool) -> Result<Vec<BedView>, HostelError>;

    async fn dashboard(&self) -> Result<DashboardStats, HostelError> {
        let beds = self.list_beds(false).await?;
        Ok(DashboardStats::from_beds(beds.iter().map(|view| &view.bed)))
    }

    async fn allocate(&self, bed_id: i32, student_id: i32) -> Result<Bed, HostelError>;

    async fn deallocate(&self, bed_id: i32) -> Result<Bed, HostelError>;

    /// Releases whatever bed the student holds and allocates `bed_id` instead.
    async fn reallocate(&self, student_id: i32, bed_id: i32) -> Result<Bed, HostelError>;

    /// Creates the profile and, if `bed_id` is given, allocates it. Either both happen or neither.
    async fn create_student(
        &self,
        profile: NewProfile,
        bed_id: Option<i32>,
    ) -> Result<StudentView, HostelError>;

    async fn update_student(
        &self,
        student_id: i32,
        changes: ProfileChanges,
    ) -> Result<Profile, HostelError>;

    /// Releases the student's bed and soft deletes the profile. Requests stay.
    async fn delete_student(&self, student_id: i32) -> Result<(), HostelError>;

    /// Students that are not deleted, ordered by full name.
    async fn list_students(&self) -> Result<Vec<StudentView>, HostelError>;

    async fn submit_request(
        &self,
        student_id: i32,
        submission: RequestSubmission,
    ) -> Result<BedChangeRequest, HostelError>;

    /// Never touches beds, an approved request still needs a manual allocation.
    async fn decide_request(
        &self,
        request_id: i32,
        decision: Decision,
    ) -> Result<BedChangeRequest, HostelError>;

    /// Newest first.
    async fn list_requests(&self) -> Result<Vec<RequestView>, HostelError>;

    /// Newest first.
    async fn student_requests(&self, student_id: i32)
        -> Result<Vec<BedChangeRequest>, HostelError>;

    async fn overview(&self, profile_id: i32) -> Result<Overview, HostelError>;
}
