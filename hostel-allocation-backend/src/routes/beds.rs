use hostel_allocation_database::models::NewBed;
use hostel_allocation_database::HostelStore;
use serde::Deserialize;

use super::Reply;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct AllocateBed {
    pub student_id: i32,
}

pub async fn list(store: &dyn HostelStore, vacant_only: bool) -> Result<Reply, AppError> {
    Reply::ok(&store.list_beds(vacant_only).await?)
}

pub async fn create(store: &dyn HostelStore, bed: NewBed) -> Result<Reply, AppError> {
    Reply::created(&store.create_bed(bed).await?)
}

pub async fn allocate(
    store: &dyn HostelStore,
    bed_id: i32,
    AllocateBed { student_id }: AllocateBed,
) -> Result<Reply, AppError> {
    Reply::ok(&store.allocate(bed_id, student_id).await?)
}

pub async fn deallocate(store: &dyn HostelStore, bed_id: i32) -> Result<Reply, AppError> {
    Reply::ok(&store.deallocate(bed_id).await?)
}
