use hostel_allocation_database::models::RequestSubmission;
use hostel_allocation_database::HostelStore;

use super::Reply;
use crate::error::AppError;
use crate::permission::Actor;

pub async fn overview(store: &dyn HostelStore, actor: &Actor) -> Result<Reply, AppError> {
    Reply::ok(&store.overview(actor.profile_id).await?)
}

pub async fn requests(store: &dyn HostelStore, actor: &Actor) -> Result<Reply, AppError> {
    Reply::ok(&store.student_requests(actor.profile_id).await?)
}

pub async fn submit(
    store: &dyn HostelStore,
    actor: &Actor,
    submission: RequestSubmission,
) -> Result<Reply, AppError> {
    Reply::created(&store.submit_request(actor.profile_id, submission).await?)
}
