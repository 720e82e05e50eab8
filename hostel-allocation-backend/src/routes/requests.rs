use hostel_allocation_database::models::{Decision, RequestStatus};
use hostel_allocation_database::{rules, HostelStore};
use serde::Deserialize;

use super::Reply;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct DecisionForm {
    pub status: RequestStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn list(store: &dyn HostelStore) -> Result<Reply, AppError> {
    Reply::ok(&store.list_requests().await?)
}

pub async fn decide(
    store: &dyn HostelStore,
    request_id: i32,
    form: DecisionForm,
) -> Result<Reply, AppError> {
    let decision = Decision::new(form.status, rules::optional(form.admin_notes.as_deref()));
    Reply::ok(&store.decide_request(request_id, decision).await?)
}
