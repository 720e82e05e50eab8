use hostel_allocation_database::HostelStore;

use super::Reply;
use crate::error::AppError;

pub async fn show(store: &dyn HostelStore) -> Result<Reply, AppError> {
    Reply::ok(&store.dashboard().await?)
}
