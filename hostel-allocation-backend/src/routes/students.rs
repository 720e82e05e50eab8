use hostel_allocation_database::models::{NewProfile, ProfileChanges, Role};
use hostel_allocation_database::HostelStore;
use http::StatusCode;
use serde::{Deserialize, Deserializer};

use super::Reply;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct CreateStudent {
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub bed_id: Option<i32>,
}

/// Distinguishes an explicit `null` (clear the field) from a missing key (keep it).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Default)]
pub struct UpdateStudent {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub contact_info: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub course: Option<Option<String>>,
}

impl From<UpdateStudent> for ProfileChanges {
    fn from(update: UpdateStudent) -> Self {
        Self {
            full_name: update.full_name,
            email: update.email,
            contact_info: update.contact_info,
            course: update.course,
            ..Self::new()
        }
    }
}

#[derive(Deserialize)]
pub struct Reallocate {
    pub bed_id: i32,
}

pub async fn list(store: &dyn HostelStore) -> Result<Reply, AppError> {
    Reply::ok(&store.list_students().await?)
}

pub async fn create(store: &dyn HostelStore, form: CreateStudent) -> Result<Reply, AppError> {
    let profile = NewProfile {
        username: form.username,
        full_name: form.full_name,
        email: form.email,
        contact_info: form.contact_info,
        course: form.course,
        role: Role::Student,
    };
    Reply::created(&store.create_student(profile, form.bed_id).await?)
}

pub async fn update(
    store: &dyn HostelStore,
    student_id: i32,
    form: UpdateStudent,
) -> Result<Reply, AppError> {
    Reply::ok(&store.update_student(student_id, form.into()).await?)
}

pub async fn delete(store: &dyn HostelStore, student_id: i32) -> Result<Reply, AppError> {
    store.delete_student(student_id).await?;
    Ok(Reply::empty(StatusCode::NO_CONTENT))
}

pub async fn reallocate(
    store: &dyn HostelStore,
    student_id: i32,
    Reallocate { bed_id }: Reallocate,
) -> Result<Reply, AppError> {
    Reply::ok(&store.reallocate(student_id, bed_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_clears_and_missing_keeps() {
        let update: UpdateStudent =
            serde_json::from_str(r#"{"email": null, "course": "Physics"}"#).unwrap();
        let changes = ProfileChanges::from(update);
        assert_eq!(changes.email, Some(None));
        assert_eq!(changes.course, Some(Some("Physics".to_owned())));
        assert_eq!(changes.contact_info, None);
        assert_eq!(changes.full_name, None);
    }
}
