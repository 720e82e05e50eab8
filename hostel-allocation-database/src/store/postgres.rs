use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

use super::HostelStore;
use crate::error::{Entity, HostelError};
use crate::models::{
    Bed, BedChangeRequest, Decision, NewBed, NewBedChangeRequest, NewProfile, Profile,
    ProfileChanges, RequestStatus, RequestSubmission, Role,
};
use crate::schema::{bed_change_requests, beds, profiles};
use crate::views::{
    BedLabel, BedOwner, BedView, Overview, RequestStudent, RequestView, StudentView,
};
use crate::{rules, Pool};

/// `(id, room_number, bed_identifier)` of a left joined bed.
type BedColumns = Option<(i32, String, String)>;

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

/// Selects a live profile `FOR UPDATE`, serializing everything done on behalf of one student.
async fn lock_profile(
    connection: &mut AsyncPgConnection,
    profile_id: i32,
) -> Result<Profile, HostelError> {
    profiles::table
        .filter(profiles::id.eq(profile_id))
        .filter(profiles::deleted.eq(false))
        .select(Profile::as_select())
        .for_update()
        .first(connection)
        .await
        .optional()?
        .ok_or(HostelError::not_found(Entity::Student, profile_id))
}

async fn lock_bed(connection: &mut AsyncPgConnection, bed_id: i32) -> Result<Bed, HostelError> {
    beds::table
        .filter(beds::id.eq(bed_id))
        .select(Bed::as_select())
        .for_update()
        .first(connection)
        .await
        .optional()?
        .ok_or(HostelError::not_found(Entity::Bed, bed_id))
}

/// Not locked: the caller holds the profile lock and `beds(allocated_to)` is unique.
async fn owned_bed(
    connection: &mut AsyncPgConnection,
    student_id: i32,
) -> Result<Option<Bed>, HostelError> {
    Ok(beds::table
        .filter(beds::allocated_to.eq(student_id))
        .select(Bed::as_select())
        .first(connection)
        .await
        .optional()?)
}

/// Compare-and-swap on the occupancy flag: only touches the bed if it is
/// still in the `occupied` state the caller decided on.
async fn swap_owner(
    connection: &mut AsyncPgConnection,
    bed_id: i32,
    occupied: bool,
    owner: Option<i32>,
) -> Result<Option<Bed>, HostelError> {
    Ok(diesel::update(
        beds::table
            .filter(beds::id.eq(bed_id))
            .filter(beds::is_occupied.eq(occupied)),
    )
    .set((
        beds::allocated_to.eq(owner),
        beds::is_occupied.eq(owner.is_some()),
        beds::updated_at.eq(Utc::now()),
    ))
    .returning(Bed::as_returning())
    .get_result(connection)
    .await
    .optional()?)
}

async fn release_owned(
    connection: &mut AsyncPgConnection,
    student_id: i32,
) -> Result<usize, HostelError> {
    Ok(
        diesel::update(beds::table.filter(beds::allocated_to.eq(student_id)))
            .set((
                beds::allocated_to.eq(None::<i32>),
                beds::is_occupied.eq(false),
                beds::updated_at.eq(Utc::now()),
            ))
            .execute(connection)
            .await?,
    )
}

fn occupied(bed: &Bed) -> HostelError {
    HostelError::conflict(format!("bed {} is already occupied", bed.label()))
}

async fn allocate_in(
    connection: &mut AsyncPgConnection,
    bed_id: i32,
    student_id: i32,
) -> Result<Bed, HostelError> {
    let student = lock_profile(connection, student_id).await?;
    let bed = lock_bed(connection, bed_id).await?;
    // reject an occupied target before reading any other bed
    rules::check_target(&bed, &student)?;
    let owned = owned_bed(connection, student_id).await?;
    rules::check_allocation(&bed, &student, owned.as_ref())?;
    swap_owner(connection, bed_id, false, Some(student_id))
        .await?
        .ok_or_else(|| occupied(&bed))
}

async fn active_request(
    connection: &mut AsyncPgConnection,
    student_id: i32,
) -> Result<Option<BedChangeRequest>, HostelError> {
    Ok(bed_change_requests::table
        .filter(bed_change_requests::student_id.eq(student_id))
        .filter(bed_change_requests::status.eq_any(RequestStatus::ACTIVE))
        .select(BedChangeRequest::as_select())
        .first(connection)
        .await
        .optional()?)
}

#[async_trait]
impl HostelStore for PgStore {
    async fn role(&self, profile_id: i32) -> Result<Role, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        profiles::table
            .filter(profiles::id.eq(profile_id))
            .filter(profiles::deleted.eq(false))
            .select(profiles::role)
            .first(connection)
            .await
            .optional()?
            .ok_or(HostelError::not_found(Entity::Student, profile_id))
    }

    async fn create_bed(&self, bed: NewBed) -> Result<Bed, HostelError> {
        let bed = rules::validate_new_bed(&bed)?;
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let bed = diesel::insert_into(beds::table)
            .values(&bed)
            .returning(Bed::as_returning())
            .get_result(connection)
            .await?;
        info!(bed = bed.id, label = %bed.label(), "created bed");
        Ok(bed)
    }

    async fn list_beds(&self, vacant_only: bool) -> Result<Vec<BedView>, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let mut query = beds::table
            .left_join(profiles::table)
            .select((
                Bed::as_select(),
                (profiles::id, profiles::full_name, profiles::username).nullable(),
            ))
            .order((beds::room_number.asc(), beds::bed_identifier.asc()))
            .into_boxed();
        if vacant_only {
            query = query.filter(beds::is_occupied.eq(false));
        }
        let rows: Vec<(Bed, Option<(i32, String, String)>)> = query.load(connection).await?;
        Ok(rows
            .into_iter()
            .map(|(bed, owner)| BedView {
                bed,
                owner: owner.map(|(id, full_name, username)| BedOwner {
                    id,
                    full_name,
                    username,
                }),
            })
            .collect())
    }

    async fn allocate(&self, bed_id: i32, student_id: i32) -> Result<Bed, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let bed = connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move { allocate_in(connection, bed_id, student_id).await }.scope_boxed()
            })
            .await?;
        info!(bed = bed.id, student = student_id, "allocated bed");
        Ok(bed)
    }

    async fn deallocate(&self, bed_id: i32) -> Result<Bed, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        if let Some(bed) = swap_owner(connection, bed_id, true, None).await? {
            info!(bed = bed.id, "deallocated bed");
            return Ok(bed);
        }
        let bed = beds::table
            .filter(beds::id.eq(bed_id))
            .select(Bed::as_select())
            .first(connection)
            .await
            .optional()?
            .ok_or(HostelError::not_found(Entity::Bed, bed_id))?;
        rules::check_deallocation(&bed)?;
        // freed and taken again between the two statements
        Err(HostelError::conflict(format!(
            "bed {} changed concurrently",
            bed.label()
        )))
    }

    async fn reallocate(&self, student_id: i32, bed_id: i32) -> Result<Bed, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let bed = connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move {
                    let student = lock_profile(connection, student_id).await?;
                    let bed = lock_bed(connection, bed_id).await?;
                    rules::check_target(&bed, &student)?;
                    release_owned(connection, student_id).await?;
                    swap_owner(connection, bed_id, false, Some(student_id))
                        .await?
                        .ok_or_else(|| occupied(&bed))
                }
                .scope_boxed()
            })
            .await?;
        info!(bed = bed.id, student = student_id, "reallocated student");
        Ok(bed)
    }

    async fn create_student(
        &self,
        profile: NewProfile,
        bed_id: Option<i32>,
    ) -> Result<StudentView, HostelError> {
        let profile = rules::validate_new_profile(&profile)?;
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let student = connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move {
                    let taken = diesel::select(exists(
                        profiles::table.filter(profiles::username.eq(&profile.username)),
                    ))
                    .get_result::<bool>(connection)
                    .await?;
                    if taken {
                        return Err(HostelError::conflict(format!(
                            "username {} is already taken",
                            profile.username
                        )));
                    }
                    let profile: Profile = diesel::insert_into(profiles::table)
                        .values(&profile)
                        .returning(Profile::as_returning())
                        .get_result(connection)
                        .await?;
                    let allocated_bed = match bed_id {
                        Some(bed_id) => Some(BedLabel::from(
                            &allocate_in(connection, bed_id, profile.id).await?,
                        )),
                        None => None,
                    };
                    Ok(StudentView {
                        profile,
                        allocated_bed,
                    })
                }
                .scope_boxed()
            })
            .await?;
        info!(student = student.profile.id, "created student");
        Ok(student)
    }

    async fn update_student(
        &self,
        student_id: i32,
        changes: ProfileChanges,
    ) -> Result<Profile, HostelError> {
        let changes = rules::validate_changes(&changes)?;
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move {
                    rules::ensure_student(&lock_profile(connection, student_id).await?)?;
                    Ok(
                        diesel::update(profiles::table.filter(profiles::id.eq(student_id)))
                            .set(&changes)
                            .returning(Profile::as_returning())
                            .get_result(connection)
                            .await?,
                    )
                }
                .scope_boxed()
            })
            .await
    }

    async fn delete_student(&self, student_id: i32) -> Result<(), HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move {
                    rules::ensure_student(&lock_profile(connection, student_id).await?)?;
                    release_owned(connection, student_id).await?;
                    diesel::update(profiles::table.filter(profiles::id.eq(student_id)))
                        .set((
                            profiles::deleted.eq(true),
                            profiles::updated_at.eq(Utc::now()),
                        ))
                        .execute(connection)
                        .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await?;
        info!(student = student_id, "deleted student");
        Ok(())
    }

    async fn list_students(&self) -> Result<Vec<StudentView>, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let rows: Vec<(Profile, BedColumns)> = profiles::table
            .left_join(beds::table)
            .filter(profiles::role.eq(Role::Student))
            .filter(profiles::deleted.eq(false))
            .select((
                Profile::as_select(),
                (beds::id, beds::room_number, beds::bed_identifier).nullable(),
            ))
            .order((profiles::full_name.asc(), profiles::id.asc()))
            .load(connection)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(profile, bed)| StudentView {
                profile,
                allocated_bed: bed.map(BedLabel::from),
            })
            .collect())
    }

    async fn submit_request(
        &self,
        student_id: i32,
        submission: RequestSubmission,
    ) -> Result<BedChangeRequest, HostelError> {
        let submission = rules::validate_submission(&submission)?;
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let request = connection
            .transaction::<_, HostelError, _>(move |connection| {
                async move {
                    let student = lock_profile(connection, student_id).await?;
                    let active = active_request(connection, student_id).await?;
                    rules::check_submission(&student, active.as_ref())?;
                    if let Some(requested_bed_id) = submission.requested_bed_id {
                        beds::table
                            .filter(beds::id.eq(requested_bed_id))
                            .select(beds::id)
                            .first::<i32>(connection)
                            .await
                            .optional()?
                            .ok_or(HostelError::not_found(Entity::Bed, requested_bed_id))?;
                    }
                    let current_bed_id = owned_bed(connection, student_id)
                        .await?
                        .map(|bed| bed.id);
                    Ok(diesel::insert_into(bed_change_requests::table)
                        .values(NewBedChangeRequest {
                            student_id,
                            current_bed_id,
                            requested_bed_id: submission.requested_bed_id,
                            status: RequestStatus::Pending,
                            reason: submission.reason,
                        })
                        .returning(BedChangeRequest::as_returning())
                        .get_result(connection)
                        .await?)
                }
                .scope_boxed()
            })
            .await?;
        info!(request = request.id, student = student_id, "submitted bed change request");
        Ok(request)
    }

    async fn decide_request(
        &self,
        request_id: i32,
        decision: Decision,
    ) -> Result<BedChangeRequest, HostelError> {
        rules::check_decision_target(decision.status)?;
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let updated = diesel::update(
            bed_change_requests::table
                .filter(bed_change_requests::id.eq(request_id))
                .filter(bed_change_requests::status.eq(RequestStatus::Pending)),
        )
        .set(&decision)
        .returning(BedChangeRequest::as_returning())
        .get_result(connection)
        .await
        .optional()?;
        if let Some(request) = updated {
            info!(request = request.id, status = %request.status, "decided bed change request");
            return Ok(request);
        }
        let current = bed_change_requests::table
            .filter(bed_change_requests::id.eq(request_id))
            .select(BedChangeRequest::as_select())
            .first(connection)
            .await
            .optional()?
            .ok_or(HostelError::not_found(Entity::Request, request_id))?;
        rules::check_decision(&current, decision.status)?;
        Err(HostelError::conflict(format!(
            "bed change request {request_id} changed concurrently"
        )))
    }

    async fn list_requests(&self) -> Result<Vec<RequestView>, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        let rows: Vec<(BedChangeRequest, String, BedColumns)> = bed_change_requests::table
            .inner_join(profiles::table)
            .left_join(
                beds::table.on(bed_change_requests::current_bed_id.eq(beds::id.nullable())),
            )
            .select((
                BedChangeRequest::as_select(),
                profiles::full_name,
                (beds::id, beds::room_number, beds::bed_identifier).nullable(),
            ))
            .order((
                bed_change_requests::created_at.desc(),
                bed_change_requests::id.desc(),
            ))
            .load(connection)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(request, full_name, bed)| RequestView {
                student: RequestStudent {
                    id: request.student_id,
                    full_name,
                },
                current_bed: bed.map(BedLabel::from),
                request,
            })
            .collect())
    }

    async fn student_requests(
        &self,
        student_id: i32,
    ) -> Result<Vec<BedChangeRequest>, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        Ok(bed_change_requests::table
            .filter(bed_change_requests::student_id.eq(student_id))
            .select(BedChangeRequest::as_select())
            .order((
                bed_change_requests::created_at.desc(),
                bed_change_requests::id.desc(),
            ))
            .load(connection)
            .await?)
    }

    async fn overview(&self, profile_id: i32) -> Result<Overview, HostelError> {
        let mut connection = self.pool.get().await?;
        let connection: &mut AsyncPgConnection = &mut connection;
        // one snapshot for the four reads
        connection
            .build_transaction()
            .read_only()
            .repeatable_read()
            .run(move |connection| {
                async move {
                    let profile: Profile = profiles::table
                        .filter(profiles::id.eq(profile_id))
                        .filter(profiles::deleted.eq(false))
                        .select(Profile::as_select())
                        .first(connection)
                        .await
                        .optional()?
                        .ok_or(HostelError::not_found(Entity::Student, profile_id))?;
                    let bed: Option<Bed> = beds::table
                        .filter(beds::allocated_to.eq(profile_id))
                        .select(Bed::as_select())
                        .first(connection)
                        .await
                        .optional()?;
                    let latest_request: Option<BedChangeRequest> = bed_change_requests::table
                        .filter(bed_change_requests::student_id.eq(profile_id))
                        .select(BedChangeRequest::as_select())
                        .order((
                            bed_change_requests::created_at.desc(),
                            bed_change_requests::id.desc(),
                        ))
                        .first(connection)
                        .await
                        .optional()?;
                    let has_active_request = diesel::select(exists(
                        bed_change_requests::table
                            .filter(bed_change_requests::student_id.eq(profile_id))
                            .filter(bed_change_requests::status.eq_any(RequestStatus::ACTIVE)),
                    ))
                    .get_result::<bool>(connection)
                    .await?;
                    Ok(Overview::new(
                        profile,
                        bed.as_ref(),
                        latest_request,
                        has_active_request,
                    ))
                }
                .scope_boxed()
            })
            .await
    }
}
