//! Runs against the database in `DATABASE_URL`, e.g.
//! `DATABASE_URL=postgres://postgres@localhost/hostel cargo test -- --ignored`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hostel_allocation_database::models::{
    Decision, NewBed, NewProfile, RequestStatus, RequestSubmission, Role,
};
use hostel_allocation_database::{
    get_database_connection_from_env, run_migrations, HostelError, HostelStore, PgStore,
};

/// Every test works on its own rows so runs don't interfere.
fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

async fn store() -> PgStore {
    let pool = get_database_connection_from_env().unwrap();
    run_migrations(&pool).await.unwrap();
    PgStore::new(pool)
}

fn student(username: String) -> NewProfile {
    NewProfile {
        full_name: format!("Student {username}"),
        username,
        email: None,
        contact_info: None,
        course: None,
        role: Role::Student,
    }
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn allocation_and_request_scenario() {
    let store = store().await;
    let room = unique("room");
    let bed = store
        .create_bed(NewBed {
            room_number: room.clone(),
            bed_identifier: "A".to_owned(),
        })
        .await
        .unwrap();
    let first = store
        .create_student(student(unique("s1")), None)
        .await
        .unwrap()
        .profile;
    let second = store
        .create_student(student(unique("s2")), None)
        .await
        .unwrap()
        .profile;

    let allocated = store.allocate(bed.id, first.id).await.unwrap();
    assert!(allocated.is_occupied);
    assert_eq!(allocated.allocated_to, Some(first.id));
    assert!(matches!(
        store.allocate(bed.id, second.id).await,
        Err(HostelError::Conflict(_))
    ));

    let request = store
        .submit_request(
            first.id,
            RequestSubmission {
                reason: "noise".to_owned(),
                requested_bed_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_bed_id, Some(bed.id));
    assert!(matches!(
        store
            .submit_request(
                first.id,
                RequestSubmission {
                    reason: "noise".to_owned(),
                    requested_bed_id: None,
                },
            )
            .await,
        Err(HostelError::Conflict(_))
    ));

    let rejected = store
        .decide_request(
            request.id,
            Decision::new(RequestStatus::Rejected, Some("no availability".to_owned())),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    let overview = store.overview(first.id).await.unwrap();
    assert_eq!(overview.allocated_bed.map(|bed| bed.id), Some(bed.id));
    assert!(overview.can_submit_request);

    let freed = store.deallocate(bed.id).await.unwrap();
    assert!(!freed.is_occupied);
    assert!(matches!(
        store.deallocate(bed.id).await,
        Err(HostelError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn concurrent_allocations_have_one_winner() {
    let store = Arc::new(store().await);
    let bed = store
        .create_bed(NewBed {
            room_number: unique("race"),
            bed_identifier: "A".to_owned(),
        })
        .await
        .unwrap();
    let mut students = Vec::new();
    for index in 0..8 {
        students.push(
            store
                .create_student(student(unique(&format!("racer{index}"))), None)
                .await
                .unwrap()
                .profile
                .id,
        );
    }

    let bed_id = bed.id;
    let attempts: Vec<_> = students
        .into_iter()
        .map(|student_id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.allocate(bed_id, student_id).await })
        })
        .collect();
    let mut winners = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => winners += 1,
            Err(HostelError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(winners, 1);
}

async fn bed(store: &PgStore, room: &str) -> i32 {
    store
        .create_bed(NewBed {
            room_number: unique(room),
            bed_identifier: "A".to_owned(),
        })
        .await
        .unwrap()
        .id
}

async fn new_student(store: &PgStore, prefix: &str, bed_id: Option<i32>) -> i32 {
    store
        .create_student(student(unique(prefix)), bed_id)
        .await
        .unwrap()
        .profile
        .id
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn failed_create_student_leaves_no_profile() {
    let store = store().await;
    let taken = bed(&store, "taken").await;
    new_student(&store, "holder", Some(taken)).await;

    let username = unique("late");
    assert!(matches!(
        store.create_student(student(username.clone()), Some(taken)).await,
        Err(HostelError::Conflict(_))
    ));
    let students = store.list_students().await.unwrap();
    assert!(students
        .iter()
        .all(|view| view.profile.username != username));
    // the username is still free, so nothing was committed
    store
        .create_student(student(username), None)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn reallocate_moves_in_one_step() {
    let store = store().await;
    let old = bed(&store, "old").await;
    let new = bed(&store, "new").await;
    let student_id = new_student(&store, "mover", Some(old)).await;

    let moved = store.reallocate(student_id, new).await.unwrap();
    assert_eq!(moved.id, new);
    assert_eq!(moved.allocated_to, Some(student_id));

    let beds = store.list_beds(true).await.unwrap();
    assert!(beds.iter().any(|view| view.bed.id == old));
    assert!(beds.iter().all(|view| view.bed.id != new));

    // an occupied target leaves the student where they are
    let other = new_student(&store, "blocker", Some(old)).await;
    assert!(matches!(
        store.reallocate(other, new).await,
        Err(HostelError::Conflict(_))
    ));
    let overview = store.overview(other).await.unwrap();
    assert_eq!(overview.allocated_bed.map(|bed| bed.id), Some(old));
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn delete_student_frees_the_bed_and_keeps_requests() {
    let store = store().await;
    let held = bed(&store, "held").await;
    let student_id = new_student(&store, "leaver", Some(held)).await;
    let request = store
        .submit_request(
            student_id,
            RequestSubmission {
                reason: "moving out".to_owned(),
                requested_bed_id: None,
            },
        )
        .await
        .unwrap();

    store.delete_student(student_id).await.unwrap();

    let vacant = store.list_beds(true).await.unwrap();
    assert!(vacant.iter().any(|view| view.bed.id == held));
    let requests = store.student_requests(student_id).await.unwrap();
    assert_eq!(requests.iter().map(|listed| listed.id).collect::<Vec<_>>(), [request.id]);
    assert!(matches!(
        store.role(student_id).await,
        Err(HostelError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete_student(student_id).await,
        Err(HostelError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn deciding_twice_is_a_conflict() {
    let store = store().await;
    let student_id = new_student(&store, "decided", None).await;
    let request = store
        .submit_request(
            student_id,
            RequestSubmission {
                reason: "window".to_owned(),
                requested_bed_id: None,
            },
        )
        .await
        .unwrap();

    let approved = store
        .decide_request(request.id, Decision::new(RequestStatus::Approved, None))
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert!(matches!(
        store
            .decide_request(request.id, Decision::new(RequestStatus::Rejected, None))
            .await,
        Err(HostelError::Conflict(_))
    ));
    assert!(matches!(
        store
            .decide_request(i32::MAX, Decision::new(RequestStatus::Rejected, None))
            .await,
        Err(HostelError::NotFound { .. })
    ));
}

#[tokio::test]
#[ignore = "needs a running postgres, see DATABASE_URL"]
async fn crossed_allocations_are_conflicts() {
    let store = Arc::new(store().await);
    let first_bed = bed(&store, "cross").await;
    let second_bed = bed(&store, "cross").await;
    let first = new_student(&store, "crossa", Some(first_bed)).await;
    let second = new_student(&store, "crossb", Some(second_bed)).await;

    for _ in 0..20 {
        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.allocate(second_bed, first).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.allocate(first_bed, second).await })
        };
        for attempt in [a, b] {
            assert!(matches!(
                attempt.await.unwrap(),
                Err(HostelError::Conflict(_))
            ));
        }
    }
}
