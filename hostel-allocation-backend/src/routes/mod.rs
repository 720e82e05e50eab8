pub mod beds;
pub mod dashboard;
pub mod me;
pub mod requests;
pub mod students;

use bytes::Bytes;
use headers::{ContentType, HeaderMapExt as _};
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt as _, Full};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::permission::{Actor, Permission};
use crate::session::Session;
use crate::AppState;

/// A handler's answer before cookies are attached.
#[derive(Debug)]
#[must_use]
pub struct Reply {
    status: StatusCode,
    body: Option<Bytes>,
}

impl Reply {
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self, AppError> {
        Ok(Self {
            status,
            body: Some(Bytes::from(serde_json::to_vec(value)?)),
        })
    }

    pub fn ok<T: Serialize + ?Sized>(value: &T) -> Result<Self, AppError> {
        Self::json(StatusCode::OK, value)
    }

    pub fn created<T: Serialize + ?Sized>(value: &T) -> Result<Self, AppError> {
        Self::json(StatusCode::CREATED, value)
    }

    pub const fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let has_body = self.body.is_some();
        let mut response = Response::new(Full::new(self.body.unwrap_or_default()));
        *response.status_mut() = self.status;
        if has_body {
            response.headers_mut().typed_insert(ContentType::json());
        }
        response
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    ListBeds,
    CreateBed,
    Allocate(i32),
    Deallocate(i32),
    ListStudents,
    CreateStudent,
    UpdateStudent(i32),
    DeleteStudent(i32),
    Reallocate(i32),
    ListRequests,
    DecideRequest(i32),
    Overview,
    MyRequests,
    SubmitRequest,
}

fn id(segment: &str) -> Result<i32, AppError> {
    segment.parse().map_err(|_| AppError::RouteNotFound)
}

impl Route {
    /// 404 for unknown paths, 405 for known paths with another method.
    pub fn parse(method: &Method, path: &str) -> Result<Self, AppError> {
        let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
        let candidates: Vec<(Method, Self)> = match segments.as_slice() {
            ["dashboard"] => vec![(Method::GET, Self::Dashboard)],
            ["beds"] => vec![(Method::GET, Self::ListBeds), (Method::POST, Self::CreateBed)],
            ["beds", bed, "allocate"] => vec![(Method::POST, Self::Allocate(id(bed)?))],
            ["beds", bed, "deallocate"] => vec![(Method::POST, Self::Deallocate(id(bed)?))],
            ["students"] => vec![
                (Method::GET, Self::ListStudents),
                (Method::POST, Self::CreateStudent),
            ],
            ["students", student] => {
                let student = id(student)?;
                vec![
                    (Method::PATCH, Self::UpdateStudent(student)),
                    (Method::DELETE, Self::DeleteStudent(student)),
                ]
            }
            ["students", student, "reallocate"] => {
                vec![(Method::POST, Self::Reallocate(id(student)?))]
            }
            ["requests"] => vec![(Method::GET, Self::ListRequests)],
            ["requests", request, "decision"] => {
                vec![(Method::POST, Self::DecideRequest(id(request)?))]
            }
            ["me"] => vec![(Method::GET, Self::Overview)],
            ["me", "requests"] => vec![
                (Method::GET, Self::MyRequests),
                (Method::POST, Self::SubmitRequest),
            ],
            _ => return Err(AppError::RouteNotFound),
        };
        candidates
            .into_iter()
            .find_map(|(allowed, route)| (allowed == method).then_some(route))
            .ok_or(AppError::MethodNotAllowed)
    }

    #[must_use]
    pub const fn permission(self) -> Permission {
        match self {
            Self::Dashboard => Permission::ViewDashboard,
            Self::ListBeds
            | Self::CreateBed
            | Self::Allocate(_)
            | Self::Deallocate(_)
            | Self::Reallocate(_) => Permission::ManageBeds,
            Self::ListStudents
            | Self::CreateStudent
            | Self::UpdateStudent(_)
            | Self::DeleteStudent(_) => Permission::ManageStudents,
            Self::ListRequests | Self::DecideRequest(_) => Permission::ReviewRequests,
            Self::Overview => Permission::ViewOwnOverview,
            Self::MyRequests | Self::SubmitRequest => Permission::SubmitRequests,
        }
    }
}

pub async fn read_json<T, B>(body: B) -> Result<T, AppError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<AppError>,
{
    let bytes = body
        .collect()
        .await
        .map_err(Into::<AppError>::into)?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(AppError::InvalidBody)
}

#[derive(Deserialize, Default)]
struct BedFilter {
    #[serde(default)]
    vacant: bool,
}

/// Routing, csrf, authentication and permission checks, in that order.
pub async fn dispatch<B>(
    request: Request<B>,
    state: &AppState,
    session: &Session,
) -> Result<Reply, AppError>
where
    B: Body,
    B::Error: Into<AppError>,
{
    let route = Route::parse(request.method(), request.uri().path())?;
    session.verify_csrf(&request)?;
    let store = state.store();
    let actor = Actor::authenticate(store, session).await?;
    actor.require(route.permission())?;

    let (parts, body) = request.into_parts();
    match route {
        Route::Dashboard => dashboard::show(store).await,
        Route::ListBeds => {
            let filter: BedFilter = serde_urlencoded::from_str(parts.uri.query().unwrap_or_default())?;
            beds::list(store, filter.vacant).await
        }
        Route::CreateBed => beds::create(store, read_json(body).await?).await,
        Route::Allocate(bed_id) => beds::allocate(store, bed_id, read_json(body).await?).await,
        Route::Deallocate(bed_id) => beds::deallocate(store, bed_id).await,
        Route::ListStudents => students::list(store).await,
        Route::CreateStudent => students::create(store, read_json(body).await?).await,
        Route::UpdateStudent(student_id) => {
            students::update(store, student_id, read_json(body).await?).await
        }
        Route::DeleteStudent(student_id) => students::delete(store, student_id).await,
        Route::Reallocate(student_id) => {
            students::reallocate(store, student_id, read_json(body).await?).await
        }
        Route::ListRequests => requests::list(store).await,
        Route::DecideRequest(request_id) => {
            requests::decide(store, request_id, read_json(body).await?).await
        }
        Route::Overview => me::overview(store, &actor).await,
        Route::MyRequests => me::requests(store, &actor).await,
        Route::SubmitRequest => me::submit(store, &actor, read_json(body).await?).await,
    }
}
