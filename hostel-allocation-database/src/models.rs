use std::io::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

use crate::schema::{bed_change_requests, beds, profiles};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Stores the enum as its lowercase name in a `TEXT` column.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: value.to_owned(),
                    }),
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let value = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(value.parse()?)
            }
        }
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

text_enum!(Role, "role", {
    Admin => "admin",
    Student => "student",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl RequestStatus {
    /// Statuses that block a student from submitting another request.
    pub const ACTIVE: [Self; 2] = [Self::Pending, Self::Approved];

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub contact_info: Option<String>,
    pub course: Option<String>,
    pub role: Role,
    #[serde(skip)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub contact_info: Option<String>,
    pub course: Option<String>,
    pub role: Role,
}

/// `None` leaves a column untouched, `Some(None)` clears a nullable one.
#[derive(AsChangeset, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<Option<String>>,
    pub contact_info: Option<Option<String>>,
    pub course: Option<Option<String>>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileChanges {
    #[must_use]
    pub fn new() -> Self {
        Self {
            full_name: None,
            email: None,
            contact_info: None,
            course: None,
            updated_at: Utc::now(),
        }
    }
}

impl Default for ProfileChanges {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = beds)]
pub struct Bed {
    pub id: i32,
    pub room_number: String,
    pub bed_identifier: String,
    pub is_occupied: bool,
    pub allocated_to: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bed {
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", self.room_number, self.bed_identifier)
    }
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq, Deserialize)]
#[diesel(table_name = beds)]
pub struct NewBed {
    pub room_number: String,
    pub bed_identifier: String,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = bed_change_requests)]
pub struct BedChangeRequest {
    pub id: i32,
    pub student_id: i32,
    pub current_bed_id: Option<i32>,
    pub requested_bed_id: Option<i32>,
    pub status: RequestStatus,
    pub reason: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = bed_change_requests)]
pub struct NewBedChangeRequest {
    pub student_id: i32,
    pub current_bed_id: Option<i32>,
    pub requested_bed_id: Option<i32>,
    pub status: RequestStatus,
    pub reason: String,
}

/// What a student sends when asking to move.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestSubmission {
    pub reason: String,
    #[serde(default)]
    pub requested_bed_id: Option<i32>,
}

/// An admin's verdict on a pending request.
#[derive(AsChangeset, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = bed_change_requests)]
pub struct Decision {
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    #[must_use]
    pub fn new(status: RequestStatus, admin_notes: Option<String>) -> Self {
        Self {
            status,
            admin_notes,
            updated_at: Utc::now(),
        }
    }
}
