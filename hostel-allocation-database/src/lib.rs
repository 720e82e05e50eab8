pub mod error;
pub mod models;
pub mod rules;
pub mod schema;
pub mod store;
pub mod views;

use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection as _};
pub use error::{DatabaseError, Entity, HostelError};
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
pub use store::HostelStore;
use tracing::info;

pub type Pool = diesel_async::pooled_connection::deadpool::Pool<AsyncPgConnection>;

/// Creates `profiles`, `beds` and `bed_change_requests` if they are missing.
pub const MIGRATION: &str = include_str!("../migrations/2024-09-01-000000_create_hostel/up.sql");

pub fn get_database_connection(database_url: &str) -> Result<Pool, DatabaseError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Ok(Pool::builder(config).build()?)
}

pub fn get_database_connection_from_env() -> Result<Pool, DatabaseError> {
    let database_url = std::env::var("DATABASE_URL")?;
    get_database_connection(&database_url)
}

pub async fn run_migrations(pool: &Pool) -> Result<(), DatabaseError> {
    let mut connection = pool.get().await?;
    let connection: &mut AsyncPgConnection = &mut connection;
    connection.batch_execute(MIGRATION).await?;
    info!("database schema is up to date");
    Ok(())
}
