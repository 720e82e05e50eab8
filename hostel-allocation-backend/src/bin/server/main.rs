mod telemetry;

use hostel_allocation_backend::error::AppError;
use hostel_allocation_backend::run_server;
use hostel_allocation_config::get_config;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    telemetry::setup_tracing();

    let config = get_config()?;
    run_server(config).await
}
