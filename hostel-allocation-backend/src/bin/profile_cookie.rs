//! Prints the signed profile cookie for a profile id, the way the login gateway sets it.
//!
//! `HOSTEL_COOKIE_KEY=... cargo run --bin profile-cookie -- 1`

use std::process::ExitCode;

use hostel_allocation_backend::cookie_key;
use hostel_allocation_backend::error::AppError;
use hostel_allocation_backend::session::profile_cookie;
use hostel_allocation_config::get_config;

fn main() -> Result<ExitCode, AppError> {
    let config = get_config()?;
    // a random key would sign a cookie no server accepts
    if config.cookie_key.is_none() {
        return Err(AppError::NoCookieKey);
    }
    let Some(profile_id) = std::env::args().nth(1).and_then(|arg| arg.parse::<i32>().ok()) else {
        eprintln!("usage: profile-cookie <profile id>");
        return Ok(ExitCode::FAILURE);
    };
    println!("{}", profile_cookie(&cookie_key(&config)?, profile_id).stripped());
    Ok(ExitCode::SUCCESS)
}
