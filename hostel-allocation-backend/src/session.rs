use cookie::{Cookie, CookieJar, Key, SameSite};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderName, HeaderValue, Method, Request, Response};
use rand::{thread_rng, Rng as _};
use tracing::{debug, error};

use crate::error::AppError;

pub const COOKIE_NAME_CSRF_TOKEN: &str = "__Host-csrf_token";
/// Set by the login gateway in front of this service, signed with the shared cookie key.
pub const COOKIE_NAME_PROFILE: &str = "__Host-hostel_profile";
pub static CSRF_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-csrf-token");

/// Cookie state of one request.
#[derive(Clone, Debug)]
#[must_use]
pub struct Session {
    // bool is true when the token was generated for this response
    csrf_token: (String, bool),
    profile_id: Option<i32>,
}

fn generate_csrf_token() -> String {
    thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}

/// The cookie the login gateway sets once it knows who the caller is.
pub fn profile_cookie(key: &Key, profile_id: i32) -> Cookie<'static> {
    let mut cookie = Cookie::build((COOKIE_NAME_PROFILE, profile_id.to_string()))
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Strict)
        .build();
    let mut jar = CookieJar::new();
    jar.signed_mut(key).add(cookie.clone());
    if let Some(signed) = jar.get(COOKIE_NAME_PROFILE) {
        cookie.set_value(signed.value().to_owned());
    }
    cookie
}

impl Session {
    /// Profile cookies that do not carry a valid signature for `key` are ignored.
    pub fn new<T>(request: &Request<T>, key: &Key) -> Self {
        let mut jar = CookieJar::new();
        request
            .headers()
            .get_all(COOKIE)
            .into_iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .for_each(|cookie| jar.add_original(cookie));

        let profile_id = jar.get(COOKIE_NAME_PROFILE).and_then(|cookie| {
            let Some(verified) = jar.signed(key).verify(cookie.clone()) else {
                debug!("ignoring profile cookie with a bad signature");
                return None;
            };
            match verified.value().parse::<i32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!("ignoring malformed profile cookie {}", verified.value());
                    None
                }
            }
        });
        let csrf_token = jar.get(COOKIE_NAME_CSRF_TOKEN).map_or_else(
            || (generate_csrf_token(), true),
            |cookie| (cookie.value().to_owned(), false),
        );
        Self {
            csrf_token,
            profile_id,
        }
    }

    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token.0
    }

    #[must_use]
    pub const fn profile_id(&self) -> Option<i32> {
        self.profile_id
    }

    /// Requests that change state must echo the csrf cookie in a header.
    pub fn verify_csrf<T>(&self, request: &Request<T>) -> Result<(), AppError> {
        if request.method() == Method::GET || request.method() == Method::HEAD {
            return Ok(());
        }
        // a freshly generated token was never seen by the client
        if self.csrf_token.1 {
            return Err(AppError::WrongCsrfToken);
        }
        match request.headers().get(&CSRF_TOKEN_HEADER) {
            Some(actual) if actual.as_bytes() == self.csrf_token.0.as_bytes() => Ok(()),
            _ => Err(AppError::WrongCsrfToken),
        }
    }
}

pub trait ResponseSessionExt {
    #[must_use]
    fn with_session(self, session: &Session) -> Self;
}

impl<B> ResponseSessionExt for Response<B> {
    fn with_session(mut self, session: &Session) -> Self {
        if let (value, true) = &session.csrf_token {
            let cookie = Cookie::build((COOKIE_NAME_CSRF_TOKEN, value.as_str()))
                .path("/")
                .secure(true)
                .same_site(SameSite::Strict)
                .build();
            match HeaderValue::try_from(cookie.to_string()) {
                Ok(value) => {
                    self.headers_mut().append(SET_COOKIE, value);
                }
                Err(err) => error!("failed to encode csrf cookie: {err}"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        Key::from(&[42; 64])
    }

    fn request(method: Method, cookies: &[&str], header: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().method(method).uri("/beds");
        for cookie in cookies {
            builder = builder.header(COOKIE, *cookie);
        }
        if let Some(header) = header {
            builder = builder.header(&CSRF_TOKEN_HEADER, header);
        }
        builder.body(()).unwrap()
    }

    fn signed(profile_id: i32) -> String {
        profile_cookie(&key(), profile_id).stripped().to_string()
    }

    #[test]
    fn reads_both_cookies() {
        let profile = signed(7);
        let session = Session::new(
            &request(
                Method::GET,
                &["theme=dark; __Host-csrf_token=abc", profile.as_str()],
                None,
            ),
            &key(),
        );
        assert_eq!(session.csrf_token(), "abc");
        assert_eq!(session.profile_id(), Some(7));
    }

    #[test]
    fn unsigned_profile_cookie_is_anonymous() {
        let session = Session::new(&request(Method::GET, &["__Host-hostel_profile=1"], None), &key());
        assert_eq!(session.profile_id(), None);
        assert_eq!(session.csrf_token().len(), 30);
    }

    #[test]
    fn tampered_profile_cookie_is_anonymous() {
        let value = profile_cookie(&key(), 2).value().to_owned();
        let forged = format!("{COOKIE_NAME_PROFILE}={}1", &value[..value.len() - 1]);
        let session = Session::new(&request(Method::GET, &[forged.as_str()], None), &key());
        assert_eq!(session.profile_id(), None);

        let other_key = Session::new(
            &request(Method::GET, &[signed(2).as_str()], None),
            &Key::from(&[7; 64]),
        );
        assert_eq!(other_key.profile_id(), None);
    }

    #[test]
    fn profile_cookie_is_host_only() {
        let cookie = profile_cookie(&key(), 3).to_string();
        assert!(cookie.starts_with(COOKIE_NAME_PROFILE));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
    }

    #[test]
    fn csrf_is_checked_for_mutations_only() {
        let cookies = ["__Host-csrf_token=abc"];
        let get = request(Method::GET, &cookies, None);
        assert!(Session::new(&get, &key()).verify_csrf(&get).is_ok());

        let good = request(Method::POST, &cookies, Some("abc"));
        assert!(Session::new(&good, &key()).verify_csrf(&good).is_ok());

        let wrong = request(Method::POST, &cookies, Some("abd"));
        assert!(matches!(
            Session::new(&wrong, &key()).verify_csrf(&wrong),
            Err(AppError::WrongCsrfToken)
        ));

        let missing = request(Method::DELETE, &cookies, None);
        assert!(Session::new(&missing, &key()).verify_csrf(&missing).is_err());
    }

    #[test]
    fn new_token_is_sent_once() {
        let fresh = Session::new(&request(Method::GET, &[], None), &key());
        let response = Response::new(()).with_session(&fresh);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{COOKIE_NAME_CSRF_TOKEN}={}", fresh.csrf_token())));

        let known = Session::new(&request(Method::GET, &["__Host-csrf_token=abc"], None), &key());
        let response = Response::new(()).with_session(&known);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }
}
