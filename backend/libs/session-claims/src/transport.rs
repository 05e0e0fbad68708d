//! Auth cookie transport
//!
//! The signed credential travels as a single cookie. Servers emit it through
//! `set-cookie` and clients return it in the `cookie` header.

use cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// Default name of the cookie carrying the credential.
pub const AUTH_COOKIE_NAME: &str = "auth";

/// Build the auth cookie for `token`.
///
/// The cookie is `HttpOnly`, `Secure`, `SameSite=Strict`, scoped to `/` and
/// expires together with the claims it carries.
pub fn auth_cookie(
    name: &str,
    token: &str,
    domain: Option<&str>,
    expires_at: i64,
) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(expires_at)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    let mut builder = Cookie::build((name.to_string(), token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .expires(expires);

    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        builder = builder.domain(domain.to_string());
    }

    builder.build()
}

/// Find the credential named `name` in a `cookie` request header value.
///
/// Unparseable pairs are skipped; an empty value counts as absent.
pub fn token_from_cookie_header(header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
