use std::{convert::Infallible, sync::Arc};

use warp::{
    reject::{self, Rejection},
    Filter,
};

use super::jwt::{verify_jwt_session, SessionData};
use crate::SESSION_COOKIE;

#[derive(Debug)]
struct Unauthorized;

impl reject::Reject for Unauthorized {}

/// Requires a valid `session` cookie.
pub fn with_session(
    secret: Arc<[u8]>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::cookie::<String>(SESSION_COOKIE).and_then(move |session: String| {
        let secret = secret.clone();
        async move {
            verify_jwt_session(&session, &secret)
                .map(SessionData::from)
                .map_err(|_| warp::reject::custom(Unauthorized))
        }
    })
}

/// Anonymous when the cookie is missing or invalid.
pub fn with_possible_session(
    secret: Arc<[u8]>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    warp::filters::cookie::optional(SESSION_COOKIE).map(move |session: Option<String>| {
        session
            .and_then(|token| verify_jwt_session(&token, &secret).ok())
            .map(SessionData::from)
    })
}
