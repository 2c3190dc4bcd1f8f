use serde::Serialize;
use warp::{
    http::StatusCode,
    reply::{self, Reply},
};

use crate::error::ServiceError;

/// Successful action outcome with the status the HTTP layer should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    pub status: u16,
    pub body: Option<T>,
}

pub type ActionResult<T> = Result<Response<T>, ServiceError>;

impl<T> Response<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn created(body: T) -> Self {
        Self {
            status: 201,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub fn into_body(self) -> Option<T> {
        self.body
    }
}

impl<T: Serialize + Send> Reply for Response<T> {
    fn into_response(self) -> reply::Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            Some(body) => reply::with_status(reply::json(&body), status).into_response(),
            None => reply::with_status(warp::reply(), status).into_response(),
        }
    }
}

impl Reply for ServiceError {
    fn into_response(self) -> reply::Response {
        if let ServiceError::Database(e) = &self {
            log::error!("Database failure: {e}");
        }
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        reply::with_status(reply::json(&self.body()), status).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_status() {
        assert_eq!(Response::ok(1).status, 200);
        assert_eq!(Response::created(1).status, 201);

        let empty: Response<()> = Response::no_content();
        assert_eq!(empty.status, 204);
        assert_eq!(empty.into_body(), None);
    }

    #[test]
    fn replies_carry_status() {
        let reply = Response::created(serde_json::json!({ "id": 1 })).into_response();
        assert_eq!(reply.status(), StatusCode::CREATED);

        let reply = Response::<()>::no_content().into_response();
        assert_eq!(reply.status(), StatusCode::NO_CONTENT);

        let reply = ServiceError::NotFound(String::from("Recipe not found")).into_response();
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }
}
