use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::VerifyWithKey;
use potion::HtmlError;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::schema::Id;

/// Claims of the `session` cookie. Tokens are issued outside this crate.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn is_expired(&self, now: i64) -> bool {
        (self.exp - now).is_negative()
    }
}

/// The signed-in viewer as the actions see it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
        }
    }
}

/// Viewer id for the annotating queries; `None` means anonymous.
pub fn viewer_id(session: Option<&SessionData>) -> Option<Id> {
    session.map(|session| session.user_id)
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, potion::Error> {
    let key: Hmac<Sha256> = Hmac::new_from_slice(secret)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid Session; Invalid key"))?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid Session; Invalid token"))?;

    if session.is_expired(Local::now().timestamp()) {
        return Err(HtmlError::InvalidSession.new("Invalid session; Token expired"));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jwt::SignWithKey;

    fn sign(user_id: Id, exp_offset: i64, secret: &[u8]) -> String {
        let now = Local::now().timestamp();
        let claims = JwtSessionData {
            user_id,
            username: String::from("anna"),
            iat: now,
            exp: now + exp_offset,
        };
        let key: Hmac<Sha256> = Hmac::new_from_slice(secret).unwrap();
        claims.sign_with_key(&key).unwrap()
    }

    #[test]
    fn valid_token_yields_session() {
        let token = sign(7, 3600, b"secret");
        let session: SessionData = verify_jwt_session(&token, b"secret").unwrap().into();

        assert_eq!(session.user_id, 7);
        assert_eq!(viewer_id(Some(&session)), Some(7));
        assert_eq!(viewer_id(None), None);
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        assert!(verify_jwt_session(&sign(7, -10, b"secret"), b"secret").is_err());
        assert!(verify_jwt_session(&sign(7, 3600, b"other"), b"secret").is_err());
        assert!(verify_jwt_session("garbage", b"secret").is_err());
    }
}
