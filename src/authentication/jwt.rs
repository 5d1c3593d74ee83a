use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::error::Error;
use crate::schema::{Id, User, UserRole};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

/// The authenticated caller, passed explicitly into every operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(Error::Forbidden(
                "You don't have permission to perform this action".to_owned(),
            ));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            username: value.username,
            user_id: value.user_id,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

/// Requesting identity; anonymous callers never touch relation tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    User(SessionData),
}

impl Identity {
    pub fn user_id(&self) -> Option<Id> {
        match self {
            Identity::Anonymous => None,
            Identity::User(session) => Some(session.user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }

    pub fn into_session(self) -> Result<SessionData, Error> {
        match self {
            Identity::Anonymous => Err(Error::Unauthorized(
                "Authentication credentials were not provided".to_owned(),
            )),
            Identity::User(session) => Ok(session),
        }
    }
}

impl From<SessionData> for Identity {
    fn from(value: SessionData) -> Self {
        Identity::User(value)
    }
}

fn signing_key(secret: &[u8]) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret).map_err(|_| Error::Unauthorized("Invalid signing key".to_owned()))
}

pub fn generate_jwt_session(user: &User, secret: &[u8]) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role.to_owned(),
        Duration::hours(1),
    );

    claims
        .sign_with_key(&key)
        .map_err(|_| Error::Unauthorized("Failed to sign session".to_owned()))
}

pub fn verify_jwt_session(token: &str, secret: &[u8]) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| Error::Unauthorized("Invalid session; Invalid token".to_owned()))?;

    let now = Local::now().timestamp();
    if (session.exp - now).is_negative() {
        return Err(Error::Unauthorized(
            "Invalid session; Token expired".to_owned(),
        ));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: 7,
            username: "alice".into(),
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Doe".into(),
            role,
            avatar: None,
        }
    }

    #[test]
    fn signed_session_round_trips_with_the_same_secret() {
        let token = generate_jwt_session(&user(UserRole::Admin), b"secret").unwrap();
        let session: SessionData = verify_jwt_session(&token, b"secret").unwrap().into();
        assert_eq!(session.user_id, 7);
        assert!(session.is_admin);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = generate_jwt_session(&user(UserRole::User), b"secret").unwrap();
        assert!(matches!(
            verify_jwt_session(&token, b"other"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_session_is_rejected() {
        let key = signing_key(b"secret").unwrap();
        let claims = JwtSessionData::new(1, "bob".into(), UserRole::User, Duration::hours(-2));
        let token = claims.sign_with_key(&key).unwrap();
        assert!(verify_jwt_session(&token, b"secret").is_err());
    }
}
