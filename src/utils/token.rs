//! utils/token.rs
//!
//! Credential issuance for admitted participants. The admission core
//! never decodes what it hands out; it goes through `CredentialIssuer`
//! and treats the result as opaque.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use crate::error::AppResult;

const TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_send_data: bool,
}

impl Capabilities {
    /// Full send/receive rights, what every admitted participant gets.
    pub fn participant() -> Self {
        Self { can_publish: true, can_subscribe: true, can_send_data: true }
    }
}

/// Opaque signed credential plus the media endpoint to present it to.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub server_url: String,
}

pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, room: &str, identity: &str, caps: Capabilities) -> AppResult<Credential>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    room_join: bool,
    room: String,
    can_publish: bool,
    can_subscribe: bool,
    can_publish_data: bool,
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    sub: String,
    jti: String,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

/// HS256 room-scoped access token, in the grant shape the media server
/// expects.
pub struct AccessTokenIssuer {
    api_key: String,
    api_secret: String,
    server_url: String,
}

impl AccessTokenIssuer {
    pub fn new(api_key: String, api_secret: String, server_url: String) -> Self {
        Self { api_key, api_secret, server_url }
    }
}

impl CredentialIssuer for AccessTokenIssuer {
    fn issue(&self, room: &str, identity: &str, caps: Capabilities) -> AppResult<Credential> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.api_key.clone(),
            sub: identity.to_owned(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            exp: now + TOKEN_TTL_SECS,
            video: VideoGrant {
                room_join: true,
                room: room.to_owned(),
                can_publish: caps.can_publish,
                can_subscribe: caps.can_subscribe,
                can_publish_data: caps.can_send_data,
            },
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?;
        Ok(Credential { token, server_url: self.server_url.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Decoded {
        sub: String,
        video: DecodedGrant,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DecodedGrant {
        room: String,
        can_publish: bool,
    }

    #[test]
    fn issued_token_carries_room_grant() {
        let issuer = AccessTokenIssuer::new(
            "key".into(),
            "secret".into(),
            "wss://media.example".into(),
        );
        let cred = issuer
            .issue("standup", "alice", Capabilities::participant())
            .unwrap();
        assert_eq!(cred.server_url, "wss://media.example");

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["key"]);
        let decoded = decode::<Decoded>(
            &cred.token,
            &DecodingKey::from_secret(b"secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "alice");
        assert_eq!(decoded.claims.video.room, "standup");
        assert!(decoded.claims.video.can_publish);
    }
}
