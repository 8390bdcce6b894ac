use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.jwt_expiry_minutes,
        ))
    }

    pub fn new(secret: &str, issuer: &str, audience: &str, expiry_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            expiry: Duration::minutes(expiry_minutes),
        }
    }

    /// Issues an access token. The token never outlives the session: `exp`
    /// is the configured token lifetime capped at `session_expiry`.
    pub fn generate_token(
        &self,
        user_id: i64,
        email: &str,
        role: &str,
        client_id: Option<i64>,
        session_expiry: DateTime<Utc>,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = (now + self.expiry).min(session_expiry);
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            role: role.to_owned(),
            client_id,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: String,
    pub client_id: Option<i64>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test-secret", "isovault", "isovault-api", 60)
    }

    #[test]
    fn token_round_trips_through_verification() {
        let jwt = service();
        let session_expiry = Utc::now() + Duration::hours(8);
        let token = jwt
            .generate_token(42, "admin@example.test", "admin", Some(7), session_expiry)
            .unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.client_id, Some(7));
    }

    #[test]
    fn token_expiry_is_capped_at_the_session_expiry() {
        let jwt = service();
        let session_expiry = Utc::now() + Duration::minutes(5);
        let token = jwt
            .generate_token(42, "admin@example.test", "admin", None, session_expiry)
            .unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert!(claims.exp <= session_expiry.timestamp() as usize);
    }

    #[test]
    fn short_token_lifetime_is_not_stretched_by_a_long_session() {
        let jwt = service();
        let session_expiry = Utc::now() + Duration::days(30);
        let token = jwt
            .generate_token(42, "admin@example.test", "admin", None, session_expiry)
            .unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        let one_hour_out = (Utc::now() + Duration::minutes(61)).timestamp() as usize;
        assert!(claims.exp <= one_hour_out);
    }
}
