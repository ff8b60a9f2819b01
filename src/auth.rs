use std::collections::HashMap;
use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, http::header, web};
use futures::future::LocalBoxFuture;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Role, User};

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Identity-provider uid.
    pub sub: String,
}

/// Verifies bearer tokens against the identity provider's signing keys.
pub struct TokenVerifier {
    keys: HashMap<String, DecodingKey>,
    fallback: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn from_jwk_set(
        set: &JwkSet,
        audience: Option<&str>,
        issuer: Option<&str>,
    ) -> std::result::Result<Self, jsonwebtoken::errors::Error> {
        let mut keys = HashMap::new();
        let mut fallback = None;
        for jwk in &set.keys {
            let key = DecodingKey::from_jwk(jwk)?;
            match &jwk.common.key_id {
                Some(kid) => {
                    keys.insert(kid.clone(), key);
                }
                None => fallback = Some(key),
            }
        }
        // A single key serves tokens that carry no kid.
        if fallback.is_none() && set.keys.len() == 1 {
            fallback = keys.values().next().cloned();
        }

        let mut validation = Validation::new(Algorithm::RS256);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }

        Ok(Self {
            keys,
            fallback,
            validation,
        })
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            keys: HashMap::new(),
            fallback: Some(DecodingKey::from_secret(secret)),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> std::result::Result<Claims, jsonwebtoken::errors::Error> {
        let header = decode_header(token)?;
        let key = header
            .kid
            .as_ref()
            .and_then(|kid| self.keys.get(kid))
            .or(self.fallback.as_ref())
            .ok_or(jsonwebtoken::errors::ErrorKind::InvalidKeyFormat)?;

        Ok(decode::<Claims>(token, key, &self.validation)?.claims)
    }
}

pub async fn fetch_jwk_set(uri: &str) -> std::result::Result<JwkSet, reqwest::Error> {
    reqwest::get(uri).await?.error_for_status()?.json::<JwkSet>().await
}

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

/// Bearer header first, then `?token=` (browsers cannot set headers on a WebSocket upgrade).
pub fn request_token(req: &HttpRequest) -> Option<String> {
    bearer_token(req).or_else(|| {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .ok()
            .map(|q| q.into_inner().token)
            .filter(|token| !token.is_empty())
    })
}

fn verify_request(req: &HttpRequest, token: Option<String>) -> Result<Claims> {
    let token = token.ok_or_else(|| {
        AppError::Unauthorized("No token provided. Authorization header required.".to_string())
    })?;
    let verifier = req
        .app_data::<web::Data<TokenVerifier>>()
        .ok_or_else(|| AppError::Internal("Token verifier is not configured".to_string()))?;

    verifier.verify(&token).map_err(|err| {
        log::debug!("Token rejected: {}", err);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })
}

/// Verified token claims, for callers that may not have a user record yet.
pub struct Identity(pub Claims);

impl Identity {
    pub fn from_request_token(req: &HttpRequest) -> Result<Self> {
        verify_request(req, request_token(req)).map(Identity)
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(verify_request(req, bearer_token(req)).map(Identity))
    }
}

/// Authenticated caller backed by an active user record.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: ObjectId,
    pub uid: String,
    pub role: Role,
}

impl AuthUser {
    pub fn from_user(user: User) -> Result<Self> {
        if !user.is_active {
            return Err(AppError::forbidden("Account is deactivated. Contact admin."));
        }
        let id = user
            .id
            .ok_or_else(|| AppError::Internal("User record has no id".to_string()))?;

        Ok(AuthUser {
            id,
            uid: user.uid,
            role: user.role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            return Ok(());
        }
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::forbidden(format!(
            "Access denied. Required role: {}",
            names.join(" or ")
        )))
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = verify_request(req, bearer_token(req));
        let db = req.app_data::<web::Data<Database>>().cloned();

        Box::pin(async move {
            let claims = claims?;
            let db = db.ok_or_else(|| AppError::Internal("Database is not configured".to_string()))?;
            let user = db
                .users()
                .find_one(doc! { "uid": &claims.sub })
                .await?
                .ok_or_else(|| AppError::not_found("User not found. Please sign up first."))?;

            AuthUser::from_user(user)
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use actix_web::test as actix_test;
    use actix_web::{App, HttpResponse};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use mongodb::bson::DateTime;
    use serde::Serialize;

    pub const SECRET: &[u8] = b"test-secret";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: &'a str,
        exp: i64,
    }

    pub fn token_for(uid: &str, expires_in: i64) -> String {
        let claims = TestClaims {
            sub: uid,
            email: "someone@example.com",
            exp: chrono::Utc::now().timestamp() + expires_in,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn user(role: Role, is_active: bool) -> User {
        User {
            id: Some(ObjectId::new()),
            uid: "uid-1".to_string(),
            email: "a@example.com".to_string(),
            display_name: "A".to_string(),
            role,
            photo_url: String::new(),
            is_active,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn verifies_signed_token() {
        let verifier = TokenVerifier::from_secret(SECRET);
        let claims = verifier.verify(&token_for("uid-42", 3600)).unwrap();
        assert_eq!(claims.sub, "uid-42");
    }

    #[test]
    fn rejects_expired_or_foreign_tokens() {
        let verifier = TokenVerifier::from_secret(SECRET);
        assert!(verifier.verify(&token_for("uid-42", -3600)).is_err());

        let other = TokenVerifier::from_secret(b"another-secret");
        assert!(other.verify(&token_for("uid-42", 3600)).is_err());
        assert!(verifier.verify("not.a.token").is_err());
    }

    #[test]
    fn reads_token_from_header_or_query() {
        let req = actix_test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc"));

        let req = actix_test::TestRequest::with_uri("/api/ws?token=xyz").to_http_request();
        assert_eq!(bearer_token(&req), None);
        assert_eq!(request_token(&req).as_deref(), Some("xyz"));

        let req = actix_test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(request_token(&req), None);
    }

    #[test]
    fn deactivated_accounts_are_forbidden() {
        let err = AuthUser::from_user(user(Role::User, false)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn role_gate() {
        let plain = AuthUser::from_user(user(Role::User, true)).unwrap();
        let err = plain.require_role(&[Role::Expert, Role::Admin]).unwrap_err();
        assert_eq!(err.to_string(), "Access denied. Required role: expert or admin");

        let admin = AuthUser::from_user(user(Role::Admin, true)).unwrap();
        assert!(admin.require_role(&[Role::Admin]).is_ok());
        assert!(admin.is_admin());
    }

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.uid)
    }

    async fn claims(identity: Identity) -> HttpResponse {
        HttpResponse::Ok().body(identity.0.sub)
    }

    #[actix_web::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(TokenVerifier::from_secret(SECRET)))
                .route("/me", web::get().to(whoami)),
        )
        .await;

        let res = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(res.status(), 401);
        let body: serde_json::Value = actix_test::read_body_json(res).await;
        assert_eq!(body["success"], false);

        let req = actix_test::TestRequest::get()
            .uri("/me")
            .insert_header((header::AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn identity_extractor_accepts_valid_token() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(TokenVerifier::from_secret(SECRET)))
                .route("/claims", web::get().to(claims)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/claims")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token_for("uid-7", 60))))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "uid-7");
    }
}
