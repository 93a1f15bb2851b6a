use argon2::{
	password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::Utc;
use hyper::StatusCode;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Value};

pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Claims {
	pub sub: i32,
	pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
	let salt = SaltString::generate(&mut OsRng);
	Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
	PasswordHash::new(hash)
		.and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
		.is_ok()
}

pub fn create_access_token(user_id: i32, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
	let exp = (Utc::now() + chrono::Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES)).timestamp();
	encode(
		&Header::default(),
		&Claims { sub: user_id, exp },
		&EncodingKey::from_secret(secret.as_bytes()),
	)
}

fn decode_token(token: &str, secret: &str) -> Option<i32> {
	decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::new(Algorithm::HS256))
		.ok()
		.map(|data| data.claims.sub)
}

/// Resolves the calling user from the bearer token, or rejects the request
/// with 401.
pub fn authorize(headers: &HeaderMap, secret: &str) -> Result<i32, (StatusCode, Json<Value>)> {
	headers
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.and_then(|token| decode_token(token, secret))
		.ok_or((
			StatusCode::UNAUTHORIZED,
			Json(json!({"detail": "could not validate credentials"})),
		))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn password_hash_verifies_and_rejects() {
		let hash = hash_password("s3cret").unwrap();
		assert_ne!(hash, "s3cret");
		assert!(verify_password("s3cret", &hash));
		assert!(!verify_password("wrong", &hash));
		assert!(!verify_password("s3cret", "not-a-phc-string"));
	}

	#[test]
	fn token_round_trips_user_id() {
		let token = create_access_token(42, "secret").unwrap();
		assert_eq!(decode_token(&token, "secret"), Some(42));
		assert_eq!(decode_token(&token, "other-secret"), None);
	}

	#[test]
	fn expired_token_is_rejected() {
		let exp = (Utc::now() - chrono::Duration::hours(1)).timestamp();
		let token = encode(
			&Header::default(),
			&Claims { sub: 42, exp },
			&EncodingKey::from_secret(b"secret"),
		)
		.unwrap();
		assert_eq!(decode_token(&token, "secret"), None);
	}

	#[test]
	fn authorize_requires_a_bearer_header() {
		let token = create_access_token(7, "secret").unwrap();

		let mut headers = HeaderMap::new();
		assert!(authorize(&headers, "secret").is_err());

		headers.insert(header::AUTHORIZATION, token.parse().unwrap());
		assert!(authorize(&headers, "secret").is_err());

		headers.insert(header::AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
		assert_eq!(authorize(&headers, "secret").unwrap(), 7);
	}
}
