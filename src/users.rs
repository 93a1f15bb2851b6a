use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hyper::StatusCode;
use postgres_from_row::FromRow;
use serde_json::{json, Value};

use crate::auth;
use crate::db_client::DbClient;
use crate::rental::error::internal;
use crate::AppState;

const PROFILE_COLUMNS: &str = "id, name, email, phone_number, address";

#[derive(Debug, serde::Serialize, FromRow)]
pub struct UserProfile {
	pub id: i32,
	pub name: String,
	pub email: String,
	pub phone_number: String,
	pub address: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateUser {
	pub name: String,
	pub email: String,
	pub phone_number: String,
	pub address: String,
	pub password: String,
}

pub async fn create_user(
	State(state): State<AppState>,
	user: Json<CreateUser>,
) -> Result<Json<UserProfile>, (StatusCode, Json<Value>)> {
	let user = user.0;
	let db = DbClient::connect(&state.db).await.map_err(internal)?;

	let existing = db
		.query_opt("SELECT id FROM users WHERE email=$1", &[&user.email])
		.await
		.map_err(internal)?;
	if existing.is_some() {
		return Err((
			StatusCode::BAD_REQUEST,
			Json(json!({"detail": "user with this email already exists"})),
		));
	}

	let password_hash = auth::hash_password(&user.password).map_err(internal)?;
	let statement = format!(
		"INSERT INTO users (name, email, phone_number, address, password_hash) \
		 VALUES ($1, $2, $3, $4, $5) RETURNING {}",
		PROFILE_COLUMNS
	);
	let row = db
		.query_one(
			&statement,
			&[&user.name, &user.email, &user.phone_number, &user.address, &password_hash],
		)
		.await
		.map_err(internal)?;

	log::info!("registered user {}", user.email);
	Ok(Json(UserProfile::try_from_row(&row).map_err(internal)?))
}

#[derive(Debug, serde::Deserialize)]
pub struct Logins {
	pub email: String,
	pub password: String,
}

pub async fn login(
	State(state): State<AppState>,
	logins: Json<Logins>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
	let logins = logins.0;
	let db = DbClient::connect(&state.db).await.map_err(internal)?;

	let unauthorized = || {
		(
			StatusCode::UNAUTHORIZED,
			Json(json!({"detail": "incorrect email or password"})),
		)
	};
	let Some(row) = db
		.query_opt("SELECT id, password_hash FROM users WHERE email=$1", &[&logins.email])
		.await
		.map_err(internal)?
	else {
		return Err(unauthorized());
	};

	let user_id: i32 = row.get(0);
	let password_hash: &str = row.get(1);
	if !auth::verify_password(&logins.password, password_hash) {
		return Err(unauthorized());
	}

	let access_token = auth::create_access_token(user_id, &state.secret).map_err(internal)?;
	Ok(Json(json!({"access_token": access_token, "token_type": "bearer"})))
}

pub async fn user_view(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<UserProfile>, (StatusCode, Json<Value>)> {
	let user_id = auth::authorize(&headers, &state.secret)?;
	let db = DbClient::connect(&state.db).await.map_err(internal)?;

	let statement = format!("SELECT {} FROM users WHERE id=$1", PROFILE_COLUMNS);
	let Some(row) = db.query_opt(&statement, &[&user_id]).await.map_err(internal)? else {
		return Err((StatusCode::NOT_FOUND, Json(json!({"detail": "user not found"}))));
	};
	Ok(Json(UserProfile::try_from_row(&row).map_err(internal)?))
}

/// Partial profile update. An absent field is left unchanged; a present
/// field is written exactly as given, so sending an empty string clears
/// the stored value.
#[derive(Debug, serde::Deserialize)]
pub struct UpdateUser {
	pub name: Option<String>,
	pub phone_number: Option<String>,
	pub address: Option<String>,
}

pub async fn update_user(
	State(state): State<AppState>,
	headers: HeaderMap,
	update: Json<UpdateUser>,
) -> Result<Json<UserProfile>, (StatusCode, Json<Value>)> {
	let user_id = auth::authorize(&headers, &state.secret)?;
	let update = update.0;
	let db = DbClient::connect(&state.db).await.map_err(internal)?;

	let statement = format!(
		"UPDATE users SET name=COALESCE($2, name), phone_number=COALESCE($3, phone_number), \
		 address=COALESCE($4, address) WHERE id=$1 RETURNING {}",
		PROFILE_COLUMNS
	);
	let Some(row) = db
		.query_opt(&statement, &[&user_id, &update.name, &update.phone_number, &update.address])
		.await
		.map_err(internal)?
	else {
		return Err((StatusCode::NOT_FOUND, Json(json!({"detail": "user not found"}))));
	};
	Ok(Json(UserProfile::try_from_row(&row).map_err(internal)?))
}
