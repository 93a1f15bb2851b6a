use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use hyper::StatusCode;
use serde_json::Value;

use super::clock::SystemClock;
use super::error::{internal, reject};
use super::ledger::{RentalLedger, UserRentals};
use super::pg::PgStore;
use super::store::Rental;
use crate::auth;
use crate::db_client::DbClient;
use crate::AppState;

async fn ledger(state: &AppState) -> Result<RentalLedger<PgStore, SystemClock>, (StatusCode, Json<Value>)> {
	let db = DbClient::connect(&state.db).await.map_err(internal)?;
	Ok(RentalLedger::new(PgStore::new(db), SystemClock))
}

#[derive(Debug, serde::Deserialize)]
pub struct RentCarReq {
	pub item_count: i32,
	pub rental_duration: i32,
}

pub async fn rent_car(
	State(state): State<AppState>,
	Path(car_id): Path<i32>,
	headers: HeaderMap,
	req: Json<RentCarReq>,
) -> Result<Json<Rental>, (StatusCode, Json<Value>)> {
	let user_id = auth::authorize(&headers, &state.secret)?;
	let rental = ledger(&state)
		.await?
		.rent_car(user_id, car_id, req.item_count, req.rental_duration)
		.await
		.map_err(reject)?;
	Ok(Json(rental))
}

pub async fn return_car(
	State(state): State<AppState>,
	Path(rental_id): Path<i32>,
	headers: HeaderMap,
) -> Result<Json<Rental>, (StatusCode, Json<Value>)> {
	let user_id = auth::authorize(&headers, &state.secret)?;
	let rental = ledger(&state).await?.return_car(user_id, rental_id).await.map_err(reject)?;
	Ok(Json(rental))
}

pub async fn rentals_view(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<UserRentals>, (StatusCode, Json<Value>)> {
	let user_id = auth::authorize(&headers, &state.secret)?;
	let rentals = ledger(&state).await?.list_user_rentals(user_id).await.map_err(reject)?;
	Ok(Json(rentals))
}
