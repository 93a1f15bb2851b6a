use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use hyper::StatusCode;
use serde_json::Value;

use crate::auth;
use crate::db_client::DbClient;
use crate::rental::clock::SystemClock;
use crate::rental::error::{internal, reject};
use crate::rental::ledger::RentalLedger;
use crate::rental::pg::PgStore;
use crate::rental::store::Car;
use crate::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct CarsQuery {
	pub query: Option<String>,
}

pub async fn get_cars(
	State(state): State<AppState>,
	Query(params): Query<CarsQuery>,
	headers: HeaderMap,
) -> Result<Json<Vec<Car>>, (StatusCode, Json<Value>)> {
	auth::authorize(&headers, &state.secret)?;
	let db = DbClient::connect(&state.db).await.map_err(internal)?;
	let cars = RentalLedger::new(PgStore::new(db), SystemClock)
		.list_cars(params.query.as_deref())
		.await
		.map_err(reject)?;
	Ok(Json(cars))
}
