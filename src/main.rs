use anyhow::Context;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use db_client::DbConfig;

mod auth;
mod cars;
mod db_client;
mod rental;
mod users;

#[derive(Clone)]
pub struct AppState {
	pub db: DbConfig,
	pub secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();

	let state = AppState {
		db: DbConfig::from_env()?,
		secret: std::env::var("SECRET_KEY").context("SECRET_KEY is not set")?,
	};
	let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4000".to_string());

	let app = Router::new()
		.route("/token", post(users::login))
		.route("/user/create", post(users::create_user))
		.route("/user/view", get(users::user_view))
		.route("/user/update", patch(users::update_user))
		.route("/cars", get(cars::get_cars))
		.route("/user/car/:car_id/rent", post(rental::rental::rent_car))
		.route("/user/car/:rental_id/return", put(rental::rental::return_car))
		.route("/user/car/rentals/view", get(rental::rental::rentals_view))
		.layer(CorsLayer::permissive())
		.with_state(state);

	let listener = tokio::net::TcpListener::bind(&addr).await?;
	log::info!("listening on {}", addr);
	axum::serve(listener, app).await?;
	Ok(())
}
