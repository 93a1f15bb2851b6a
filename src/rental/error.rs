use axum::Json;
use hyper::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum StoreError {
	/// A concurrent transaction touched the same rows; safe to retry.
	#[error("serialization conflict")]
	Serialization,
	#[error("database error: {0}")]
	Db(tokio_postgres::Error),
	#[error("store failure: {0}")]
	Backend(String),
}

impl From<tokio_postgres::Error> for StoreError {
	fn from(err: tokio_postgres::Error) -> Self {
		match err.code() {
			Some(code)
				if code == &SqlState::T_R_SERIALIZATION_FAILURE
					|| code == &SqlState::T_R_DEADLOCK_DETECTED =>
			{
				StoreError::Serialization
			}
			_ => StoreError::Db(err),
		}
	}
}

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("car not found")]
	CarNotFound,
	#[error("rental not found")]
	RentalNotFound,
	#[error("unable to process your request, this item is sold out")]
	SoldOut,
	#[error("unable to process your request, only {available} of the items you requested are available")]
	InsufficientStock { available: i32 },
	#[error("this item is already returned")]
	AlreadyReturned,
	#[error("requested item count must be positive")]
	InvalidCount,
	#[error("the item was updated concurrently, please retry")]
	Contention,
	#[error("inventory state corrupt: {0}")]
	Corrupt(&'static str),
	#[error(transparent)]
	Store(#[from] StoreError),
}

impl LedgerError {
	pub fn status(&self) -> StatusCode {
		match self {
			LedgerError::CarNotFound | LedgerError::RentalNotFound => StatusCode::NOT_FOUND,
			LedgerError::SoldOut | LedgerError::InsufficientStock { .. } | LedgerError::Contention => {
				StatusCode::CONFLICT
			}
			LedgerError::AlreadyReturned | LedgerError::InvalidCount => StatusCode::BAD_REQUEST,
			LedgerError::Corrupt(_) | LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

pub fn reject(err: LedgerError) -> (StatusCode, Json<Value>) {
	let status = err.status();
	if status == StatusCode::INTERNAL_SERVER_ERROR {
		log::error!("ledger operation failed: {}", err);
		return (status, Json(json!({"detail": "internal server error"})));
	}
	(status, Json(json!({"detail": err.to_string()})))
}

pub fn internal<E: std::fmt::Display>(err: E) -> (StatusCode, Json<Value>) {
	log::error!("request failed: {}", err);
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		Json(json!({"detail": "internal server error"})),
	)
}
