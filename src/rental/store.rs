use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_from_row::FromRow;

use super::error::StoreError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, FromRow)]
pub struct Car {
	pub id: i32,
	pub name: String,
	pub car_type: String,
	pub rent_per_day: f64,
	pub total_count: i32,
	pub available_count: i32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, FromRow)]
pub struct Rental {
	pub id: i32,
	pub user_id: i32,
	pub car_id: i32,
	pub rented_count: i32,
	pub duration_days: i32,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub total_rent: Option<f64>,
}

impl Rental {
	pub fn is_active(&self) -> bool {
		self.ended_at.is_none()
	}
}

#[derive(Debug, Clone)]
pub struct NewRental {
	pub user_id: i32,
	pub car_id: i32,
	pub rented_count: i32,
	pub duration_days: i32,
	pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait RentalStore: Send {
	/// Opens a transaction. Dropping the returned handle without calling
	/// `commit` rolls every staged write back.
	async fn begin<'a>(&'a mut self) -> Result<Box<dyn RentalTx + Send + 'a>, StoreError>;
}

#[async_trait]
pub trait RentalTx: Send {
	/// Fetches a car and holds a write lock on it until the transaction ends.
	async fn car_for_update(&mut self, car_id: i32) -> Result<Option<Car>, StoreError>;

	async fn set_available_count(&mut self, car_id: i32, available_count: i32) -> Result<(), StoreError>;

	async fn insert_rental(&mut self, rental: NewRental) -> Result<Rental, StoreError>;

	async fn rental_for_user(&mut self, rental_id: i32, user_id: i32) -> Result<Option<Rental>, StoreError>;

	async fn close_rental(
		&mut self,
		rental_id: i32,
		ended_at: DateTime<Utc>,
		total_rent: f64,
	) -> Result<Rental, StoreError>;

	/// Rentals of one user, active or closed, newest start first.
	async fn rentals_for_user(&mut self, user_id: i32, active: bool) -> Result<Vec<Rental>, StoreError>;

	/// All cars, or those whose name or type contains `query`, ordered by id.
	async fn list_cars(&mut self, query: Option<&str>) -> Result<Vec<Car>, StoreError>;

	async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
