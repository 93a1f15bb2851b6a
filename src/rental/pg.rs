use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_from_row::FromRow;
use tokio_postgres::Transaction;

use super::error::StoreError;
use super::store::{Car, NewRental, Rental, RentalStore, RentalTx};
use crate::db_client::DbClient;

const CAR_COLUMNS: &str = "id, name, car_type, rent_per_day, total_count, available_count";
const RENTAL_COLUMNS: &str = "id, user_id, car_id, rented_count, duration_days, started_at, ended_at, total_rent";

pub struct PgStore {
	db: DbClient,
}

impl PgStore {
	pub fn new(db: DbClient) -> Self {
		PgStore { db }
	}
}

#[async_trait]
impl RentalStore for PgStore {
	async fn begin<'a>(&'a mut self) -> Result<Box<dyn RentalTx + Send + 'a>, StoreError> {
		Ok(Box::new(PgTx { tx: self.db.transaction().await? }))
	}
}

struct PgTx<'a> {
	tx: Transaction<'a>,
}

#[async_trait]
impl RentalTx for PgTx<'_> {
	async fn car_for_update(&mut self, car_id: i32) -> Result<Option<Car>, StoreError> {
		let statement = format!("SELECT {} FROM car WHERE id=$1 FOR UPDATE", CAR_COLUMNS);
		let row = self.tx.query_opt(&statement, &[&car_id]).await?;
		row.map(|r| Car::try_from_row(&r)).transpose().map_err(Into::into)
	}

	async fn set_available_count(&mut self, car_id: i32, available_count: i32) -> Result<(), StoreError> {
		self.tx
			.execute("UPDATE car SET available_count=$2 WHERE id=$1", &[&car_id, &available_count])
			.await?;
		Ok(())
	}

	async fn insert_rental(&mut self, rental: NewRental) -> Result<Rental, StoreError> {
		let statement = format!(
			"INSERT INTO user_rental (user_id, car_id, rented_count, duration_days, started_at) \
			 VALUES ($1, $2, $3, $4, $5) RETURNING {}",
			RENTAL_COLUMNS
		);
		let row = self
			.tx
			.query_one(
				&statement,
				&[
					&rental.user_id,
					&rental.car_id,
					&rental.rented_count,
					&rental.duration_days,
					&rental.started_at,
				],
			)
			.await?;
		Rental::try_from_row(&row).map_err(Into::into)
	}

	async fn rental_for_user(&mut self, rental_id: i32, user_id: i32) -> Result<Option<Rental>, StoreError> {
		let statement = format!(
			"SELECT {} FROM user_rental WHERE id=$1 AND user_id=$2 FOR UPDATE",
			RENTAL_COLUMNS
		);
		let row = self.tx.query_opt(&statement, &[&rental_id, &user_id]).await?;
		row.map(|r| Rental::try_from_row(&r)).transpose().map_err(Into::into)
	}

	async fn close_rental(
		&mut self,
		rental_id: i32,
		ended_at: DateTime<Utc>,
		total_rent: f64,
	) -> Result<Rental, StoreError> {
		let statement = format!(
			"UPDATE user_rental SET ended_at=$2, total_rent=$3 WHERE id=$1 RETURNING {}",
			RENTAL_COLUMNS
		);
		let row = self.tx.query_one(&statement, &[&rental_id, &ended_at, &total_rent]).await?;
		Rental::try_from_row(&row).map_err(Into::into)
	}

	async fn rentals_for_user(&mut self, user_id: i32, active: bool) -> Result<Vec<Rental>, StoreError> {
		let predicate = if active { "ended_at IS NULL" } else { "ended_at IS NOT NULL" };
		let statement = format!(
			"SELECT {} FROM user_rental WHERE user_id=$1 AND {} ORDER BY started_at DESC",
			RENTAL_COLUMNS, predicate
		);
		let rows = self.tx.query(&statement, &[&user_id]).await?;
		rows.iter()
			.map(|r| Rental::try_from_row(r))
			.collect::<Result<Vec<_>, _>>()
			.map_err(Into::into)
	}

	async fn list_cars(&mut self, query: Option<&str>) -> Result<Vec<Car>, StoreError> {
		let rows = match query {
			Some(q) => {
				let statement = format!(
					"SELECT {} FROM car WHERE name ILIKE $1 OR car_type ILIKE $1 ORDER BY id",
					CAR_COLUMNS
				);
				self.tx.query(&statement, &[&like_pattern(q)]).await?
			}
			None => {
				let statement = format!("SELECT {} FROM car ORDER BY id", CAR_COLUMNS);
				self.tx.query(&statement, &[]).await?
			}
		};
		rows.iter()
			.map(|r| Car::try_from_row(r))
			.collect::<Result<Vec<_>, _>>()
			.map_err(Into::into)
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		self.tx.commit().await.map_err(Into::into)
	}
}

/// Wraps user input in `%…%` for ILIKE, escaping the pattern
/// metacharacters so the match stays a plain substring test.
fn like_pattern(query: &str) -> String {
	let escaped = query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
	format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
	use super::like_pattern;

	#[test]
	fn like_pattern_escapes_metacharacters() {
		assert_eq!(like_pattern("suv"), "%suv%");
		assert_eq!(like_pattern("100%"), "%100\\%%");
		assert_eq!(like_pattern("car_type"), "%car\\_type%");
		assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
	}
}
