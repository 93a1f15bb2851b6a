use super::clock::Clock;
use super::error::{LedgerError, StoreError};
use super::store::{Car, NewRental, Rental, RentalStore, RentalTx};

#[derive(Debug, serde::Serialize)]
pub struct UserRentals {
	#[serde(rename = "past_rentals")]
	pub past: Vec<Rental>,
	#[serde(rename = "current_rentals")]
	pub current: Vec<Rental>,
}

/// Rental lifecycle and inventory bookkeeping. Every mutating operation runs
/// inside a single store transaction, so either all of its writes land or
/// none do. A serialization conflict on the car row is retried once before
/// being surfaced to the caller.
pub struct RentalLedger<S, C> {
	store: S,
	clock: C,
}

impl<S: RentalStore, C: Clock> RentalLedger<S, C> {
	pub fn new(store: S, clock: C) -> Self {
		RentalLedger { store, clock }
	}

	pub async fn rent_car(
		&mut self,
		user_id: i32,
		car_id: i32,
		requested_count: i32,
		duration_days: i32,
	) -> Result<Rental, LedgerError> {
		if requested_count <= 0 {
			return Err(LedgerError::InvalidCount);
		}
		match self.try_rent(user_id, car_id, requested_count, duration_days).await {
			Err(LedgerError::Store(StoreError::Serialization)) => {
				log::warn!("rent of car {} hit a write conflict, retrying", car_id);
				self.try_rent(user_id, car_id, requested_count, duration_days)
					.await
					.map_err(surface_contention)
			}
			res => res,
		}
	}

	async fn try_rent(
		&mut self,
		user_id: i32,
		car_id: i32,
		requested_count: i32,
		duration_days: i32,
	) -> Result<Rental, LedgerError> {
		let mut tx = self.store.begin().await?;
		let car = tx.car_for_update(car_id).await?.ok_or(LedgerError::CarNotFound)?;
		if car.available_count == 0 {
			return Err(LedgerError::SoldOut);
		}
		if car.available_count < requested_count {
			return Err(LedgerError::InsufficientStock { available: car.available_count });
		}
		let rental = tx
			.insert_rental(NewRental {
				user_id,
				car_id,
				rented_count: requested_count,
				duration_days,
				started_at: self.clock.now_utc(),
			})
			.await?;
		tx.set_available_count(car.id, car.available_count - requested_count).await?;
		tx.commit().await?;
		log::info!(
			"user {} rented {} of car {} as rental {}",
			user_id,
			requested_count,
			car_id,
			rental.id
		);
		Ok(rental)
	}

	/// Closes a rental and restores its units to the pool. Billing counts
	/// only full 24-hour periods since the rental started: a return after
	/// 23 hours is free, one after 50 hours bills two days.
	pub async fn return_car(&mut self, user_id: i32, rental_id: i32) -> Result<Rental, LedgerError> {
		match self.try_return(user_id, rental_id).await {
			Err(LedgerError::Store(StoreError::Serialization)) => {
				log::warn!("return of rental {} hit a write conflict, retrying", rental_id);
				self.try_return(user_id, rental_id).await.map_err(surface_contention)
			}
			res => res,
		}
	}

	async fn try_return(&mut self, user_id: i32, rental_id: i32) -> Result<Rental, LedgerError> {
		let mut tx = self.store.begin().await?;
		let rental = tx
			.rental_for_user(rental_id, user_id)
			.await?
			.ok_or(LedgerError::RentalNotFound)?;
		if !rental.is_active() {
			return Err(LedgerError::AlreadyReturned);
		}
		let car = tx
			.car_for_update(rental.car_id)
			.await?
			.ok_or(LedgerError::Corrupt("rental references a missing car"))?;
		let restored = car.available_count + rental.rented_count;
		if restored > car.total_count {
			return Err(LedgerError::Corrupt("return would exceed the fleet size"));
		}
		let now = self.clock.now_utc();
		let billed_days = (now - rental.started_at).num_days().max(0);
		let total_rent = billed_days as f64 * car.rent_per_day * rental.rented_count as f64;
		let closed = tx.close_rental(rental.id, now, total_rent).await?;
		tx.set_available_count(car.id, restored).await?;
		tx.commit().await?;
		log::info!(
			"user {} returned rental {} after {} billed days",
			user_id,
			rental_id,
			billed_days
		);
		Ok(closed)
	}

	/// Past and current rentals of one user, read from a single snapshot so
	/// a concurrent return cannot land a rental in both lists.
	pub async fn list_user_rentals(&mut self, user_id: i32) -> Result<UserRentals, LedgerError> {
		let mut tx = self.store.begin().await?;
		let current = tx.rentals_for_user(user_id, true).await?;
		let past = tx.rentals_for_user(user_id, false).await?;
		tx.commit().await?;
		Ok(UserRentals { past, current })
	}

	pub async fn list_cars(&mut self, query: Option<&str>) -> Result<Vec<Car>, LedgerError> {
		let query = query.filter(|q| !q.is_empty());
		let mut tx = self.store.begin().await?;
		let cars = tx.list_cars(query).await?;
		tx.commit().await?;
		Ok(cars)
	}
}

fn surface_contention(err: LedgerError) -> LedgerError {
	match err {
		LedgerError::Store(StoreError::Serialization) => LedgerError::Contention,
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use chrono::{DateTime, Duration, TimeZone, Utc};

	use super::super::clock::SystemClock;
	use super::super::memory::MemStore;
	use super::*;

	#[derive(Clone)]
	struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

	impl ManualClock {
		fn at(start: DateTime<Utc>) -> Self {
			ManualClock(Arc::new(Mutex::new(start)))
		}

		fn advance(&self, by: Duration) {
			*self.0.lock().unwrap() += by;
		}
	}

	impl Clock for ManualClock {
		fn now_utc(&self) -> DateTime<Utc> {
			*self.0.lock().unwrap()
		}
	}

	fn start_time() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()
	}

	fn car(id: i32, rent_per_day: f64, total: i32, available: i32) -> Car {
		Car {
			id,
			name: format!("car-{}", id),
			car_type: "hatchback".to_string(),
			rent_per_day,
			total_count: total,
			available_count: available,
		}
	}

	#[tokio::test]
	async fn rent_decrements_availability_and_opens_rental() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock);

		let rental = ledger.rent_car(5, 1, 2, 3).await.unwrap();
		assert_eq!(rental.user_id, 5);
		assert_eq!(rental.car_id, 1);
		assert_eq!(rental.rented_count, 2);
		assert_eq!(rental.duration_days, 3);
		assert_eq!(rental.started_at, start_time());
		assert!(rental.ended_at.is_none());
		assert!(rental.total_rent.is_none());

		assert_eq!(store.car(1).await.unwrap().available_count, 1);
	}

	#[tokio::test]
	async fn rent_fails_when_fewer_units_available() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);

		ledger.rent_car(5, 1, 2, 3).await.unwrap();
		let err = ledger.rent_car(6, 1, 2, 3).await.unwrap_err();
		assert!(matches!(err, LedgerError::InsufficientStock { available: 1 }));
		// the failed attempt must not touch the count
		assert_eq!(store.car(1).await.unwrap().available_count, 1);
	}

	#[tokio::test]
	async fn rent_fails_when_sold_out() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 2, 0)]);
		let mut ledger = RentalLedger::new(store, SystemClock);
		let err = ledger.rent_car(5, 1, 1, 3).await.unwrap_err();
		assert!(matches!(err, LedgerError::SoldOut));
	}

	#[tokio::test]
	async fn rent_of_unknown_car_is_not_found() {
		let store = MemStore::with_cars(vec![]);
		let mut ledger = RentalLedger::new(store, SystemClock);
		let err = ledger.rent_car(5, 99, 1, 3).await.unwrap_err();
		assert!(matches!(err, LedgerError::CarNotFound));
	}

	#[tokio::test]
	async fn rent_rejects_non_positive_count() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);
		for count in [0, -2] {
			let err = ledger.rent_car(5, 1, count, 3).await.unwrap_err();
			assert!(matches!(err, LedgerError::InvalidCount));
		}
		assert_eq!(store.car(1).await.unwrap().available_count, 3);
	}

	#[tokio::test]
	async fn return_bills_only_full_elapsed_days() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock.clone());

		let rental = ledger.rent_car(5, 1, 2, 3).await.unwrap();
		clock.advance(Duration::hours(50));

		let closed = ledger.return_car(5, rental.id).await.unwrap();
		assert_eq!(closed.total_rent, Some(2.0 * 10.0 * 2.0));
		assert_eq!(closed.ended_at, Some(start_time() + Duration::hours(50)));
		assert_eq!(store.car(1).await.unwrap().available_count, 3);
	}

	#[tokio::test]
	async fn return_within_first_day_bills_nothing() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store, clock.clone());

		let rental = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		clock.advance(Duration::hours(23));

		let closed = ledger.return_car(5, rental.id).await.unwrap();
		assert_eq!(closed.total_rent, Some(0.0));
	}

	#[tokio::test]
	async fn second_return_fails_as_already_returned() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock.clone());

		let rental = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		clock.advance(Duration::hours(30));
		ledger.return_car(5, rental.id).await.unwrap();

		let err = ledger.return_car(5, rental.id).await.unwrap_err();
		assert!(matches!(err, LedgerError::AlreadyReturned));
		// the failed second return must not restock again
		assert_eq!(store.car(1).await.unwrap().available_count, 3);
	}

	#[tokio::test]
	async fn return_of_foreign_or_unknown_rental_is_not_found() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store, SystemClock);

		let rental = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		let err = ledger.return_car(6, rental.id).await.unwrap_err();
		assert!(matches!(err, LedgerError::RentalNotFound));
		let err = ledger.return_car(5, rental.id + 100).await.unwrap_err();
		assert!(matches!(err, LedgerError::RentalNotFound));
	}

	#[tokio::test]
	async fn units_are_conserved_across_rent_and_return() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 5, 5)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock.clone());

		let first = ledger.rent_car(5, 1, 2, 3).await.unwrap();
		let _second = ledger.rent_car(6, 1, 1, 2).await.unwrap();
		clock.advance(Duration::hours(26));
		ledger.return_car(5, first.id).await.unwrap();

		let car = store.car(1).await.unwrap();
		let held: i32 = store
			.rentals()
			.await
			.iter()
			.filter(|r| r.car_id == 1 && r.is_active())
			.map(|r| r.rented_count)
			.sum();
		assert!(car.available_count >= 0 && car.available_count <= car.total_count);
		assert_eq!(car.available_count + held, car.total_count);
	}

	#[tokio::test]
	async fn return_that_would_exceed_fleet_size_is_rejected() {
		// seeded inconsistently on purpose: an active rental of 1 unit while
		// the car already shows a full pool
		let store = MemStore::with_cars(vec![car(1, 10.0, 2, 2)]);
		store
			.seed_rental(NewRental {
				user_id: 5,
				car_id: 1,
				rented_count: 1,
				duration_days: 1,
				started_at: start_time(),
			})
			.await;
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);

		let rental_id = store.rentals().await[0].id;
		let err = ledger.return_car(5, rental_id).await.unwrap_err();
		assert!(matches!(err, LedgerError::Corrupt(_)));
		assert_eq!(store.car(1).await.unwrap().available_count, 2);
		assert!(store.rentals().await[0].is_active());
	}

	#[tokio::test]
	async fn failed_write_leaves_no_partial_return() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock.clone());

		let rental = ledger.rent_car(5, 1, 2, 3).await.unwrap();
		clock.advance(Duration::hours(30));

		store.fail_next_count_write();
		let err = ledger.return_car(5, rental.id).await.unwrap_err();
		assert!(matches!(err, LedgerError::Store(StoreError::Backend(_))));

		// neither the close nor the restock may be visible
		let after = store.rentals().await.into_iter().find(|r| r.id == rental.id).unwrap();
		assert!(after.is_active());
		assert!(after.total_rent.is_none());
		assert_eq!(store.car(1).await.unwrap().available_count, 1);
	}

	#[tokio::test]
	async fn failed_write_leaves_no_partial_rent() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);

		store.fail_next_count_write();
		let err = ledger.rent_car(5, 1, 2, 3).await.unwrap_err();
		assert!(matches!(err, LedgerError::Store(StoreError::Backend(_))));

		assert_eq!(store.car(1).await.unwrap().available_count, 3);
		assert!(store.rentals().await.is_empty());
	}

	#[tokio::test]
	async fn one_serialization_conflict_is_retried() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);

		store.conflict_on_next_lock(1);
		let rental = ledger.rent_car(5, 1, 1, 3).await.unwrap();
		assert_eq!(rental.rented_count, 1);
		assert_eq!(store.car(1).await.unwrap().available_count, 2);
	}

	#[tokio::test]
	async fn repeated_serialization_conflicts_surface_as_contention() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 3, 3)]);
		let mut ledger = RentalLedger::new(store.clone(), SystemClock);

		store.conflict_on_next_lock(2);
		let err = ledger.rent_car(5, 1, 1, 3).await.unwrap_err();
		assert!(matches!(err, LedgerError::Contention));
		assert_eq!(store.car(1).await.unwrap().available_count, 3);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_rents_never_oversell() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 4, 4)]);

		let mut handles = Vec::new();
		for user_id in 0..6 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				RentalLedger::new(store, SystemClock).rent_car(user_id, 1, 1, 2).await
			}));
		}

		let mut ok = 0;
		let mut conflicts = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => ok += 1,
				Err(LedgerError::SoldOut) => conflicts += 1,
				Err(other) => panic!("unexpected error: {other}"),
			}
		}
		assert_eq!(ok, 4);
		assert_eq!(conflicts, 2);
		assert_eq!(store.car(1).await.unwrap().available_count, 0);
	}

	#[tokio::test]
	async fn rentals_are_partitioned_and_ordered_by_start_desc() {
		let store = MemStore::with_cars(vec![car(1, 10.0, 5, 5)]);
		let clock = ManualClock::at(start_time());
		let mut ledger = RentalLedger::new(store.clone(), clock.clone());

		let oldest = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		clock.advance(Duration::hours(5));
		let middle = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		clock.advance(Duration::hours(5));
		let newest = ledger.rent_car(5, 1, 1, 1).await.unwrap();
		clock.advance(Duration::hours(5));
		ledger.return_car(5, middle.id).await.unwrap();
		// a rental of someone else must not show up
		ledger.rent_car(6, 1, 1, 1).await.unwrap();

		let rentals = ledger.list_user_rentals(5).await.unwrap();
		let current: Vec<i32> = rentals.current.iter().map(|r| r.id).collect();
		assert_eq!(current, vec![newest.id, oldest.id]);
		let past: Vec<i32> = rentals.past.iter().map(|r| r.id).collect();
		assert_eq!(past, vec![middle.id]);
	}

	#[tokio::test]
	async fn list_cars_matches_name_or_type_case_insensitively() {
		let store = MemStore::with_cars(vec![
			Car {
				id: 1,
				name: "Swift Dzire".to_string(),
				car_type: "sedan".to_string(),
				rent_per_day: 10.0,
				total_count: 2,
				available_count: 2,
			},
			Car {
				id: 2,
				name: "Creta".to_string(),
				car_type: "SUV".to_string(),
				rent_per_day: 20.0,
				total_count: 2,
				available_count: 2,
			},
		]);
		let mut ledger = RentalLedger::new(store, SystemClock);

		let all = ledger.list_cars(None).await.unwrap();
		assert_eq!(all.len(), 2);
		// empty string behaves like no filter
		let all = ledger.list_cars(Some("")).await.unwrap();
		assert_eq!(all.len(), 2);

		let suvs = ledger.list_cars(Some("suv")).await.unwrap();
		assert_eq!(suvs.len(), 1);
		assert_eq!(suvs[0].id, 2);

		let swift = ledger.list_cars(Some("SWIFT")).await.unwrap();
		assert_eq!(swift.len(), 1);
		assert_eq!(swift[0].id, 1);

		assert!(ledger.list_cars(Some("lorry")).await.unwrap().is_empty());
	}
}
