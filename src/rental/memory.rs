//! In-memory store used by the ledger tests: whole transactions are
//! serialized behind one lock, writes are staged and only become visible on
//! commit, and the fault hooks let tests inject write failures and
//! serialization conflicts.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::StoreError;
use super::store::{Car, NewRental, Rental, RentalStore, RentalTx};

#[derive(Clone, Default)]
struct MemState {
	cars: Vec<Car>,
	rentals: Vec<Rental>,
	next_rental_id: i32,
}

#[derive(Default)]
struct Faults {
	fail_count_write: bool,
	lock_conflicts: u32,
}

#[derive(Clone)]
pub struct MemStore {
	state: Arc<Mutex<MemState>>,
	faults: Arc<StdMutex<Faults>>,
}

impl MemStore {
	pub fn with_cars(cars: Vec<Car>) -> Self {
		MemStore {
			state: Arc::new(Mutex::new(MemState { cars, rentals: Vec::new(), next_rental_id: 1 })),
			faults: Arc::default(),
		}
	}

	pub async fn car(&self, car_id: i32) -> Option<Car> {
		self.state.lock().await.cars.iter().find(|c| c.id == car_id).cloned()
	}

	pub async fn rentals(&self) -> Vec<Rental> {
		self.state.lock().await.rentals.clone()
	}

	pub async fn seed_rental(&self, rental: NewRental) {
		let mut state = self.state.lock().await;
		let id = state.next_rental_id;
		state.next_rental_id += 1;
		state.rentals.push(open_rental(id, rental));
	}

	/// Makes the next `set_available_count` fail after it was reached.
	pub fn fail_next_count_write(&self) {
		self.faults.lock().unwrap().fail_count_write = true;
	}

	/// Makes the next `times` car lock attempts report a serialization
	/// conflict before succeeding.
	pub fn conflict_on_next_lock(&self, times: u32) {
		self.faults.lock().unwrap().lock_conflicts = times;
	}
}

fn open_rental(id: i32, rental: NewRental) -> Rental {
	Rental {
		id,
		user_id: rental.user_id,
		car_id: rental.car_id,
		rented_count: rental.rented_count,
		duration_days: rental.duration_days,
		started_at: rental.started_at,
		ended_at: None,
		total_rent: None,
	}
}

#[async_trait]
impl RentalStore for MemStore {
	async fn begin<'a>(&'a mut self) -> Result<Box<dyn RentalTx + Send + 'a>, StoreError> {
		let guard = self.state.clone().lock_owned().await;
		let staged = guard.clone();
		Ok(Box::new(MemTx { guard, staged, faults: self.faults.clone() }))
	}
}

struct MemTx {
	guard: OwnedMutexGuard<MemState>,
	staged: MemState,
	faults: Arc<StdMutex<Faults>>,
}

#[async_trait]
impl RentalTx for MemTx {
	async fn car_for_update(&mut self, car_id: i32) -> Result<Option<Car>, StoreError> {
		let mut faults = self.faults.lock().unwrap();
		if faults.lock_conflicts > 0 {
			faults.lock_conflicts -= 1;
			return Err(StoreError::Serialization);
		}
		drop(faults);
		Ok(self.staged.cars.iter().find(|c| c.id == car_id).cloned())
	}

	async fn set_available_count(&mut self, car_id: i32, available_count: i32) -> Result<(), StoreError> {
		let mut faults = self.faults.lock().unwrap();
		if faults.fail_count_write {
			faults.fail_count_write = false;
			return Err(StoreError::Backend("injected write failure".to_string()));
		}
		drop(faults);
		let car = self
			.staged
			.cars
			.iter_mut()
			.find(|c| c.id == car_id)
			.ok_or_else(|| StoreError::Backend("unknown car".to_string()))?;
		car.available_count = available_count;
		Ok(())
	}

	async fn insert_rental(&mut self, rental: NewRental) -> Result<Rental, StoreError> {
		let id = self.staged.next_rental_id;
		self.staged.next_rental_id += 1;
		let rental = open_rental(id, rental);
		self.staged.rentals.push(rental.clone());
		Ok(rental)
	}

	async fn rental_for_user(&mut self, rental_id: i32, user_id: i32) -> Result<Option<Rental>, StoreError> {
		Ok(self
			.staged
			.rentals
			.iter()
			.find(|r| r.id == rental_id && r.user_id == user_id)
			.cloned())
	}

	async fn close_rental(
		&mut self,
		rental_id: i32,
		ended_at: DateTime<Utc>,
		total_rent: f64,
	) -> Result<Rental, StoreError> {
		let rental = self
			.staged
			.rentals
			.iter_mut()
			.find(|r| r.id == rental_id)
			.ok_or_else(|| StoreError::Backend("unknown rental".to_string()))?;
		rental.ended_at = Some(ended_at);
		rental.total_rent = Some(total_rent);
		Ok(rental.clone())
	}

	async fn rentals_for_user(&mut self, user_id: i32, active: bool) -> Result<Vec<Rental>, StoreError> {
		let mut rentals: Vec<Rental> = self
			.staged
			.rentals
			.iter()
			.filter(|r| r.user_id == user_id && r.is_active() == active)
			.cloned()
			.collect();
		rentals.sort_by(|a, b| b.started_at.cmp(&a.started_at));
		Ok(rentals)
	}

	async fn list_cars(&mut self, query: Option<&str>) -> Result<Vec<Car>, StoreError> {
		let mut cars: Vec<Car> = match query {
			Some(q) => {
				let q = q.to_lowercase();
				self.staged
					.cars
					.iter()
					.filter(|c| {
						c.name.to_lowercase().contains(&q) || c.car_type.to_lowercase().contains(&q)
					})
					.cloned()
					.collect()
			}
			None => self.staged.cars.clone(),
		};
		cars.sort_by_key(|c| c.id);
		Ok(cars)
	}

	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		let MemTx { mut guard, staged, .. } = *self;
		*guard = staged;
		Ok(())
	}
}
