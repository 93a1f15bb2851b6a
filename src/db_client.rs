use std::ops::{Deref, DerefMut};

use anyhow::Context;
use tokio_postgres::{Client, NoTls};

#[derive(Clone)]
pub struct DbConfig {
	pub url: String,
}

impl DbConfig {
	pub fn from_env() -> anyhow::Result<Self> {
		let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
		Ok(DbConfig { url })
	}
}

pub struct DbClient(pub Client);

impl DbClient {
	pub async fn connect(config: &DbConfig) -> Result<Self, tokio_postgres::Error> {
		let (client, connection) = tokio_postgres::connect(&config.url, NoTls).await?;

		tokio::spawn(async move {
			if let Err(e) = connection.await {
				log::error!("connection error: {}", e);
			}
		});

		Ok(DbClient(client))
	}
}

impl Deref for DbClient {
	type Target = Client;

	fn deref(&self) -> &Client {
		&self.0
	}
}

impl DerefMut for DbClient {
	fn deref_mut(&mut self) -> &mut Client {
		&mut self.0
	}
}

// create table users(
// 	id serial primary key,
// 	name varchar(255) not null,
// 	email varchar(255) not null unique,
// 	phone_number varchar(255) not null,
// 	address varchar(255) not null,
// 	password_hash varchar(255) not null
// );
// create table car(
// 	id serial primary key,
// 	name varchar(255) not null,
// 	car_type varchar(255) not null,
// 	rent_per_day double precision not null,
// 	total_count integer not null,
// 	available_count integer not null,
// 	check (available_count >= 0 and available_count <= total_count)
// );
// create table user_rental(
// 	id serial primary key,
// 	user_id integer not null references users(id),
// 	car_id integer not null references car(id),
// 	rented_count integer not null check (rented_count > 0),
// 	duration_days integer not null,
// 	started_at timestamptz not null,
// 	ended_at timestamptz,
// 	total_rent double precision
// );
