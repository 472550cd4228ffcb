use std::path::Path;

use anyhow::bail;
use serde::Deserialize;

use crate::{define_id, define_map};

use super::read_csv;

define_id!(LocationId);

#[derive(Debug, Clone, Deserialize)]
pub struct Restaurant {
    #[serde(rename = "restaurant_id")]
    pub id: LocationId,
    pub latitude: f64,
    pub longitude: f64,
    pub dispatch_radius: i32,
    pub customer_radius: i32,
    pub wait_time: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    #[serde(rename = "customer_id")]
    pub id: LocationId,
    pub latitude: f64,
    pub longitude: f64,
}

impl Restaurant {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<Restaurant>> {
        read_csv(path)
    }
}

impl Customer {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<Customer>> {
        read_csv(path)
    }
}

#[derive(Debug, Clone)]
pub enum Location {
    Restaurant(Restaurant),
    Customer(Customer),
}

impl Location {
    pub fn id(&self) -> &LocationId {
        match self {
            Location::Restaurant(r) => &r.id,
            Location::Customer(c) => &c.id,
        }
    }

    pub fn lat(&self) -> f64 {
        match self {
            Location::Restaurant(r) => r.latitude,
            Location::Customer(c) => c.latitude,
        }
    }

    pub fn lng(&self) -> f64 {
        match self {
            Location::Restaurant(r) => r.longitude,
            Location::Customer(c) => c.longitude,
        }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat(), self.lng())
    }

    pub fn is_restaurant(&self) -> bool {
        matches!(self, Location::Restaurant(_))
    }
}

define_map!(LocationId, Location, LocationMap, "location");

impl LocationMap {
    // ids must be globally unique across both kinds
    pub fn from_parts(
        restaurants: Vec<Restaurant>,
        customers: Vec<Customer>,
    ) -> anyhow::Result<LocationMap> {
        let mut map = LocationMap::default();
        for restaurant in restaurants {
            let id = restaurant.id.clone();
            if map.contains_key(&id) {
                bail!("duplicate location id {id}");
            }
            map.insert(id, Location::Restaurant(restaurant));
        }
        for customer in customers {
            let id = customer.id.clone();
            if map.contains_key(&id) {
                bail!("duplicate location id {id}");
            }
            map.insert(id, Location::Customer(customer));
        }
        Ok(map)
    }
}
