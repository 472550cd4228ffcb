use std::path::Path;

use anyhow::{bail, Context as _};
use chrono::NaiveDateTime;
use rand::{rngs::SmallRng, seq::IndexedRandom, SeedableRng};
use tracing::info;

use crate::model::{
    driver::{Driver, DriverMap, DriverRecord},
    location::{Customer, LocationId, LocationMap, Restaurant},
    order::{OrderMap, OrderRecord},
    route_map::{RouteRecord, TravelMap},
};

pub const CUSTOMERS_FILE: &str = "customers.csv";
pub const RESTAURANTS_FILE: &str = "restaurants.csv";
pub const ROUTES_FILE: &str = "routes.csv";
pub const DRIVERS_FILE: &str = "driver.csv";
pub const ORDERS_FILE: &str = "orders.csv";

pub struct InstanceData {
    pub orders: OrderMap,
    pub drivers: DriverMap,
    pub locations: LocationMap,
    pub travel_map: TravelMap,
}

/// Load the benchmark-level CSVs plus one instance folder and place every
/// driver at a seeded-random restaurant. Ill-formed input is fatal for the
/// instance.
pub fn load_instance(
    benchmark_dir: impl AsRef<Path>,
    instance: &str,
    initial_time: NaiveDateTime,
    seed: u64,
) -> anyhow::Result<InstanceData> {
    let benchmark_dir = benchmark_dir.as_ref();
    let customers = Customer::read(benchmark_dir.join(CUSTOMERS_FILE))
        .context("unable to load customers")?;
    let restaurants = Restaurant::read(benchmark_dir.join(RESTAURANTS_FILE))
        .context("unable to load restaurants")?;
    let locations = LocationMap::from_parts(restaurants, customers)?;
    info!("got {} locations", locations.len());

    let routes = RouteRecord::read(benchmark_dir.join(ROUTES_FILE)).context("unable to load routes")?;
    for route in &routes {
        for id in [&route.start_location_id, &route.end_location_id] {
            if !locations.contains_key(id) {
                bail!("route {} references the unknown location {id}", route.route_code);
            }
        }
    }
    info!("got {} routes", routes.len());
    let travel_map = TravelMap::from(routes);

    let instance_dir = benchmark_dir.join(instance);
    let driver_records =
        DriverRecord::read(instance_dir.join(DRIVERS_FILE)).context("unable to load drivers")?;
    let mut drivers = DriverMap::default();
    for record in driver_records {
        let id = record.car_num.clone();
        if !drivers.contains_key(&id) {
            drivers.insert(id, Driver::new(record, initial_time));
        }
    }
    info!("got {} drivers", drivers.len());

    let order_records =
        OrderRecord::read(instance_dir.join(ORDERS_FILE)).context("unable to load orders")?;
    let mut orders = OrderMap::default();
    for record in order_records {
        let order = record.into_order(initial_time.date());
        match locations.get(&order.pickup_location_id) {
            Some(location) if location.is_restaurant() => {}
            Some(_) => bail!(
                "order {}: pickup location {} is not a restaurant",
                order.id,
                order.pickup_location_id
            ),
            None => bail!("order {}: unknown pickup location {}", order.id, order.pickup_location_id),
        }
        match locations.get(&order.delivery_location_id) {
            Some(location) if !location.is_restaurant() => {}
            Some(_) => bail!(
                "order {}: delivery location {} is not a customer",
                order.id,
                order.delivery_location_id
            ),
            None => bail!(
                "order {}: unknown delivery location {}",
                order.id,
                order.delivery_location_id
            ),
        }
        if !orders.contains_key(&order.id) {
            orders.insert(order.id.clone(), order);
        }
    }
    info!("got {} orders", orders.len());

    place_drivers_at_restaurants(&mut drivers, &locations, initial_time, seed)?;

    Ok(InstanceData {
        orders,
        drivers,
        locations,
        travel_map,
    })
}

// Drivers start their shift parked at restaurants chosen by the seeded RNG.
fn place_drivers_at_restaurants(
    drivers: &mut DriverMap,
    locations: &LocationMap,
    initial_time: NaiveDateTime,
    seed: u64,
) -> anyhow::Result<()> {
    let restaurant_ids: Vec<&LocationId> = locations
        .iter()
        .filter(|(_, location)| location.is_restaurant())
        .map(|(id, _)| id)
        .collect();
    if restaurant_ids.is_empty() {
        bail!("no restaurants to place the drivers at");
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    for driver in drivers.values_mut() {
        let restaurant_id = *restaurant_ids
            .choose(&mut rng)
            .expect("restaurant list is not empty");
        driver.park_at(restaurant_id.clone(), initial_time);
        info!("initial position of {} is {restaurant_id}", driver.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;

    use super::*;

    fn write_benchmark(dir: &Path) {
        fs::create_dir_all(dir.join("instance_1")).unwrap();
        fs::write(
            dir.join(CUSTOMERS_FILE),
            "customer_id,latitude,longitude\nC_1,31.20,121.40\n",
        )
        .unwrap();
        fs::write(
            dir.join(RESTAURANTS_FILE),
            "restaurant_id,latitude,longitude,dispatch_radius,customer_radius,wait_time\n\
             R_1,31.21,121.41,1000,2000,300\n",
        )
        .unwrap();
        fs::write(
            dir.join(ROUTES_FILE),
            "route_code,start_location_id,end_location_id,distance,time\nRT_1,R_1,C_1,1.5,120\n",
        )
        .unwrap();
        fs::write(
            dir.join("instance_1").join(DRIVERS_FILE),
            "car_num,capacity,operation_time,gps_id\nD_1,5,12,G_1\n",
        )
        .unwrap();
        fs::write(
            dir.join("instance_1").join(ORDERS_FILE),
            "order_id,pickup_id,delivery_id,demand,creation_time,committed_completion_time,\
             load_time,unload_time\nO_1,R_1,C_1,1,06:10:00,07:10:00,60,60\n",
        )
        .unwrap();
    }

    #[test]
    fn loads_a_complete_instance() {
        let dir = std::env::temp_dir().join("fds_rust_instance_test");
        let _ = fs::remove_dir_all(&dir);
        write_benchmark(&dir);
        let initial_time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();

        let data = load_instance(&dir, "instance_1", initial_time, 1).unwrap();
        assert_eq!(data.orders.len(), 1);
        assert_eq!(data.drivers.len(), 1);
        assert_eq!(data.locations.len(), 2);
        let driver = data.drivers.values().next().unwrap();
        assert_eq!(
            driver.position.location_id(),
            Some(&LocationId::from("R_1"))
        );
        let order = data.orders.values().next().unwrap();
        assert_eq!(order.creation_time, initial_time + chrono::TimeDelta::minutes(10));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_order_location_is_fatal() {
        let dir = std::env::temp_dir().join("fds_rust_instance_bad_test");
        let _ = fs::remove_dir_all(&dir);
        write_benchmark(&dir);
        fs::write(
            dir.join("instance_1").join(ORDERS_FILE),
            "order_id,pickup_id,delivery_id,demand,creation_time,committed_completion_time,\
             load_time,unload_time\nO_1,R_9,C_1,1,06:10:00,07:10:00,60,60\n",
        )
        .unwrap();
        let initial_time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        assert!(load_instance(&dir, "instance_1", initial_time, 1).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
