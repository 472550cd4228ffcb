use std::collections::BTreeSet;

use anyhow::{anyhow, bail};
use tracing::warn;

use crate::{
    dispatch::DispatchResult,
    model::{
        driver::{Driver, DriverMap},
        node::Node,
        order::{OrderId, OrderMap},
    },
};

/// Validate a dispatch before it is applied. Any violation is fatal to the
/// instance; adjacent duplicate stops are only warned about.
pub fn check_dispatch_result(
    result: &DispatchResult,
    drivers: &DriverMap,
    orders: &OrderMap,
) -> anyhow::Result<()> {
    if result.driver_id_to_destination.len() != drivers.len() {
        bail!(
            "{} destinations returned for {} drivers",
            result.driver_id_to_destination.len(),
            drivers.len()
        );
    }
    if result.driver_id_to_planned_route.len() != drivers.len() {
        bail!(
            "{} planned routes returned for {} drivers",
            result.driver_id_to_planned_route.len(),
            drivers.len()
        );
    }

    for (driver_id, driver) in drivers.iter() {
        let destination = result
            .driver_id_to_destination
            .get(driver_id)
            .ok_or_else(|| anyhow!("no destination returned for driver {driver_id}"))?;
        check_destination(destination.as_ref(), driver)?;

        let planned_route = result
            .driver_id_to_planned_route
            .get(driver_id)
            .ok_or_else(|| anyhow!("no planned route returned for driver {driver_id}"))?;

        let route: Vec<&Node> = destination.iter().chain(planned_route.iter()).collect();
        if route.is_empty() {
            continue;
        }
        check_capacity(&route, driver, orders)?;
        warn_adjacent_duplicates(&route, driver);
        check_duplicate_orders(&route, driver)?;
        check_order_locations(&route, orders)?;
    }
    Ok(())
}

// C2: a committed destination is immutable in id and arrival time; an
// in-transit driver must always be given one.
fn check_destination(returned: Option<&Node>, driver: &Driver) -> anyhow::Result<()> {
    match (&driver.destination, returned) {
        (Some(committed), None) => bail!(
            "driver {}: returned destination is absent but {} is committed",
            driver.id,
            committed.location_id
        ),
        (Some(committed), Some(returned)) => {
            if committed.location_id != returned.location_id {
                bail!(
                    "driver {}: returned destination {} differs from the committed {}",
                    driver.id,
                    returned.location_id,
                    committed.location_id
                );
            }
            if committed.arrive_time != returned.arrive_time {
                bail!(
                    "driver {}: arrive time of the returned destination {:?} differs from the \
                     committed {:?}",
                    driver.id,
                    returned.arrive_time,
                    committed.arrive_time
                );
            }
            Ok(())
        }
        (None, None) if !driver.position.is_at_stop() => bail!(
            "driver {} is in transit but the returned destination is absent; the driver cannot \
             be located",
            driver.id
        ),
        _ => Ok(()),
    }
}

// C3: starting from the carried weight, no prefix of the route may exceed
// capacity or drop below zero.
fn check_capacity(route: &[&Node], driver: &Driver, orders: &OrderMap) -> anyhow::Result<()> {
    let demand_of = |id: &OrderId| -> anyhow::Result<i32> {
        orders
            .get(id)
            .map(|order| order.demand)
            .ok_or_else(|| anyhow!("unknown order {id} in the route of driver {}", driver.id))
    };
    let mut left_capacity = driver.capacity;
    for id in &driver.carrying_orders {
        left_capacity -= demand_of(id)?;
        if left_capacity < 0 {
            bail!("driver {}: left capacity {left_capacity} < 0", driver.id);
        }
    }
    for node in route {
        for id in &node.delivery_orders {
            left_capacity += demand_of(id)?;
            if left_capacity > driver.capacity {
                bail!(
                    "driver {}: left capacity {left_capacity} > capacity {}",
                    driver.id,
                    driver.capacity
                );
            }
        }
        for id in &node.pickup_orders {
            left_capacity -= demand_of(id)?;
            if left_capacity < 0 {
                bail!("driver {}: left capacity {left_capacity} < 0", driver.id);
            }
        }
    }
    Ok(())
}

// C6, warning only.
fn warn_adjacent_duplicates(route: &[&Node], driver: &Driver) {
    for pair in route.windows(2) {
        if pair[0].location_id == pair[1].location_id {
            warn!(
                "driver {} has adjacent duplicated stops at {} which are encouraged to be \
                 combined into one",
                driver.id, pair[0].location_id
            );
        }
    }
}

// C4: carried orders may not be picked up again, and no pickup may appear
// twice across the route.
fn check_duplicate_orders(route: &[&Node], driver: &Driver) -> anyhow::Result<()> {
    let mut seen: BTreeSet<&OrderId> = BTreeSet::new();
    for id in &driver.carrying_orders {
        if !seen.insert(id) {
            bail!("driver {}: order {id} is carried twice", driver.id);
        }
    }
    for node in route {
        for id in &node.pickup_orders {
            if !seen.insert(id) {
                bail!("driver {}: duplicate pickup of order {id}", driver.id);
            }
        }
    }
    Ok(())
}

// C5: every order is picked up at its restaurant and delivered at its
// customer.
fn check_order_locations(route: &[&Node], orders: &OrderMap) -> anyhow::Result<()> {
    for node in route {
        for id in &node.pickup_orders {
            let order = orders
                .get(id)
                .ok_or_else(|| anyhow!("unknown order {id} in a pickup list"))?;
            if order.pickup_location_id != node.location_id {
                bail!(
                    "pickup location of order {id} is {}, but the driver is told to pick it up \
                     at {}",
                    order.pickup_location_id,
                    node.location_id
                );
            }
        }
        for id in &node.delivery_orders {
            let order = orders
                .get(id)
                .ok_or_else(|| anyhow!("unknown order {id} in a delivery list"))?;
            if order.delivery_location_id != node.location_id {
                bail!(
                    "delivery location of order {id} is {}, but the driver is told to deliver \
                     it at {}",
                    order.delivery_location_id,
                    node.location_id
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    use crate::model::{
        driver::DriverRecord,
        location::{Customer, Location, Restaurant},
        order::{Order, OrderState},
        MapType,
    };

    use super::*;

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn order(id: &str, demand: i32, delivery: &str) -> Order {
        Order {
            id: id.into(),
            demand,
            creation_time: t(0),
            committed_completion_time: t(3600),
            load_time: TimeDelta::seconds(30),
            unload_time: TimeDelta::seconds(30),
            pickup_location_id: "R_1".into(),
            delivery_location_id: delivery.into(),
            delivery_state: OrderState::Generated,
        }
    }

    fn restaurant_node(pickups: &[&str]) -> Node {
        Node::new(
            &Location::Restaurant(Restaurant {
                id: "R_1".into(),
                latitude: 0.0,
                longitude: 0.0,
                dispatch_radius: 1000,
                customer_radius: 1000,
                wait_time: 60,
            }),
            pickups.iter().map(|id| OrderId::from(*id)).collect(),
            vec![],
        )
    }

    fn customer_node(id: &str, deliveries: &[&str]) -> Node {
        Node::new(
            &Location::Customer(Customer {
                id: id.into(),
                latitude: 0.0,
                longitude: 0.01,
            }),
            vec![],
            deliveries.iter().map(|id| OrderId::from(*id)).collect(),
        )
    }

    fn driver(capacity: i32) -> Driver {
        let mut driver = Driver::new(
            DriverRecord {
                car_num: "D_1".into(),
                capacity,
                operation_time: 12,
                gps_id: "G_1".into(),
            },
            t(0),
        );
        driver.park_at("R_1".into(), t(0));
        driver
    }

    fn world(driver: Driver, orders: Vec<Order>) -> (DriverMap, OrderMap) {
        let drivers: DriverMap = [(driver.id.clone(), driver)].into_iter().collect();
        let orders: OrderMap = orders
            .into_iter()
            .map(|order| (order.id.clone(), order))
            .collect();
        (drivers, orders)
    }

    fn result_of(destination: Option<Node>, route: Vec<Node>) -> DispatchResult {
        DispatchResult {
            driver_id_to_destination: [("D_1".into(), destination)]
                .into_iter()
                .collect(),
            driver_id_to_planned_route: [("D_1".into(), route)].into_iter().collect(),
        }
    }

    #[test]
    fn accepts_a_consistent_dispatch() {
        let (drivers, orders) = world(driver(5), vec![order("O_1", 1, "C_1")]);
        let result = result_of(
            Some(restaurant_node(&["O_1"])),
            vec![customer_node("C_1", &["O_1"])],
        );
        assert!(check_dispatch_result(&result, &drivers, &orders).is_ok());
    }

    #[test]
    fn missing_driver_entry_is_rejected() {
        let (drivers, orders) = world(driver(5), vec![]);
        let result = DispatchResult {
            driver_id_to_destination: MapType::new(),
            driver_id_to_planned_route: [("D_1".into(), vec![])].into_iter().collect(),
        };
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());
    }

    #[test]
    fn changed_committed_destination_is_rejected() {
        let mut d = driver(5);
        let mut committed = restaurant_node(&[]);
        committed.arrive_time = Some(t(100));
        d.destination = Some(committed);
        let (drivers, orders) = world(d, vec![order("O_1", 1, "C_1")]);

        // same stop, different arrival time
        let mut returned = restaurant_node(&[]);
        returned.arrive_time = Some(t(200));
        let result = result_of(Some(returned), vec![]);
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());

        // different stop entirely
        let result = result_of(Some(customer_node("C_1", &[])), vec![]);
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());
    }

    #[test]
    fn capacity_prefix_violation_is_rejected() {
        let (drivers, orders) = world(
            driver(2),
            vec![
                order("O_1", 1, "C_1"),
                order("O_2", 1, "C_2"),
                order("O_3", 1, "C_3"),
            ],
        );
        // three simultaneous pickups on a capacity-2 driver
        let result = result_of(
            Some(restaurant_node(&["O_1", "O_2", "O_3"])),
            vec![
                customer_node("C_1", &["O_1"]),
                customer_node("C_2", &["O_2"]),
                customer_node("C_3", &["O_3"]),
            ],
        );
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());

        // sequencing the third pickup after a delivery keeps the prefix legal
        let result = result_of(
            Some(restaurant_node(&["O_1", "O_2"])),
            vec![
                customer_node("C_1", &["O_1"]),
                customer_node("C_2", &["O_2"]),
                restaurant_node(&["O_3"]),
                customer_node("C_3", &["O_3"]),
            ],
        );
        assert!(check_dispatch_result(&result, &drivers, &orders).is_ok());
    }

    #[test]
    fn duplicate_pickup_of_a_carried_order_is_rejected() {
        let mut d = driver(5);
        d.carrying_orders = vec!["O_1".into()];
        let mut o = order("O_1", 1, "C_1");
        o.delivery_state = OrderState::Ongoing;
        let (drivers, orders) = world(d, vec![o]);
        let result = result_of(
            Some(restaurant_node(&["O_1"])),
            vec![customer_node("C_1", &["O_1"])],
        );
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());
    }

    #[test]
    fn mismatched_pickup_location_is_rejected() {
        let (drivers, orders) = world(driver(5), vec![order("O_1", 1, "C_1")]);
        // order O_1 is picked up at R_1, not at C_1
        let result = result_of(
            Some(customer_node("C_1", &[])),
            vec![{
                let mut node = customer_node("C_1", &[]);
                node.pickup_orders = vec!["O_1".into()];
                node
            }],
        );
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());
    }

    #[test]
    fn in_transit_driver_must_get_a_destination() {
        let mut d = driver(5);
        d.position = crate::model::driver::LocationState::InTransit;
        let (drivers, orders) = world(d, vec![]);
        let result = result_of(None, vec![]);
        assert!(check_dispatch_result(&result, &drivers, &orders).is_err());
    }
}
