use chrono::NaiveDateTime;
use tracing::error;

use crate::model::{
    driver::{Driver, DriverId, DriverMap, LocationState},
    location::LocationId,
    node::Node,
    order::{OrderId, OrderMap},
    route_map::TravelMap,
};

/// The state of one driver as observed at a query time, ready to be written
/// back at the end of the tick's update phase.
#[derive(Debug, Clone)]
pub struct Observation {
    pub position: LocationState,
    pub update_time: NaiveDateTime,
    pub destination: Option<Node>,
    pub carrying_orders: Vec<OrderId>,
    pub picked_up: Vec<OrderId>,
    pub delivered: Vec<OrderId>,
}

/// Replay every driver's committed route from `from`, filling in the
/// arrive/leave times of the destination and each planned stop.
///
/// Drivers are processed sorted by the leave time at their current stop,
/// ascending, stable with respect to driver id. Each replay is independent;
/// the order only fixes the event ordering guarantee.
pub fn advance_routes(
    drivers: &mut DriverMap,
    orders: &OrderMap,
    travel_map: &TravelMap,
    from: NaiveDateTime,
) {
    let mut ids: Vec<DriverId> = drivers.keys().cloned().collect();
    ids.sort_by_key(|id| drivers[id].position.leave_time().unwrap_or(NaiveDateTime::MIN));
    for id in ids {
        advance_route_of_driver(&mut drivers[&id], orders, travel_map, from);
    }
}

fn advance_route_of_driver(
    driver: &mut Driver,
    orders: &OrderMap,
    travel_map: &TravelMap,
    from: NaiveDateTime,
) {
    let current = match &mut driver.position {
        LocationState::AtStop {
            location_id,
            leave_time,
            ..
        } => {
            // a driver that finished servicing before `from` simply has not
            // departed yet
            if *leave_time < from {
                *leave_time = from;
            }
            Some((location_id.clone(), *leave_time))
        }
        LocationState::InTransit => None,
    };

    let Some(destination) = driver.destination.as_mut() else {
        if current.is_none() {
            error!(
                "driver {}: both the current location and the destination are absent",
                driver.id
            );
        }
        return;
    };

    let arrive = match &current {
        Some((location_id, leave)) => {
            *leave + travel_map.time_or_instant(location_id, &destination.location_id)
        }
        None => match destination.arrive_time {
            Some(arrive) if arrive >= from => arrive,
            Some(arrive) => {
                error!(
                    "driver {} is driving toward {}, but the current time {} is past the \
                     committed arrival time {}",
                    driver.id, destination.location_id, from, arrive
                );
                from
            }
            None => {
                error!(
                    "driver {} is in transit toward {} without a committed arrival time",
                    driver.id, destination.location_id
                );
                from
            }
        },
    };
    destination.arrive_time = Some(arrive);
    let mut leave = arrive + destination.service_time(orders);
    destination.leave_time = Some(leave);

    let mut prev = destination.location_id.clone();
    for node in driver.planned_route.iter_mut() {
        let arrive = leave + travel_map.time_or_instant(&prev, &node.location_id);
        leave = arrive + node.service_time(orders);
        node.arrive_time = Some(arrive);
        node.leave_time = Some(leave);
        prev = node.location_id.clone();
    }
}

struct Stop {
    location_id: LocationId,
    arrive: NaiveDateTime,
    leave: NaiveDateTime,
}

fn stops_of_driver(driver: &Driver) -> Vec<Stop> {
    let mut stops = Vec::with_capacity(2 + driver.planned_route.len());
    if let LocationState::AtStop {
        location_id,
        arrive_time,
        leave_time,
    } = &driver.position
    {
        stops.push(Stop {
            location_id: location_id.clone(),
            arrive: *arrive_time,
            leave: *leave_time,
        });
    }
    for node in driver
        .destination
        .iter()
        .chain(driver.planned_route.iter())
    {
        // times are filled by advance_routes before any query
        let (Some(arrive), Some(leave)) = (node.arrive_time, node.leave_time) else {
            continue;
        };
        stops.push(Stop {
            location_id: node.location_id.clone(),
            arrive,
            leave,
        });
    }
    stops
}

/// Pure query of the replayed timeline at `to`: where the driver is, which
/// stop it heads to next, and which orders it has loaded and unloaded.
pub fn observe(driver: &Driver, to: NaiveDateTime) -> Observation {
    let stops = stops_of_driver(driver);

    let mut position = None;
    for stop in &stops {
        if stop.arrive <= to && to <= stop.leave {
            position = Some(LocationState::AtStop {
                location_id: stop.location_id.clone(),
                arrive_time: stop.arrive,
                leave_time: stop.leave,
            });
        }
    }
    if position.is_none() {
        // past the end of the route the driver is parked at its last stop
        if let Some(last) = stops.last() {
            if last.leave < to {
                position = Some(LocationState::AtStop {
                    location_id: last.location_id.clone(),
                    arrive_time: last.arrive,
                    leave_time: to,
                });
            }
        }
    }
    let position = position.unwrap_or(LocationState::InTransit);

    let destination = match &driver.destination {
        None => None,
        Some(node) if node.arrive_time.is_some_and(|arrive| arrive > to) => Some(node.clone()),
        Some(_) => driver
            .planned_route
            .iter()
            .find(|node| node.arrive_time.is_some_and(|arrive| arrive > to))
            .cloned(),
    };

    let mut carrying_orders = driver.carrying_orders.clone();
    let mut picked_up = Vec::new();
    let mut delivered = Vec::new();
    for node in driver
        .destination
        .iter()
        .chain(driver.planned_route.iter())
    {
        if !node.arrive_time.is_some_and(|arrive| arrive <= to) {
            continue;
        }
        for id in &node.delivery_orders {
            if let Some(index) = carrying_orders.iter().position(|carried| carried == id) {
                carrying_orders.remove(index);
                delivered.push(id.clone());
            }
        }
        for id in &node.pickup_orders {
            carrying_orders.push(id.clone());
            picked_up.push(id.clone());
        }
    }

    Observation {
        position,
        update_time: to,
        destination,
        carrying_orders,
        picked_up,
        delivered,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};

    use crate::model::{
        driver::DriverRecord,
        location::{Customer, Location, LocationId, Restaurant},
        order::{Order, OrderState},
        route_map::RouteRecord,
    };

    use super::*;

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    fn order(id: &str, pickup: &str, delivery: &str) -> Order {
        Order {
            id: id.into(),
            demand: 1,
            creation_time: t(0),
            committed_completion_time: t(3600),
            load_time: TimeDelta::seconds(30),
            unload_time: TimeDelta::seconds(30),
            pickup_location_id: pickup.into(),
            delivery_location_id: delivery.into(),
            delivery_state: OrderState::Generated,
        }
    }

    fn restaurant(id: &str) -> Location {
        Location::Restaurant(Restaurant {
            id: id.into(),
            latitude: 0.0,
            longitude: 0.0,
            dispatch_radius: 1000,
            customer_radius: 1000,
            wait_time: 60,
        })
    }

    fn customer(id: &str) -> Location {
        Location::Customer(Customer {
            id: id.into(),
            latitude: 0.0,
            longitude: 0.01,
        })
    }

    fn travel_map() -> TravelMap {
        TravelMap::from(vec![RouteRecord {
            route_code: "RT_1".to_string(),
            start_location_id: "R_1".into(),
            end_location_id: "C_1".into(),
            distance: 1.1,
            time: TimeDelta::seconds(60),
        }])
    }

    fn driver_at(location: &str, leave: NaiveDateTime) -> Driver {
        let mut driver = Driver::new(
            DriverRecord {
                car_num: "D_1".into(),
                capacity: 5,
                operation_time: 12,
                gps_id: "G_1".into(),
            },
            t(0),
        );
        driver.park_at(location.into(), t(0));
        if let LocationState::AtStop { leave_time, .. } = &mut driver.position {
            *leave_time = leave;
        }
        driver
    }

    fn orders_table() -> OrderMap {
        [(OrderId::from("O_1"), order("O_1", "R_1", "C_1"))]
            .into_iter()
            .collect()
    }

    #[test]
    fn fills_times_stop_by_stop() {
        let orders = orders_table();
        let mut driver = driver_at("R_1", t(0));
        driver.destination = Some(Node::new(&restaurant("R_1"), vec!["O_1".into()], vec![]));
        driver.planned_route = vec![Node::new(&customer("C_1"), vec![], vec!["O_1".into()])];

        advance_route_of_driver(&mut driver, &orders, &travel_map(), t(0));

        let destination = driver.destination.as_ref().unwrap();
        assert_eq!(destination.arrive_time, Some(t(0)));
        assert_eq!(destination.leave_time, Some(t(30)));
        assert_eq!(driver.planned_route[0].arrive_time, Some(t(90)));
        assert_eq!(driver.planned_route[0].leave_time, Some(t(120)));
    }

    #[test]
    fn a_driver_that_finished_early_departs_at_the_replay_start() {
        let orders = orders_table();
        let mut driver = driver_at("R_1", t(0));
        driver.destination = Some(Node::new(&customer("C_1"), vec![], vec![]));

        advance_route_of_driver(&mut driver, &orders, &travel_map(), t(600));

        assert_eq!(driver.position.leave_time(), Some(t(600)));
        assert_eq!(driver.destination.as_ref().unwrap().arrive_time, Some(t(660)));
    }

    #[test]
    fn in_transit_replay_honours_the_committed_arrival() {
        let orders = orders_table();
        let mut driver = driver_at("R_1", t(0));
        driver.position = LocationState::InTransit;
        let mut destination = Node::new(&customer("C_1"), vec![], vec!["O_1".into()]);
        destination.arrive_time = Some(t(300));
        driver.destination = Some(destination);
        driver.carrying_orders = vec!["O_1".into()];

        advance_route_of_driver(&mut driver, &orders, &travel_map(), t(100));

        let destination = driver.destination.as_ref().unwrap();
        assert_eq!(destination.arrive_time, Some(t(300)));
        assert_eq!(destination.leave_time, Some(t(330)));
    }

    #[test]
    fn observe_reports_in_transit_inside_a_gap() {
        let orders = orders_table();
        let mut driver = driver_at("R_1", t(0));
        driver.destination = Some(Node::new(&customer("C_1"), vec![], vec![]));
        advance_route_of_driver(&mut driver, &orders, &travel_map(), t(0));

        // between leaving R_1 at t=0 and arriving at C_1 at t=60
        let observation = observe(&driver, t(30));
        assert_eq!(observation.position, LocationState::InTransit);
        assert_eq!(
            observation.destination.as_ref().map(|n| n.location_id.clone()),
            Some(LocationId::from("C_1"))
        );
    }

    #[test]
    fn observe_applies_pickups_and_deliveries_up_to_the_query_time() {
        let orders = orders_table();
        let mut driver = driver_at("R_1", t(0));
        driver.destination = Some(Node::new(&restaurant("R_1"), vec!["O_1".into()], vec![]));
        driver.planned_route = vec![Node::new(&customer("C_1"), vec![], vec!["O_1".into()])];
        advance_route_of_driver(&mut driver, &orders, &travel_map(), t(0));

        // after loading at R_1 (t=30) but before reaching C_1 (t=90)
        let observation = observe(&driver, t(45));
        assert_eq!(observation.carrying_orders, vec![OrderId::from("O_1")]);
        assert_eq!(observation.picked_up, vec![OrderId::from("O_1")]);
        assert!(observation.delivered.is_empty());

        // past the whole route the order is delivered and the driver parked
        let observation = observe(&driver, t(500));
        assert!(observation.carrying_orders.is_empty());
        assert_eq!(observation.delivered, vec![OrderId::from("O_1")]);
        assert!(observation.destination.is_none());
        match observation.position {
            LocationState::AtStop {
                location_id,
                leave_time,
                ..
            } => {
                assert_eq!(location_id, LocationId::from("C_1"));
                assert_eq!(leave_time, t(500));
            }
            LocationState::InTransit => panic!("driver should be parked"),
        }
    }
}
