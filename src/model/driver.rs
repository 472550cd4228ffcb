use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::{define_id, define_map};

use super::{
    location::LocationId,
    node::Node,
    order::{OrderId, OrderMap},
    read_csv,
};

define_id!(DriverId);

/// Where a driver currently is. `InTransit` replaces the wire encoding of
/// an empty location id; an in-transit driver must have a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationState {
    AtStop {
        location_id: LocationId,
        arrive_time: NaiveDateTime,
        leave_time: NaiveDateTime,
    },
    InTransit,
}

impl LocationState {
    pub fn location_id(&self) -> Option<&LocationId> {
        match self {
            LocationState::AtStop { location_id, .. } => Some(location_id),
            LocationState::InTransit => None,
        }
    }

    pub fn leave_time(&self) -> Option<NaiveDateTime> {
        match self {
            LocationState::AtStop { leave_time, .. } => Some(*leave_time),
            LocationState::InTransit => None,
        }
    }

    pub fn is_at_stop(&self) -> bool {
        matches!(self, LocationState::AtStop { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Driver {
    pub id: DriverId,
    pub capacity: i32,
    pub operation_time: i32,
    pub gps_id: String,
    pub gps_update_time: NaiveDateTime,
    pub position: LocationState,
    pub carrying_orders: Vec<OrderId>,
    pub destination: Option<Node>,
    pub planned_route: Vec<Node>,
}

impl Driver {
    pub fn new(record: DriverRecord, start: NaiveDateTime) -> Self {
        Self {
            id: record.car_num,
            capacity: record.capacity,
            operation_time: record.operation_time,
            gps_id: record.gps_id,
            gps_update_time: start,
            position: LocationState::InTransit,
            carrying_orders: Vec::new(),
            destination: None,
            planned_route: Vec::new(),
        }
    }

    pub fn park_at(&mut self, location_id: LocationId, time: NaiveDateTime) {
        self.position = LocationState::AtStop {
            location_id,
            arrive_time: time,
            leave_time: time,
        };
        self.gps_update_time = time;
    }

    pub fn carried_demand(&self, orders: &OrderMap) -> i32 {
        self.carrying_orders
            .iter()
            .map(|id| orders[id].demand)
            .sum()
    }

    /// The driver's origin for route planning: its current stop, or its
    /// committed destination while in transit.
    pub fn anchor_location_id(&self) -> Option<&LocationId> {
        match &self.position {
            LocationState::AtStop { location_id, .. } => Some(location_id),
            LocationState::InTransit => self.destination.as_ref().map(|node| &node.location_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DriverRecord {
    pub car_num: DriverId,
    pub capacity: i32,
    pub operation_time: i32,
    pub gps_id: String,
}

impl DriverRecord {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<DriverRecord>> {
        read_csv(path)
    }
}

define_map!(DriverId, Driver, DriverMap, "driver");

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::model::order::{Order, OrderState};

    use super::*;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn order(id: &str, demand: i32) -> Order {
        Order {
            id: id.into(),
            demand,
            creation_time: start(),
            committed_completion_time: start() + chrono::TimeDelta::hours(1),
            load_time: chrono::TimeDelta::seconds(30),
            unload_time: chrono::TimeDelta::seconds(30),
            pickup_location_id: "R_1".into(),
            delivery_location_id: "C_1".into(),
            delivery_state: OrderState::Ongoing,
        }
    }

    #[test]
    fn carried_demand_sums_over_the_order_table() {
        let orders: OrderMap = [
            (OrderId::from("O_1"), order("O_1", 2)),
            (OrderId::from("O_2"), order("O_2", 3)),
        ]
        .into_iter()
        .collect();
        let mut driver = Driver::new(
            DriverRecord {
                car_num: "D_1".into(),
                capacity: 10,
                operation_time: 12,
                gps_id: "G_1".into(),
            },
            start(),
        );
        driver.park_at("R_1".into(), start());
        driver.carrying_orders = vec!["O_1".into(), "O_2".into()];
        assert_eq!(driver.carried_demand(&orders), 5);
        assert_eq!(
            driver.anchor_location_id(),
            Some(&LocationId::from("R_1"))
        );
    }
}
