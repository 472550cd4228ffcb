use std::{
    fs::{create_dir_all, File},
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::Context as _;
use chrono::{DateTime, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    model::{
        driver::{Driver, LocationState},
        node::Node,
        order::{Order, OrderState},
    },
    simulation::snapshot::InputInform,
};

pub const DRIVER_INPUT_FILE: &str = "driver_input_info.json";
pub const UNALLOCATED_ORDERS_FILE: &str = "unallocated_orders.json";
pub const ONGOING_ORDERS_FILE: &str = "ongoing_orders.json";
pub const DESTINATION_FILE: &str = "destination.json";
pub const PLANNED_ROUTE_FILE: &str = "planned_route.json";

// Instants cross the process boundary as unix epoch seconds; zero stands
// for "not yet scheduled".
pub fn to_epoch(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp()
}

pub fn from_epoch(seconds: i64) -> anyhow::Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|time| time.naive_utc())
        .with_context(|| format!("timestamp {seconds} is out of range"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeJson {
    pub location_id: String,
    pub lat: f64,
    pub lng: f64,
    pub delivery_order_list: Vec<String>,
    pub pickup_order_list: Vec<String>,
    pub arrive_time: i64,
    pub leave_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverJson {
    pub id: String,
    pub operation_time: i32,
    pub capacity: i32,
    pub gps_id: String,
    pub update_time: i64,
    pub current_location_id: String,
    pub arrive_time_at_current_location: i64,
    pub leave_time_at_current_location: i64,
    pub carrying_orders: Vec<String>,
    pub destination: Option<NodeJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderJson {
    pub id: String,
    pub demand: i32,
    pub creation_time: i64,
    pub committed_completion_time: i64,
    pub load_time: i64,
    pub unload_time: i64,
    pub pickup_location_id: String,
    pub delivery_location_id: String,
    pub delivery_state: OrderState,
}

impl From<&Node> for NodeJson {
    fn from(node: &Node) -> Self {
        NodeJson {
            location_id: node.location_id.0.clone(),
            lat: node.lat,
            lng: node.lng,
            delivery_order_list: node.delivery_orders.iter().map(|id| id.0.clone()).collect(),
            pickup_order_list: node.pickup_orders.iter().map(|id| id.0.clone()).collect(),
            arrive_time: node.arrive_time.map(to_epoch).unwrap_or(0),
            leave_time: node.leave_time.map(to_epoch).unwrap_or(0),
        }
    }
}

impl NodeJson {
    pub fn into_node(self) -> anyhow::Result<Node> {
        Ok(Node {
            location_id: self.location_id.into(),
            lat: self.lat,
            lng: self.lng,
            pickup_orders: self.pickup_order_list.into_iter().map(Into::into).collect(),
            delivery_orders: self.delivery_order_list.into_iter().map(Into::into).collect(),
            arrive_time: match self.arrive_time {
                0 => None,
                seconds => Some(from_epoch(seconds)?),
            },
            leave_time: match self.leave_time {
                0 => None,
                seconds => Some(from_epoch(seconds)?),
            },
        })
    }
}

impl From<&Driver> for DriverJson {
    fn from(driver: &Driver) -> Self {
        let (current_location_id, arrive, leave) = match &driver.position {
            LocationState::AtStop {
                location_id,
                arrive_time,
                leave_time,
            } => (location_id.0.clone(), to_epoch(*arrive_time), to_epoch(*leave_time)),
            LocationState::InTransit => (String::new(), 0, 0),
        };
        DriverJson {
            id: driver.id.0.clone(),
            operation_time: driver.operation_time,
            capacity: driver.capacity,
            gps_id: driver.gps_id.clone(),
            update_time: to_epoch(driver.gps_update_time),
            current_location_id,
            arrive_time_at_current_location: arrive,
            leave_time_at_current_location: leave,
            carrying_orders: driver.carrying_orders.iter().map(|id| id.0.clone()).collect(),
            destination: driver.destination.as_ref().map(NodeJson::from),
        }
    }
}

impl From<&Order> for OrderJson {
    fn from(order: &Order) -> Self {
        OrderJson {
            id: order.id.0.clone(),
            demand: order.demand,
            creation_time: to_epoch(order.creation_time),
            committed_completion_time: to_epoch(order.committed_completion_time),
            load_time: order.load_time.num_seconds(),
            unload_time: order.unload_time.num_seconds(),
            pickup_location_id: order.pickup_location_id.0.clone(),
            delivery_location_id: order.delivery_location_id.0.clone(),
            delivery_state: order.delivery_state,
        }
    }
}

pub fn write_json_to_file<T>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()>
where
    T: ?Sized + Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

pub fn read_json_from_file<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Serialize the snapshot into the three per-tick input files.
pub fn write_dispatch_input(dir: impl AsRef<Path>, input: &InputInform) -> anyhow::Result<()> {
    let dir = dir.as_ref();
    let drivers: Vec<DriverJson> = input.id_to_driver.values().map(DriverJson::from).collect();
    write_json_to_file(dir.join(DRIVER_INPUT_FILE), &drivers)?;
    let unallocated: Vec<OrderJson> = input
        .id_to_unallocated_order
        .values()
        .map(OrderJson::from)
        .collect();
    write_json_to_file(dir.join(UNALLOCATED_ORDERS_FILE), &unallocated)?;
    let ongoing: Vec<OrderJson> = input
        .id_to_ongoing_order
        .values()
        .map(OrderJson::from)
        .collect();
    write_json_to_file(dir.join(ONGOING_ORDERS_FILE), &ongoing)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::model::location::{Location, Restaurant};

    use super::*;

    #[test]
    fn epoch_round_trip() {
        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        assert_eq!(from_epoch(to_epoch(time)).unwrap(), time);
    }

    #[test]
    fn node_round_trip_keeps_unset_times_unset() {
        let node = Node::new(
            &Location::Restaurant(Restaurant {
                id: "R_1".into(),
                latitude: 31.2,
                longitude: 121.4,
                dispatch_radius: 1000,
                customer_radius: 1000,
                wait_time: 60,
            }),
            vec!["O_1".into()],
            vec![],
        );
        let json = NodeJson::from(&node);
        assert_eq!(json.arrive_time, 0);
        let back = json.into_node().unwrap();
        assert_eq!(back, node);
    }
}
