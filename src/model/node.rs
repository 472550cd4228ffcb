use chrono::{NaiveDateTime, TimeDelta};

use super::{
    location::{Location, LocationId},
    order::{OrderId, OrderMap},
};

/// One stop on a planned route. Nodes reference orders by id; the owning
/// order table resolves them on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub location_id: LocationId,
    pub lat: f64,
    pub lng: f64,
    pub pickup_orders: Vec<OrderId>,
    pub delivery_orders: Vec<OrderId>,
    pub arrive_time: Option<NaiveDateTime>,
    pub leave_time: Option<NaiveDateTime>,
}

impl Node {
    pub fn new(location: &Location, pickup_orders: Vec<OrderId>, delivery_orders: Vec<OrderId>) -> Self {
        Self {
            location_id: location.id().clone(),
            lat: location.lat(),
            lng: location.lng(),
            pickup_orders,
            delivery_orders,
            arrive_time: None,
            leave_time: None,
        }
    }

    /// Total loading plus unloading duration at this stop.
    pub fn service_time(&self, orders: &OrderMap) -> TimeDelta {
        let load: TimeDelta = self
            .pickup_orders
            .iter()
            .map(|id| orders[id].load_time)
            .sum();
        let unload: TimeDelta = self
            .delivery_orders
            .iter()
            .map(|id| orders[id].unload_time)
            .sum();
        load + unload
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    fn absorb(&mut self, other: Node) {
        self.pickup_orders.extend(other.pickup_orders);
        self.delivery_orders.extend(other.delivery_orders);
    }
}

/// Collapse adjacent nodes that share a location id, concatenating their
/// order lists. The surviving node keeps the first node's times.
pub fn combine_adjacent_nodes(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i + 1 < nodes.len() {
        if nodes[i].location_id == nodes[i + 1].location_id {
            let next = nodes.remove(i + 1);
            nodes[i].absorb(next);
        } else {
            i += 1;
        }
    }
}

pub fn has_adjacent_duplicates(nodes: &[Node]) -> bool {
    nodes
        .windows(2)
        .any(|pair| pair[0].location_id == pair[1].location_id)
}
