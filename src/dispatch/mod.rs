use std::collections::BTreeSet;

use anyhow::anyhow;

use crate::{
    model::{
        driver::{Driver, DriverId, DriverMap},
        node::{combine_adjacent_nodes, Node},
        order::{Order, OrderId},
        MapType,
    },
    simulation::snapshot::InputInform,
    utils::haversine_km,
};

pub mod external;
pub mod insertion;
pub mod nearest;
pub mod tsp;
pub mod wire;

/// Per-tick output of a dispatch policy: a committed next destination and
/// the remaining planned route for every driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub driver_id_to_destination: MapType<DriverId, Option<Node>>,
    pub driver_id_to_planned_route: MapType<DriverId, Vec<Node>>,
}

impl DispatchResult {
    /// Order ids covered by this dispatch: everything carried plus every
    /// pickup scheduled anywhere in the emitted routes.
    pub fn assigned_order_ids(&self, drivers: &DriverMap) -> BTreeSet<OrderId> {
        let mut ids = BTreeSet::new();
        for (_, driver) in drivers.iter() {
            ids.extend(driver.carrying_orders.iter().cloned());
        }
        for destination in self.driver_id_to_destination.values().flatten() {
            ids.extend(destination.pickup_orders.iter().cloned());
        }
        for route in self.driver_id_to_planned_route.values() {
            for node in route {
                ids.extend(node.pickup_orders.iter().cloned());
            }
        }
        ids
    }
}

pub trait Dispatcher {
    fn dispatch(&mut self, input: &InputInform) -> anyhow::Result<DispatchResult>;
}

pub(crate) fn pickup_node(order: &Order, input: &InputInform) -> Node {
    let location = &input.id_to_location[&order.pickup_location_id];
    Node::new(location, vec![order.id.clone()], vec![])
}

pub(crate) fn delivery_node(order: &Order, input: &InputInform) -> Node {
    let location = &input.id_to_location[&order.delivery_location_id];
    Node::new(location, vec![], vec![order.id.clone()])
}

pub(crate) fn carried_demand(driver: &Driver, input: &InputInform) -> i32 {
    driver
        .carrying_orders
        .iter()
        .map(|id| input.order(id).map(|order| order.demand).unwrap_or(0))
        .sum()
}

pub(crate) fn anchor_coords(driver: &Driver, input: &InputInform) -> Option<(f64, f64)> {
    match driver.anchor_location_id() {
        Some(id) => input.id_to_location.get(id).map(|location| location.coords()),
        None => driver.destination.as_ref().map(|node| node.coords()),
    }
}

/// Phases 1 and 2 of the reference policy, shared by every in-process
/// dispatcher. For each driver, build the working route: the committed
/// destination first (if any), then the carried orders' delivery stops in
/// open-TSP order from the anchor, then one delivery stop per pre-matched
/// pickup latent on the destination. Returns the routes plus the set of
/// pre-matched order ids, which phase 3 must not re-assign.
pub(crate) fn base_routes(
    input: &InputInform,
) -> anyhow::Result<(MapType<DriverId, Vec<Node>>, BTreeSet<OrderId>)> {
    let mut routes = MapType::new();
    let mut pre_matched = BTreeSet::new();

    for (driver_id, driver) in input.id_to_driver.iter() {
        let mut route: Vec<Node> = Vec::new();
        let mut already_routed: BTreeSet<OrderId> = BTreeSet::new();

        if let Some(destination) = &driver.destination {
            already_routed.extend(destination.delivery_orders.iter().cloned());
            route.push(destination.clone());
        }

        // route the remaining carried orders over their delivery stops
        let remaining: Vec<&Order> = driver
            .carrying_orders
            .iter()
            .filter(|id| !already_routed.contains(*id))
            .map(|id| {
                input
                    .order(id)
                    .ok_or_else(|| anyhow!("carried order {id} of driver {driver_id} is unknown"))
            })
            .collect::<anyhow::Result<_>>()?;
        if !remaining.is_empty() {
            if let Some(anchor) = anchor_coords(driver, input) {
                let mut stops: Vec<(f64, f64)> = vec![anchor];
                let mut stop_ids = vec![None];
                for order in &remaining {
                    if !stop_ids
                        .iter()
                        .any(|id| id.as_ref() == Some(&order.delivery_location_id))
                    {
                        let location = &input.id_to_location[&order.delivery_location_id];
                        stops.push(location.coords());
                        stop_ids.push(Some(order.delivery_location_id.clone()));
                    }
                }
                let matrix: Vec<Vec<f64>> = stops
                    .iter()
                    .map(|a| stops.iter().map(|b| haversine_km(*a, *b)).collect())
                    .collect();
                for index in tsp::open_route(&matrix).into_iter().skip(1) {
                    let location_id = stop_ids[index].clone().expect("only the root has no id");
                    let deliveries: Vec<OrderId> = remaining
                        .iter()
                        .filter(|order| order.delivery_location_id == location_id)
                        .map(|order| order.id.clone())
                        .collect();
                    let location = &input.id_to_location[&location_id];
                    route.push(Node::new(location, vec![], deliveries));
                }
            }
        }

        // pre-matched pickups: the committed destination is a restaurant
        // holding a latent pickup list from a prior dispatch
        if let Some(destination) = &driver.destination {
            let at_restaurant = input
                .id_to_location
                .get(&destination.location_id)
                .is_some_and(|location| location.is_restaurant());
            if at_restaurant {
                for id in &destination.pickup_orders {
                    let order = input
                        .order(id)
                        .ok_or_else(|| anyhow!("pre-matched order {id} of driver {driver_id} is unknown"))?;
                    route.push(delivery_node(order, input));
                    pre_matched.insert(id.clone());
                }
            }
        }

        routes.insert(driver_id.clone(), route);
    }

    Ok((routes, pre_matched))
}

/// Running-load feasibility of a candidate route: starting from the carried
/// weight, no prefix may exceed capacity or fall below zero. Deliveries are
/// unloaded before pickups are loaded at a combined stop.
pub(crate) fn route_load_feasible(
    route: &[Node],
    carried_demand: i32,
    capacity: i32,
    input: &InputInform,
) -> bool {
    let demand_of = |id: &OrderId| input.order(id).map(|order| order.demand).unwrap_or(0);
    let mut load = carried_demand;
    if load > capacity || load < 0 {
        return false;
    }
    for node in route {
        load -= node.delivery_orders.iter().map(&demand_of).sum::<i32>();
        if load < 0 {
            return false;
        }
        load += node.pickup_orders.iter().map(&demand_of).sum::<i32>();
        if load > capacity {
            return false;
        }
    }
    true
}

/// Phase 4: merge adjacent duplicate stops, then split the working route
/// into the committed destination and the remaining planned route. A
/// committed destination keeps its arrival time unchanged.
pub(crate) fn finalise(driver: &Driver, mut route: Vec<Node>) -> (Option<Node>, Vec<Node>) {
    combine_adjacent_nodes(&mut route);
    if route.is_empty() {
        return (None, vec![]);
    }
    let mut head = route.remove(0);
    if let Some(committed) = &driver.destination {
        // the committed destination is irrevocable until arrival
        debug_assert_eq!(head.location_id, committed.location_id);
        head.arrive_time = committed.arrive_time;
    }
    (Some(head), route)
}
