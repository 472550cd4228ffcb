use ordered_float::OrderedFloat;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    model::{driver::DriverId, node::Node, order::Order, MapType},
    simulation::snapshot::InputInform,
    utils::haversine_km,
};

use super::{
    anchor_coords, base_routes, carried_demand, delivery_node, finalise, pickup_node,
    route_load_feasible, DispatchResult, Dispatcher,
};

/// Admission control: drivers whose working route is already longer than
/// this are not considered for new orders.
const SOFT_ROUTE_CAP: usize = 8;
/// The nearest-anchor candidate is only taken while its route stays under
/// this tighter bound.
const TIGHT_ROUTE_CAP: usize = 6;

/// The reference insertion policy: carried orders are routed by open TSP,
/// pre-matched pickups are honoured, and each unallocated order is inserted
/// into the route of either the nearest-anchor driver or the shortest-route
/// driver, chosen by a fair coin from a PRNG seeded once per dispatch.
#[derive(Debug, Clone)]
pub struct InsertionDispatcher {
    seed: u64,
}

impl InsertionDispatcher {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Dispatcher for InsertionDispatcher {
    fn dispatch(&mut self, input: &InputInform) -> anyhow::Result<DispatchResult> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let (mut routes, pre_matched) = base_routes(input)?;
        if routes.is_empty() {
            return Ok(DispatchResult {
                driver_id_to_destination: MapType::new(),
                driver_id_to_planned_route: MapType::new(),
            });
        }

        for (order_id, order) in input.id_to_unallocated_order.iter() {
            if pre_matched.contains(order_id) {
                continue;
            }

            let mut eligible: Vec<DriverId> = routes
                .iter()
                .filter(|(_, route)| route.len() <= SOFT_ROUTE_CAP)
                .map(|(id, _)| id.clone())
                .collect();
            if eligible.is_empty() {
                // every route is saturated; admission control yields
                eligible = routes.keys().cloned().collect();
            }

            let pickup_location = &input.id_to_location[&order.pickup_location_id];
            let nearest = eligible
                .iter()
                .min_by_key(|id| {
                    let driver = &input.id_to_driver[*id];
                    let distance = anchor_coords(driver, input)
                        .map(|anchor| haversine_km(anchor, pickup_location.coords()))
                        .unwrap_or(f64::MAX);
                    (OrderedFloat(distance), (*id).clone())
                })
                .cloned()
                .expect("at least one eligible driver");
            let shortest = eligible
                .iter()
                .min_by_key(|id| (routes[*id].len(), (*id).clone()))
                .cloned()
                .expect("at least one eligible driver");

            let primary = if rng.random_bool(0.5) {
                if routes[&nearest].len() <= TIGHT_ROUTE_CAP {
                    nearest.clone()
                } else {
                    shortest.clone()
                }
            } else {
                shortest.clone()
            };

            // insertion may break the capacity prefix; fall back through the
            // candidates until the order fits somewhere
            let mut candidates = vec![primary.clone()];
            for id in [&nearest, &shortest]
                .into_iter()
                .chain(eligible.iter())
            {
                if !candidates.contains(id) {
                    candidates.push(id.clone());
                }
            }

            let mut assigned = None;
            for candidate in &candidates {
                let route = routes.get_mut(candidate).expect("candidate has a route");
                if try_insert(route, order, candidate, input) {
                    assigned = Some(candidate.clone());
                    break;
                }
            }
            match assigned {
                Some(driver_id) => debug!("order {order_id} is assigned to driver {driver_id}"),
                None => {
                    // nothing fits; force the primary candidate and let the
                    // checker rule on the result
                    let route = routes.get_mut(&primary).expect("candidate has a route");
                    insert_cheapest(route, order, input);
                    debug!("order {order_id} is forced onto driver {primary}");
                }
            }
        }

        let mut driver_id_to_destination = MapType::new();
        let mut driver_id_to_planned_route = MapType::new();
        for (driver_id, route) in routes {
            let driver = &input.id_to_driver[&driver_id];
            let (destination, planned_route) = finalise(driver, route);
            driver_id_to_destination.insert(driver_id.clone(), destination);
            driver_id_to_planned_route.insert(driver_id, planned_route);
        }
        Ok(DispatchResult {
            driver_id_to_destination,
            driver_id_to_planned_route,
        })
    }
}

/// Added path length of placing `node` at `index`, measured over the great
/// circle. Appending costs the leg from the last stop; splicing costs the
/// detour through the new stop.
fn insertion_cost(route: &[Node], index: usize, node: &Node) -> f64 {
    if index == route.len() {
        haversine_km(node.coords(), route[index - 1].coords())
    } else {
        haversine_km(node.coords(), route[index - 1].coords())
            + haversine_km(node.coords(), route[index].coords())
            - haversine_km(route[index - 1].coords(), route[index].coords())
    }
}

fn best_insertion_index(route: &[Node], node: &Node, from: usize) -> usize {
    (from..=route.len())
        .min_by_key(|index| (OrderedFloat(insertion_cost(route, *index, node)), *index))
        .expect("insertion range is never empty")
}

/// Place the order's pickup and delivery at their cheapest positions with
/// no regard for capacity. The pickup can never land at index 0 (that would
/// change the committed destination) and the delivery always lands strictly
/// after the pickup.
fn insert_cheapest(route: &mut Vec<Node>, order: &Order, input: &InputInform) {
    if route.is_empty() {
        route.push(pickup_node(order, input));
        route.push(delivery_node(order, input));
        return;
    }
    let pickup = pickup_node(order, input);
    let pickup_index = best_insertion_index(route, &pickup, 1);
    route.insert(pickup_index, pickup);
    let delivery = delivery_node(order, input);
    let delivery_index = best_insertion_index(route, &delivery, pickup_index + 1);
    route.insert(delivery_index, delivery);
}

/// Tentative insertion under the same position constraints as
/// `insert_cheapest`, walking the candidate pairs in added-distance order
/// until one keeps the capacity prefix legal. Returns false and leaves the
/// route untouched when no pair does.
fn try_insert(
    route: &mut Vec<Node>,
    order: &Order,
    driver_id: &DriverId,
    input: &InputInform,
) -> bool {
    let driver = &input.id_to_driver[driver_id];
    let carried = carried_demand(driver, input);

    if route.is_empty() {
        route.push(pickup_node(order, input));
        route.push(delivery_node(order, input));
        if route_load_feasible(route, carried, driver.capacity, input) {
            return true;
        }
        route.clear();
        return false;
    }

    let pickup = pickup_node(order, input);
    let mut pickup_positions: Vec<usize> = (1..=route.len()).collect();
    pickup_positions
        .sort_by_key(|index| (OrderedFloat(insertion_cost(route, *index, &pickup)), *index));
    for pickup_index in pickup_positions {
        route.insert(pickup_index, pickup.clone());
        let delivery = delivery_node(order, input);
        let mut delivery_positions: Vec<usize> = (pickup_index + 1..=route.len()).collect();
        delivery_positions
            .sort_by_key(|index| (OrderedFloat(insertion_cost(route, *index, &delivery)), *index));
        for delivery_index in delivery_positions {
            route.insert(delivery_index, delivery.clone());
            if route_load_feasible(route, carried, driver.capacity, input) {
                return true;
            }
            route.remove(delivery_index);
        }
        route.remove(pickup_index);
    }
    false
}
