use ordered_float::OrderedFloat;

use crate::{
    model::{driver::DriverId, MapType},
    simulation::snapshot::InputInform,
    utils::haversine_km,
};

use super::{
    anchor_coords, base_routes, carried_demand, delivery_node, finalise, pickup_node,
    route_load_feasible, DispatchResult, Dispatcher,
};

/// The earlier greedy policy, kept behind a flag: carried orders are routed
/// by open TSP like the reference policy, but each unallocated order simply
/// goes to the nearest driver that can still take it, pickup and delivery
/// appended at the end of the route.
#[derive(Debug, Clone, Default)]
pub struct NearestDispatcher;

impl Dispatcher for NearestDispatcher {
    fn dispatch(&mut self, input: &InputInform) -> anyhow::Result<DispatchResult> {
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
            let pickup_location = &input.id_to_location[&order.pickup_location_id];
            let mut by_distance: Vec<DriverId> = routes.keys().cloned().collect();
            by_distance.sort_by_key(|id| {
                let driver = &input.id_to_driver[id];
                let distance = anchor_coords(driver, input)
                    .map(|anchor| haversine_km(anchor, pickup_location.coords()))
                    .unwrap_or(f64::MAX);
                (OrderedFloat(distance), id.clone())
            });

            let chosen = by_distance
                .iter()
                .find(|id| {
                    let driver = &input.id_to_driver[*id];
                    let mut route = routes[*id].clone();
                    route.push(pickup_node(order, input));
                    route.push(delivery_node(order, input));
                    route_load_feasible(
                        &route,
                        carried_demand(driver, input),
                        driver.capacity,
                        input,
                    )
                })
                .unwrap_or(&by_distance[0])
                .clone();

            let route = routes.get_mut(&chosen).expect("driver has a route");
            route.push(pickup_node(order, input));
            route.push(delivery_node(order, input));
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
