use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::model::{
    driver::DriverMap,
    location::LocationMap,
    order::{Order, OrderId, OrderMap, OrderState},
    route_map::TravelMap,
};

/// The read-only world snapshot handed to the dispatch policy each tick.
/// The dispatcher never mutates the originals; everything here is a copy or
/// shared immutable data.
#[derive(Debug, Clone)]
pub struct InputInform {
    pub id_to_unallocated_order: OrderMap,
    pub id_to_ongoing_order: OrderMap,
    pub id_to_driver: DriverMap,
    pub id_to_location: LocationMap,
    pub travel_map: Arc<TravelMap>,
}

impl InputInform {
    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.id_to_unallocated_order
            .get(id)
            .or_else(|| self.id_to_ongoing_order.get(id))
    }
}

/// Mark every order whose creation time has passed as GENERATED.
pub fn promote_generated(orders: &mut OrderMap, cur_time: NaiveDateTime) {
    for order in orders.values_mut() {
        if order.delivery_state == OrderState::Initialization && order.creation_time <= cur_time {
            order.promote(OrderState::Generated);
        }
    }
}

pub fn build(
    orders: &OrderMap,
    drivers: &DriverMap,
    locations: &LocationMap,
    travel_map: Arc<TravelMap>,
) -> InputInform {
    let id_to_unallocated_order: OrderMap = orders
        .iter()
        .filter(|(_, order)| order.delivery_state == OrderState::Generated)
        .map(|(id, order)| (id.clone(), order.clone()))
        .collect();
    let id_to_ongoing_order: OrderMap = orders
        .iter()
        .filter(|(_, order)| order.delivery_state == OrderState::Ongoing)
        .map(|(id, order)| (id.clone(), order.clone()))
        .collect();
    InputInform {
        id_to_unallocated_order,
        id_to_ongoing_order,
        id_to_driver: drivers.clone(),
        id_to_location: locations.clone(),
        travel_map,
    }
}
