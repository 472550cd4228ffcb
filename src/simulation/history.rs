use chrono::NaiveDateTime;
use serde::Serialize;

use crate::model::{
    driver::{DriverId, DriverMap, LocationState},
    location::LocationId,
    node::Node,
    order::{OrderId, OrderMap, OrderState},
    MapType,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionEvent {
    pub location_id: LocationId,
    pub update_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusEvent {
    pub state: OrderState,
    pub update_time: NaiveDateTime,
    pub committed_completion_time: NaiveDateTime,
    pub order_id: OrderId,
}

/// Append-only record of driver position events and order state
/// transitions. Written once per tick during the commit step; the scorer is
/// its only reader.
#[derive(Debug, Default, Clone, Serialize)]
pub struct History {
    driver_positions: MapType<DriverId, Vec<PositionEvent>>,
    order_statuses: MapType<OrderId, Vec<OrderStatusEvent>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with every driver's starting position and every order's
    /// initial state.
    pub fn bootstrap(&mut self, drivers: &DriverMap, orders: &OrderMap, initial_time: NaiveDateTime) {
        for (id, driver) in drivers.iter() {
            let entry = self.driver_positions.entry(id.clone()).or_default();
            if let Some(location_id) = driver.position.location_id() {
                entry.push(PositionEvent {
                    location_id: location_id.clone(),
                    update_time: driver.gps_update_time,
                });
            }
        }
        for (id, order) in orders.iter() {
            self.add_order_status(
                id.clone(),
                order.delivery_state,
                initial_time,
                order.committed_completion_time,
            );
        }
    }

    pub fn add_driver_position(
        &mut self,
        driver_id: &DriverId,
        location_id: &LocationId,
        update_time: NaiveDateTime,
    ) {
        self.driver_positions
            .entry(driver_id.clone())
            .or_default()
            .push(PositionEvent {
                location_id: location_id.clone(),
                update_time,
            });
    }

    pub fn add_order_status(
        &mut self,
        order_id: OrderId,
        state: OrderState,
        update_time: NaiveDateTime,
        committed_completion_time: NaiveDateTime,
    ) {
        self.order_statuses
            .entry(order_id.clone())
            .or_default()
            .push(OrderStatusEvent {
                state,
                update_time,
                committed_completion_time,
                order_id,
            });
    }

    /// Record every stop a driver has left by `up_to`.
    pub fn record_drivers(&mut self, drivers: &DriverMap, up_to: NaiveDateTime) {
        for (id, driver) in drivers.iter() {
            if let LocationState::AtStop {
                location_id,
                leave_time,
                ..
            } = &driver.position
            {
                if *leave_time <= up_to {
                    self.add_driver_position(id, location_id, *leave_time);
                }
            }
            for node in driver.destination.iter().chain(driver.planned_route.iter()) {
                if let Some(leave) = node.leave_time {
                    if leave <= up_to {
                        self.add_driver_position(id, &node.location_id, leave);
                    }
                }
            }
        }
    }

    /// Record the order transitions implied by every stop reached by `up_to`:
    /// pickups go ONGOING, deliveries go COMPLETED, stamped with the stop's
    /// arrival time.
    pub fn record_orders(&mut self, drivers: &DriverMap, orders: &OrderMap, up_to: NaiveDateTime) {
        for (_, driver) in drivers.iter() {
            for node in driver.destination.iter().chain(driver.planned_route.iter()) {
                self.record_order_events_of_node(node, orders, up_to);
            }
        }
    }

    fn record_order_events_of_node(&mut self, node: &Node, orders: &OrderMap, up_to: NaiveDateTime) {
        let Some(arrive) = node.arrive_time else {
            return;
        };
        if arrive > up_to {
            return;
        }
        for id in &node.pickup_orders {
            let order = &orders[id];
            self.add_order_status(
                id.clone(),
                OrderState::Ongoing,
                arrive,
                order.committed_completion_time,
            );
        }
        for id in &node.delivery_orders {
            let order = &orders[id];
            self.add_order_status(
                id.clone(),
                OrderState::Completed,
                arrive,
                order.committed_completion_time,
            );
        }
    }

    pub fn driver_positions(&self) -> &MapType<DriverId, Vec<PositionEvent>> {
        &self.driver_positions
    }

    pub fn order_statuses(&self) -> &MapType<OrderId, Vec<OrderStatusEvent>> {
        &self.order_statuses
    }
}
