use std::{sync::Arc, time::Instant};

use anyhow::{bail, Context as _};
use chrono::{NaiveDateTime, TimeDelta};
use tracing::{error, info};

use crate::{
    dispatch::{DispatchResult, Dispatcher},
    model::{
        driver::DriverMap, location::LocationMap, order::{OrderMap, OrderState},
        route_map::TravelMap, MapType,
    },
};

use super::{checker, history::History, replay, scorer, scorer::Score, snapshot, snapshot::InputInform};

/// The tick-synchronous control loop: replay, snapshot, dispatch, check,
/// commit, advance. Owns the single authoritative order, driver and
/// location tables.
pub struct SimulateEnvironment {
    initial_time: NaiveDateTime,
    time_interval: TimeDelta,
    cur_time: NaiveDateTime,
    pre_time: NaiveDateTime,

    orders: OrderMap,
    drivers: DriverMap,
    locations: LocationMap,
    travel_map: Arc<TravelMap>,

    dispatcher: Box<dyn Dispatcher>,
    max_dispatch_runtime: TimeDelta,
    lambda: f64,

    history: History,
    // dispatch result per tick time, kept for diagnostics
    dispatch_log: MapType<NaiveDateTime, DispatchResult>,
}

impl SimulateEnvironment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initial_time: NaiveDateTime,
        time_interval: TimeDelta,
        orders: OrderMap,
        drivers: DriverMap,
        locations: LocationMap,
        travel_map: Arc<TravelMap>,
        dispatcher: Box<dyn Dispatcher>,
        max_dispatch_runtime: TimeDelta,
        lambda: f64,
    ) -> anyhow::Result<Self> {
        if time_interval <= TimeDelta::zero() {
            bail!("the tick interval must be positive");
        }
        let mut history = History::new();
        history.bootstrap(&drivers, &orders, initial_time);
        Ok(Self {
            initial_time,
            time_interval,
            cur_time: initial_time,
            pre_time: initial_time,
            orders,
            drivers,
            locations,
            travel_map,
            dispatcher,
            max_dispatch_runtime,
            lambda,
            history,
            dispatch_log: MapType::new(),
        })
    }

    pub fn run(&mut self) -> anyhow::Result<Score> {
        let mut used = TimeDelta::zero();
        loop {
            // the previous dispatch's wall time costs whole ticks of
            // virtual time
            let intervals =
                (used.num_seconds() / self.time_interval.num_seconds() + 1) as i32;
            self.cur_time = self.pre_time + self.time_interval * intervals;
            info!("cur time: {}, pre time: {}", self.cur_time, self.pre_time);

            let input = self.update_input();
            info!(
                "{} unallocated orders, {} ongoing orders",
                input.id_to_unallocated_order.len(),
                input.id_to_ongoing_order.len()
            );

            let started = Instant::now();
            let result = self
                .dispatcher
                .dispatch(&input)
                .context("dispatch policy failed")?;
            let elapsed = started.elapsed();
            info!(
                "dispatch finished in {}",
                humantime::format_duration(elapsed)
            );
            used = TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX);
            if used > self.max_dispatch_runtime {
                bail!(
                    "dispatch took {} which exceeds the runtime bound of {}s",
                    humantime::format_duration(elapsed),
                    self.max_dispatch_runtime.num_seconds()
                );
            }

            checker::check_dispatch_result(&result, &self.drivers, &self.orders)
                .context("dispatch result is infeasible")?;

            self.commit(&result);
            self.ensure_no_overdue_ignored(&input, &result)?;

            if self.all_orders_dispatched() {
                break;
            }
            self.pre_time = self.cur_time;
        }

        self.drain();
        let score = scorer::calculate_total_score(
            &self.history,
            &self.travel_map,
            self.drivers.len(),
            self.lambda,
        );
        Ok(score)
    }

    /// Steps 2–6 of the tick: replay every driver over
    /// `[pre_time, cur_time]`, extend the history, write the observations
    /// back atomically, promote due orders, and build the snapshot.
    fn update_input(&mut self) -> InputInform {
        replay::advance_routes(&mut self.drivers, &self.orders, &self.travel_map, self.pre_time);
        self.history.record_drivers(&self.drivers, self.cur_time);
        self.history
            .record_orders(&self.drivers, &self.orders, self.cur_time);

        let observations: Vec<_> = self
            .drivers
            .iter()
            .map(|(id, driver)| (id.clone(), replay::observe(driver, self.cur_time)))
            .collect();
        for (_, observation) in &observations {
            for id in &observation.picked_up {
                if let Some(order) = self.orders.get_mut(id) {
                    order.promote(OrderState::Ongoing);
                }
            }
            for id in &observation.delivered {
                if let Some(order) = self.orders.get_mut(id) {
                    order.promote(OrderState::Completed);
                }
            }
        }
        for (id, observation) in observations {
            let driver = &mut self.drivers[&id];
            driver.position = observation.position;
            driver.gps_update_time = observation.update_time;
            driver.destination = observation.destination;
            driver.carrying_orders = observation.carrying_orders;
            // the dispatcher rebuilds the tail of the route every tick
            driver.planned_route.clear();
        }

        snapshot::promote_generated(&mut self.orders, self.cur_time);
        snapshot::build(
            &self.orders,
            &self.drivers,
            &self.locations,
            self.travel_map.clone(),
        )
    }

    /// Step 8: apply the checked dispatch to the driver table.
    fn commit(&mut self, result: &DispatchResult) {
        for (id, driver) in self.drivers.iter_mut() {
            driver.destination = result
                .driver_id_to_destination
                .get(id)
                .cloned()
                .unwrap_or_default();
            driver.planned_route = result
                .driver_id_to_planned_route
                .get(id)
                .cloned()
                .unwrap_or_default();
        }
        self.dispatch_log.insert(self.cur_time, result.clone());
    }

    /// Step 9: an overdue order the policy silently left out of every route
    /// is a fatal policy failure.
    fn ensure_no_overdue_ignored(
        &self,
        input: &InputInform,
        result: &DispatchResult,
    ) -> anyhow::Result<()> {
        let assigned = result.assigned_order_ids(&self.drivers);
        for (order_id, order) in input.id_to_unallocated_order.iter() {
            if !assigned.contains(order_id) && order.committed_completion_time < self.cur_time {
                error!(
                    "order {order_id} timed out at {} but is still ignored in the dispatch result",
                    order.committed_completion_time
                );
                bail!("overdue order {order_id} was ignored by the dispatch policy");
            }
        }
        Ok(())
    }

    fn all_orders_dispatched(&self) -> bool {
        self.orders
            .values()
            .all(|order| order.delivery_state >= OrderState::Ongoing)
    }

    /// Every order is at least picked up; advance every driver through the
    /// rest of its route and push the tail events into the history.
    fn drain(&mut self) {
        replay::advance_routes(&mut self.drivers, &self.orders, &self.travel_map, self.cur_time);
        self.history.record_drivers(&self.drivers, NaiveDateTime::MAX);
        self.history
            .record_orders(&self.drivers, &self.orders, NaiveDateTime::MAX);
        info!("finished the remaining ongoing orders of all drivers");
    }

    pub fn initial_time(&self) -> NaiveDateTime {
        self.initial_time
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn dispatch_log(&self) -> &MapType<NaiveDateTime, DispatchResult> {
        &self.dispatch_log
    }
}
