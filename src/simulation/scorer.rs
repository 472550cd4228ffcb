use chrono::TimeDelta;
use tracing::{error, info};

use crate::model::{order::OrderState, route_map::TravelMap, MapType};

use super::history::History;

/// The composite objective, lower is better. A run in which any order never
/// completes scores the sentinel infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub total_distance_km: f64,
    pub total_lateness: TimeDelta,
    pub value: f64,
}

pub fn calculate_total_score(
    history: &History,
    travel_map: &TravelMap,
    driver_count: usize,
    lambda: f64,
) -> Score {
    let total_distance_km = calculate_total_distance(history, travel_map);
    info!("total distance: {total_distance_km:.3}");

    let Some(total_lateness) = calculate_total_lateness(history) else {
        error!("at least one order has no completion entry, scoring the run as infeasible");
        return Score {
            total_distance_km,
            total_lateness: TimeDelta::zero(),
            value: f64::INFINITY,
        };
    };
    info!("total lateness: {}s", total_lateness.num_seconds());

    let value = total_distance_km / driver_count as f64
        + lambda * total_lateness.num_seconds() as f64 / 3600.0;
    info!("total score: {value:.3}");
    Score {
        total_distance_km,
        total_lateness,
        value,
    }
}

fn calculate_total_distance(history: &History, travel_map: &TravelMap) -> f64 {
    let mut total = 0.0;
    for (driver_id, events) in history.driver_positions() {
        let mut distance = 0.0;
        for pair in events.windows(2) {
            distance += travel_map.distance(&pair[0].location_id, &pair[1].location_id);
        }
        info!(
            "traveling distance of driver {driver_id} is {distance:.3} over {} visited stops",
            events.len()
        );
        total += distance;
    }
    total
}

// Lateness of an order counts from its first COMPLETED entry; None when
// some order never completed.
fn calculate_total_lateness(history: &History) -> Option<TimeDelta> {
    let mut completion_times = MapType::new();
    let mut deadlines = MapType::new();
    let mut missing = false;
    for (order_id, events) in history.order_statuses() {
        let mut completed: Vec<_> = events
            .iter()
            .filter(|event| event.state == OrderState::Completed)
            .collect();
        if completed.is_empty() {
            error!("order {order_id} has no history of completion");
            missing = true;
            continue;
        }
        completed.sort_by_key(|event| event.update_time);
        completion_times.insert(order_id.clone(), completed[0].update_time);
        deadlines.insert(order_id.clone(), completed[0].committed_completion_time);
    }
    if missing {
        return None;
    }

    let mut total = TimeDelta::zero();
    for (order_id, completion_time) in completion_times {
        let lateness = completion_time - deadlines[&order_id];
        if lateness > TimeDelta::zero() {
            total += lateness;
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::model::{
        order::{OrderId, OrderState},
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

    fn travel_map() -> TravelMap {
        TravelMap::from(vec![RouteRecord {
            route_code: "RT_1".to_string(),
            start_location_id: "R_1".into(),
            end_location_id: "C_1".into(),
            distance: 2.0,
            time: TimeDelta::seconds(60),
        }])
    }

    #[test]
    fn distance_and_lateness_compose_the_score() {
        let mut history = History::new();
        history.add_driver_position(&"D_1".into(), &"R_1".into(), t(0));
        history.add_driver_position(&"D_1".into(), &"C_1".into(), t(120));
        // completed 30 minutes past the deadline
        history.add_order_status(OrderId::from("O_1"), OrderState::Completed, t(5400), t(3600));

        let score = calculate_total_score(&history, &travel_map(), 2, 10.0);
        assert!((score.total_distance_km - 2.0).abs() < 1e-9);
        assert_eq!(score.total_lateness, TimeDelta::seconds(1800));
        assert!((score.value - (2.0 / 2.0 + 10.0 * 1800.0 / 3600.0)).abs() < 1e-9);
    }

    #[test]
    fn early_completion_is_not_rewarded() {
        let mut history = History::new();
        history.add_order_status(OrderId::from("O_1"), OrderState::Completed, t(100), t(3600));
        let score = calculate_total_score(&history, &travel_map(), 1, 10.0);
        assert_eq!(score.total_lateness, TimeDelta::zero());
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn the_first_completion_entry_wins() {
        let mut history = History::new();
        history.add_order_status(OrderId::from("O_1"), OrderState::Completed, t(4000), t(3600));
        history.add_order_status(OrderId::from("O_1"), OrderState::Completed, t(3000), t(3600));
        let score = calculate_total_score(&history, &travel_map(), 1, 10.0);
        assert_eq!(score.total_lateness, TimeDelta::zero());
    }

    #[test]
    fn missing_completion_scores_infinity() {
        let mut history = History::new();
        history.add_order_status(OrderId::from("O_1"), OrderState::Generated, t(0), t(3600));
        let score = calculate_total_score(&history, &travel_map(), 1, 10.0);
        assert!(score.value.is_infinite());
    }
}
