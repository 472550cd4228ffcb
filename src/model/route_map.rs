use std::path::Path;

use chrono::TimeDelta;
use serde::Deserialize;
use tracing::error;

use super::{location::LocationId, parse_seconds, read_csv, MapType};

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub route_code: String,
    pub start_location_id: LocationId,
    pub end_location_id: LocationId,
    pub distance: f64,
    #[serde(deserialize_with = "parse_seconds")]
    pub time: TimeDelta,
}

impl RouteRecord {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<RouteRecord>> {
        read_csv(path)
    }
}

#[derive(Debug, Clone)]
struct Leg {
    distance: f64,
    time: TimeDelta,
}

/// Immutable pairwise distance/time table. Lookup is exact first, then with
/// swapped endpoints; self-loops are zero; unknown pairs report a sentinel.
#[derive(Debug, Clone, Default)]
pub struct TravelMap {
    map: MapType<(LocationId, LocationId), Leg>,
}

impl From<Vec<RouteRecord>> for TravelMap {
    fn from(records: Vec<RouteRecord>) -> Self {
        let mut map = MapType::new();
        for r in records {
            map.insert(
                (r.start_location_id, r.end_location_id),
                Leg {
                    distance: r.distance,
                    time: r.time,
                },
            );
        }
        TravelMap { map }
    }
}

impl TravelMap {
    fn leg(&self, from: &LocationId, to: &LocationId) -> Option<&Leg> {
        self.map
            .get(&(from.clone(), to.clone()))
            .or_else(|| self.map.get(&(to.clone(), from.clone())))
    }

    pub fn try_distance(&self, from: &LocationId, to: &LocationId) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        self.leg(from, to).map(|leg| leg.distance)
    }

    pub fn try_time(&self, from: &LocationId, to: &LocationId) -> Option<TimeDelta> {
        if from == to {
            return Some(TimeDelta::zero());
        }
        self.leg(from, to).map(|leg| leg.time)
    }

    pub fn distance(&self, from: &LocationId, to: &LocationId) -> f64 {
        self.try_distance(from, to).unwrap_or_else(|| {
            error!("({from}, {to}) is not in the distance matrix");
            f64::MAX
        })
    }

    pub fn time(&self, from: &LocationId, to: &LocationId) -> TimeDelta {
        self.try_time(from, to).unwrap_or_else(|| {
            error!("({from}, {to}) is not in the time matrix");
            TimeDelta::MAX
        })
    }

    /// Travel time for a leg of an actual route; an unknown pair is logged
    /// and traversed instantly instead of aborting the replay.
    pub fn time_or_instant(&self, from: &LocationId, to: &LocationId) -> TimeDelta {
        self.try_time(from, to).unwrap_or_else(|| {
            error!("({from}, {to}) is not in the time matrix, traversing instantly");
            TimeDelta::zero()
        })
    }
}
