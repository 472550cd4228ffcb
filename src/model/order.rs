use std::path::Path;

use anyhow::bail;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{define_id, define_map};

use super::{location::LocationId, parse_naive_time, parse_seconds, read_csv};

define_id!(OrderId);

/// Delivery lifecycle of an order. The numeric codes exist only at the
/// CSV/JSON boundary; transitions are monotone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderState {
    Initialization,
    Generated,
    Ongoing,
    Completed,
}

impl OrderState {
    pub fn code(self) -> u8 {
        match self {
            OrderState::Initialization => 0,
            OrderState::Generated => 1,
            OrderState::Ongoing => 2,
            OrderState::Completed => 3,
        }
    }

    pub fn from_code(code: u8) -> anyhow::Result<OrderState> {
        Ok(match code {
            0 => OrderState::Initialization,
            1 => OrderState::Generated,
            2 => OrderState::Ongoing,
            3 => OrderState::Completed,
            _ => bail!("unknown order state code {code}"),
        })
    }
}

impl Serialize for OrderState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for OrderState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        OrderState::from_code(code).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub demand: i32,
    pub creation_time: NaiveDateTime,
    pub committed_completion_time: NaiveDateTime,
    pub load_time: TimeDelta,
    pub unload_time: TimeDelta,
    pub pickup_location_id: LocationId,
    pub delivery_location_id: LocationId,
    pub delivery_state: OrderState,
}

impl Order {
    /// State codes only ever increase; a stale transition is ignored.
    pub fn promote(&mut self, next: OrderState) {
        if next > self.delivery_state {
            self.delivery_state = next;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderRecord {
    order_id: OrderId,
    pickup_id: LocationId,
    delivery_id: LocationId,
    demand: i32,
    #[serde(deserialize_with = "parse_naive_time")]
    creation_time: NaiveTime,
    #[serde(deserialize_with = "parse_naive_time")]
    committed_completion_time: NaiveTime,
    #[serde(deserialize_with = "parse_seconds")]
    load_time: TimeDelta,
    #[serde(deserialize_with = "parse_seconds")]
    unload_time: TimeDelta,
}

impl OrderRecord {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Vec<OrderRecord>> {
        read_csv(path)
    }

    pub fn into_order(self, base_date: NaiveDate) -> Order {
        let creation_time = base_date.and_time(self.creation_time);
        let mut committed_completion_time = base_date.and_time(self.committed_completion_time);
        // a deadline clock earlier than the creation clock rolls over midnight
        if committed_completion_time < creation_time {
            committed_completion_time += TimeDelta::days(1);
        }
        Order {
            id: self.order_id,
            demand: self.demand,
            creation_time,
            committed_completion_time,
            load_time: self.load_time,
            unload_time: self.unload_time,
            pickup_location_id: self.pickup_id,
            delivery_location_id: self.delivery_id,
            delivery_state: OrderState::Initialization,
        }
    }
}

define_map!(OrderId, Order, OrderMap, "order");
