use std::{collections::BTreeMap, path::Path};

use chrono::{NaiveTime, TimeDelta};
use serde::{de::DeserializeOwned, Deserialize};

pub mod driver;
pub mod location;
pub mod node;
pub mod order;
pub mod route_map;

fn read_csv<T>(path: impl AsRef<Path>) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut reader = csv::Reader::from_path(path)?;
    let records: csv::Result<Vec<T>> = reader.deserialize().collect();
    Ok(records?)
}

pub(crate) fn parse_naive_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").map_err(serde::de::Error::custom)
}

pub(crate) fn parse_seconds<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = i64::deserialize(deserializer)?;
    Ok(TimeDelta::seconds(s))
}

pub type MapType<K, V> = BTreeMap<K, V>;

/// An owning table keyed by one of the crate's id newtypes. Indexing with
/// `&id` panics on a missing entry and names the entity kind; ids reaching
/// an index were validated when the instance was loaded, so a miss is a
/// simulator bug, not bad input. Fallible lookups go through `get`.
#[macro_export]
macro_rules! define_map {
    ($key:ty, $value:ty, $base:ident, $entity:literal) => {
        #[derive(Debug, Default, Clone)]
        pub struct $base($crate::model::MapType<$key, $value>);

        impl $base {
            pub fn get(&self, id: &$key) -> Option<&$value> {
                self.0.get(id)
            }

            pub fn get_mut(&mut self, id: &$key) -> Option<&mut $value> {
                self.0.get_mut(id)
            }

            pub fn insert(&mut self, id: $key, value: $value) -> Option<$value> {
                self.0.insert(id, value)
            }

            pub fn contains_key(&self, id: &$key) -> bool {
                self.0.contains_key(id)
            }

            pub fn iter(&self) -> std::collections::btree_map::Iter<'_, $key, $value> {
                self.0.iter()
            }

            pub fn iter_mut(&mut self) -> std::collections::btree_map::IterMut<'_, $key, $value> {
                self.0.iter_mut()
            }

            pub fn keys(&self) -> std::collections::btree_map::Keys<'_, $key, $value> {
                self.0.keys()
            }

            pub fn values(&self) -> std::collections::btree_map::Values<'_, $key, $value> {
                self.0.values()
            }

            pub fn values_mut(
                &mut self,
            ) -> std::collections::btree_map::ValuesMut<'_, $key, $value> {
                self.0.values_mut()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::ops::Index<&$key> for $base {
            type Output = $value;

            fn index(&self, id: &$key) -> &$value {
                match self.0.get(id) {
                    Some(value) => value,
                    None => panic!(concat!("no ", $entity, " with id {}"), id),
                }
            }
        }

        impl std::ops::IndexMut<&$key> for $base {
            fn index_mut(&mut self, id: &$key) -> &mut $value {
                match self.0.get_mut(id) {
                    Some(value) => value,
                    None => panic!(concat!("no ", $entity, " with id {}"), id),
                }
            }
        }

        impl FromIterator<($key, $value)> for $base {
            fn from_iter<I: IntoIterator<Item = ($key, $value)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}
