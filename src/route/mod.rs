//! Route planner.
//!
//! A route is a permutation of `[0, n)` giving the order in which a user
//! traverses the filtered records.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Traversal order assigned to a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RouteStrategy {
    #[default]
    Forward,
    Backward,
    MiddleOut,
    Random,
}

impl RouteStrategy {
    pub const ALL: [Self; 4] = [Self::Forward, Self::Backward, Self::MiddleOut, Self::Random];

    /// Stored name of the strategy
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::MiddleOut => "middle_out",
            Self::Random => "random",
        }
    }

    /// Parse a stored name. Unknown names fall back to `Forward`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let wanted = name.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == wanted)
            .unwrap_or_else(|| {
                log::warn!("Unknown route strategy '{name}', using forward order");
                Self::Forward
            })
    }
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RouteStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RouteStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// Seed of a user's random route: the sum of the username's character codes
#[must_use]
pub fn user_seed(username: &str) -> u64 {
    username.chars().map(u64::from).sum()
}

/// Traversal order over `n` records for `username`
#[must_use]
pub fn plan_route(n: usize, strategy: RouteStrategy, username: &str) -> Vec<usize> {
    match strategy {
        RouteStrategy::Forward => (0..n).collect(),
        RouteStrategy::Backward => (0..n).rev().collect(),
        RouteStrategy::MiddleOut => middle_out(n),
        RouteStrategy::Random => {
            let mut rng = StdRng::seed_from_u64(user_seed(username));
            let mut route: Vec<usize> = (0..n).collect();
            route.shuffle(&mut rng);
            route
        }
    }
}

/// Starts at the middle and oscillates outward: even steps toward the end,
/// odd steps toward the start.
fn middle_out(n: usize) -> Vec<usize> {
    let middle = n / 2;
    (0..n)
        .filter_map(|i| {
            if i % 2 == 0 {
                Some(middle + i / 2)
            } else {
                middle.checked_sub(i.div_ceil(2))
            }
        })
        .filter(|&index| index < n)
        .collect()
}
