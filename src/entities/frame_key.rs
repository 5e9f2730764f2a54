//! Frame addressing - `(view, position)` pairs and their `"view-position"` keys.
//!
//! A frame is one pre-rendered server image. Views are rotation axes
//! ("side", "top", "bottom", ...) each holding `count` positions.
//!
//! Keys are split at the LAST dash, so view names may themselves contain
//! dashes and `parse_frame_key(&frame_key(view, pos))` always round-trips.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Single frame address: view name + position inside that view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameAddress {
    pub view: String,
    pub position: u32,
}

impl FrameAddress {
    pub fn new(view: impl Into<String>, position: u32) -> Self {
        Self {
            view: view.into(),
            position,
        }
    }

    /// Encoded `"view-position"` key
    pub fn key(&self) -> String {
        frame_key(&self.view, self.position)
    }
}

impl fmt::Display for FrameAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.view, self.position)
    }
}

impl FromStr for FrameAddress {
    type Err = FrameKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_frame_key(s)
    }
}

/// Malformed frame key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKeyError {
    MissingSeparator(String),
    EmptyView(String),
    BadPosition(String),
}

impl fmt::Display for FrameKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKeyError::MissingSeparator(k) => write!(f, "Frame key '{}' has no '-' separator", k),
            FrameKeyError::EmptyView(k) => write!(f, "Frame key '{}' has an empty view", k),
            FrameKeyError::BadPosition(k) => write!(f, "Frame key '{}' has an invalid position", k),
        }
    }
}

impl std::error::Error for FrameKeyError {}

/// Encode `(view, position)` into `"view-position"`.
pub fn frame_key(view: &str, position: u32) -> String {
    format!("{}-{}", view, position)
}

/// Decode a `"view-position"` key. Exact inverse of [`frame_key`].
pub fn parse_frame_key(key: &str) -> Result<FrameAddress, FrameKeyError> {
    let (view, position) = key
        .rsplit_once('-')
        .ok_or_else(|| FrameKeyError::MissingSeparator(key.to_string()))?;
    if view.is_empty() {
        return Err(FrameKeyError::EmptyView(key.to_string()));
    }
    // u32::from_str accepts a leading '+', which frame_key never produces
    if position.is_empty() || !position.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FrameKeyError::BadPosition(key.to_string()));
    }
    let position = position
        .parse::<u32>()
        .map_err(|_| FrameKeyError::BadPosition(key.to_string()))?;
    Ok(FrameAddress::new(view, position))
}

/// Normalize a signed frame offset into `[0, count)`.
///
/// Returns 0 for an empty view.
pub fn wrap(delta: i64, count: u32) -> u32 {
    if count == 0 {
        return 0;
    }
    delta.rem_euclid(i64::from(count)) as u32
}

/// Frame counts per view, in server order.
///
/// Owned by the Config Service and immutable for a product's lifetime.
/// Order matters: it drives preload enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameTable {
    views: IndexMap<String, u32>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, keeps insertion order
    pub fn with_view(mut self, view: impl Into<String>, count: u32) -> Self {
        self.views.insert(view.into(), count);
        self
    }

    /// Frame count of a view, `None` if the product doesn't define it
    pub fn count(&self, view: &str) -> Option<u32> {
        self.views.get(view).copied()
    }

    /// True if the view exists and has at least one frame
    pub fn has_view(&self, view: &str) -> bool {
        self.count(view).is_some_and(|c| c > 0)
    }

    pub fn contains(&self, address: &FrameAddress) -> bool {
        self.count(&address.view)
            .is_some_and(|count| address.position < count)
    }

    pub fn views(&self) -> impl Iterator<Item = (&str, u32)> {
        self.views.iter().map(|(v, c)| (v.as_str(), *c))
    }

    /// Every address of the table, views in table order, positions ascending
    pub fn addresses(&self) -> impl Iterator<Item = FrameAddress> + '_ {
        self.views
            .iter()
            .flat_map(|(view, count)| (0..*count).map(move |p| FrameAddress::new(view.clone(), p)))
    }

    /// Total number of frames over all views
    pub fn len(&self) -> usize {
        self.views.values().map(|c| *c as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First address of the first non-empty view
    pub fn first(&self) -> Option<FrameAddress> {
        self.views
            .iter()
            .find(|(_, c)| **c > 0)
            .map(|(v, _)| FrameAddress::new(v.clone(), 0))
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for FrameTable {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self {
            views: iter.into_iter().map(|(v, c)| (v.into(), c)).collect(),
        }
    }
}
