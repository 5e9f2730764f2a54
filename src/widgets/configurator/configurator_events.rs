//! Configurator widget events.
//!
//! Part selection events are shared with the owning product model and carry
//! no widget id; everything the widget reports about itself does.

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::entities::PartSelection;

/// A part was selected (emitted on click, also consumed to highlight it)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedPartEvent(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeselectedPartEvent(pub String);

/// Product model replaced its part selections
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartsEvent(pub BTreeMap<String, PartSelection>);

/// Highlight mask of `part` finished loading
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HighlightedPartEvent {
    pub configurator: Uuid,
    pub part: String,
}

/// Frame about to be drawn, as a `"view-position"` key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedFrameEvent {
    pub configurator: Uuid,
    pub frame: String,
}

/// Preload generation settled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedEvent {
    pub configurator: Uuid,
}
