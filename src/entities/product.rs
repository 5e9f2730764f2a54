//! Product state as seen by the viewer: identity, part selections,
//! personalization and the render size frames are requested at.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Material/color choice for one part. Either half may still be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSelection {
    pub material: Option<String>,
    pub color: Option<String>,
}

impl PartSelection {
    pub fn new(material: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            material: Some(material.into()),
            color: Some(color.into()),
        }
    }

    /// Both material and color set
    pub fn is_complete(&self) -> bool {
        matches!((&self.material, &self.color), (Some(m), Some(c)) if !m.is_empty() && !c.is_empty())
    }
}

/// Customizable product state.
///
/// Parts live in a `BTreeMap`, so iteration is lexicographic by part name
/// no matter in which order selections were assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductState {
    pub brand: String,
    pub model: String,
    pub variant: Option<String>,
    pub parts: BTreeMap<String, PartSelection>,
    pub initials: String,
    pub engraving: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
}

impl ProductState {
    pub fn new(brand: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set (or replace) the material/color of a part
    pub fn set_part(&mut self, part: impl Into<String>, material: impl Into<String>, color: impl Into<String>) {
        self.parts.insert(part.into(), PartSelection::new(material, color));
    }

    pub fn set_initials(&mut self, initials: impl Into<String>, engraving: Option<String>) {
        self.initials = initials.into();
        self.engraving = engraving;
    }
}

/// Render parameters forwarded to the Image Service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub background: Option<String>,
}

impl RenderOptions {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            ..Default::default()
        }
    }
}

/// Part metadata from the Config Service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductMeta {
    /// Names of the parts present in the product defaults
    pub default_parts: Vec<String>,
    /// Parts never reported by hit testing (shadows, internals, ...)
    pub hidden_parts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_selection() {
        assert!(PartSelection::new("nappa", "white").is_complete());
        let partial = PartSelection {
            material: Some("nappa".into()),
            color: None,
        };
        assert!(!partial.is_complete());
        let empty_color = PartSelection {
            material: Some("nappa".into()),
            color: Some(String::new()),
        };
        assert!(!empty_color.is_complete());
    }

    #[test]
    fn test_parts_iterate_sorted() {
        let mut state = ProductState::new("swear", "vyner");
        state.set_part("sole", "rubber", "red");
        state.set_part("laces", "nylon", "black");
        state.set_part("front", "nappa", "white");
        let names: Vec<&str> = state.parts.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["front", "laces", "sole"]);
    }
}
