//! Deterministic fingerprint of everything that changes what a frame looks like.
//!
//! The signature is the single source of truth for "has anything visually
//! relevant changed": it keys the frame cache and drives preload restarts.
//!
//! Layout (fields with no value are omitted):
//! ```text
//! brand=..&model=..&variant=..&p=<part>:<material>:<color>...&initials=..
//!     &engraving=..&country=..&currency=..&width=..&height=..[&frame=<view>-<pos>]
//! ```
//! Parts are emitted in lexicographic order of their names and only when
//! both material and color are set. Values are escaped so that no field can
//! forge a separator.

use std::fmt;

use super::frame_key::FrameAddress;
use super::product::{ProductState, RenderOptions};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Per-frame signature: product signature plus the frame address
    pub fn for_frame(&self, address: &FrameAddress) -> Signature {
        let mut out = self.0.clone();
        push_field(&mut out, "frame", &address.key());
        Signature(out)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Product-level signature (no frame address).
pub fn compute_signature(state: &ProductState, render: &RenderOptions) -> Signature {
    let mut out = String::with_capacity(128);
    push_identity(&mut out, state);

    // BTreeMap iteration is sorted by part name
    for (part, selection) in &state.parts {
        if !selection.is_complete() {
            continue;
        }
        let (Some(material), Some(color)) = (&selection.material, &selection.color) else {
            continue;
        };
        let value = format!("{}:{}:{}", escape(part), escape(material), escape(color));
        push_raw(&mut out, "p", &value);
    }

    if !state.initials.is_empty() {
        push_field(&mut out, "initials", &state.initials);
    }
    if let Some(engraving) = state.engraving.as_deref().filter(|e| !e.is_empty()) {
        push_field(&mut out, "engraving", engraving);
    }
    if let Some(country) = state.country.as_deref().filter(|c| !c.is_empty()) {
        push_field(&mut out, "country", country);
    }
    if let Some(currency) = state.currency.as_deref().filter(|c| !c.is_empty()) {
        push_field(&mut out, "currency", currency);
    }
    push_size(&mut out, render);
    Signature(out)
}

/// Signature for mask rasters.
///
/// Masks only depend on the product identity and geometry, never on part
/// colors or personalization, so recoloring does not refetch them.
pub fn compute_mask_signature(state: &ProductState, render: &RenderOptions) -> Signature {
    let mut out = String::with_capacity(64);
    push_identity(&mut out, state);
    push_size(&mut out, render);
    Signature(out)
}

fn push_identity(out: &mut String, state: &ProductState) {
    push_field(out, "brand", &state.brand);
    push_field(out, "model", &state.model);
    if let Some(variant) = state.variant.as_deref().filter(|v| !v.is_empty()) {
        push_field(out, "variant", variant);
    }
}

fn push_size(out: &mut String, render: &RenderOptions) {
    push_raw(out, "width", &render.width.to_string());
    push_raw(out, "height", &render.height.to_string());
}

fn push_field(out: &mut String, name: &str, value: &str) {
    push_raw(out, name, &escape(value));
}

fn push_raw(out: &mut String, name: &str, value: &str) {
    if !out.is_empty() {
        out.push('&');
    }
    out.push_str(name);
    out.push('=');
    out.push_str(value);
}

/// Percent-escape the separator characters
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}
