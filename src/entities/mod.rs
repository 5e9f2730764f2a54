//! Entities - plain data the viewer engine works on.
//!
//! - `frame_key`: frame addresses, frame tables, wraparound arithmetic
//! - `product`: product state, render options, part metadata
//! - `signature`: deterministic fingerprints used as cache keys

pub mod frame_key;
pub mod product;
pub mod signature;

pub use frame_key::{FrameAddress, FrameKeyError, FrameTable, frame_key, parse_frame_key, wrap};
pub use product::{PartSelection, ProductMeta, ProductState, RenderOptions};
pub use signature::{Signature, compute_mask_signature, compute_signature};
