//! Frame/mask cache with signature-based staleness arbitration.
//!
//! One [`FrameSlot`] per frame address, created once when the frame table
//! is known and never removed. Each slot carries two tracks (frame image and
//! hit-test mask) with the same state machine:
//!
//! ```text
//! Empty ──request──▶ Loading ──ok──▶ Ready
//!                      │  ▲            │
//!                      │  └──request───┘   (desired != loaded)
//!                      └──err──▶ Errored ──request──▶ Loading
//! ```
//!
//! # Arbitration
//!
//! Every fetch is issued for a `Signature` and the track records it as its
//! pending target. A completion is applied only if the pending target still
//! equals the signature the fetch was issued for; anything else is stale
//! and dropped, whatever order completions arrive in. Superseded rasters
//! are never deleted, only ignored.
//!
//! Owned and mutated exclusively by the configurator on the UI thread.

use image::RgbaImage;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{FrameAddress, FrameTable, Signature};
use crate::services::FetchError;

/// Which raster of a slot a request is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Frame,
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Loading,
    Ready,
    Errored,
}

/// Load state of one raster of a slot
#[derive(Debug, Clone, Default)]
pub struct Track {
    state: SlotState,
    /// Signature the current raster was loaded for
    loaded: Option<Signature>,
    /// Signature of the fetch in flight
    pending: Option<Signature>,
    raster: Option<Arc<RgbaImage>>,
}

impl Track {
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn loaded_signature(&self) -> Option<&Signature> {
        self.loaded.as_ref()
    }

    pub fn pending_signature(&self) -> Option<&Signature> {
        self.pending.as_ref()
    }

    /// Ready and loaded for `desired`. A Ready track loaded for any other
    /// signature is a miss.
    pub fn is_fresh(&self, desired: &Signature) -> bool {
        self.state == SlotState::Ready && self.loaded.as_ref() == Some(desired)
    }

    /// Raster usable for `desired`, if any
    pub fn raster_for(&self, desired: &Signature) -> Option<Arc<RgbaImage>> {
        if self.is_fresh(desired) {
            self.raster.clone()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameSlot {
    address: FrameAddress,
    frame: Track,
    mask: Track,
}

impl FrameSlot {
    fn new(address: FrameAddress) -> Self {
        Self {
            address,
            frame: Track::default(),
            mask: Track::default(),
        }
    }

    pub fn address(&self) -> &FrameAddress {
        &self.address
    }

    /// State of the frame image
    pub fn state(&self) -> SlotState {
        self.frame.state
    }

    pub fn track(&self, layer: Layer) -> &Track {
        match layer {
            Layer::Frame => &self.frame,
            Layer::Mask => &self.mask,
        }
    }

    fn track_mut(&mut self, layer: Layer) -> &mut Track {
        match layer {
            Layer::Frame => &mut self.frame,
            Layer::Mask => &mut self.mask,
        }
    }
}

/// A fetch the caller must dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: u64,
    pub address: FrameAddress,
    pub layer: Layer,
    pub url: String,
    /// Desired signature at issue time (staleness token)
    pub signature: Signature,
}

/// Outcome of a fetch, posted back to the UI thread
#[derive(Debug)]
pub struct Completion {
    pub request: FetchRequest,
    pub result: Result<RgbaImage, FetchError>,
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    /// Fresh raster, no I/O needed
    Hit(Arc<RgbaImage>),
    /// A fetch for the same signature is already in flight
    Pending,
    /// Caller must dispatch this request
    Issue(FetchRequest),
}

/// Result of applying a completion
#[derive(Debug)]
pub enum Resolution {
    Ready {
        address: FrameAddress,
        layer: Layer,
        signature: Signature,
        raster: Arc<RgbaImage>,
    },
    Failed {
        address: FrameAddress,
        layer: Layer,
        error: FetchError,
    },
    /// Superseded by a newer request; nothing changed
    Stale { address: FrameAddress, layer: Layer },
}

/// Hit/miss counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug, Default)]
pub struct FrameCache {
    slots: HashMap<FrameAddress, FrameSlot>,
    next_request: u64,
    stats: CacheStats,
}

impl FrameCache {
    /// One Empty slot per address of the table
    pub fn new(table: &FrameTable) -> Self {
        let slots: HashMap<FrameAddress, FrameSlot> = table
            .addresses()
            .map(|a| (a.clone(), FrameSlot::new(a)))
            .collect();
        debug!("FrameCache created: {} slots", slots.len());
        Self {
            slots,
            next_request: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn slot(&self, address: &FrameAddress) -> Option<&FrameSlot> {
        self.slots.get(address)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Fresh raster for `desired` without touching state
    pub fn get(&self, address: &FrameAddress, layer: Layer, desired: &Signature) -> Option<Arc<RgbaImage>> {
        self.slots.get(address)?.track(layer).raster_for(desired)
    }

    /// Look up `address` for `desired`; on a miss the track moves to Loading
    /// with `desired` as pending target and a request is returned.
    pub fn request(&mut self, address: &FrameAddress, layer: Layer, desired: &Signature, url: String) -> Lookup {
        let slot = self
            .slots
            .entry(address.clone())
            .or_insert_with(|| FrameSlot::new(address.clone()));
        let track = slot.track_mut(layer);

        if let Some(raster) = track.raster_for(desired) {
            self.stats.hits += 1;
            trace!("Cache hit: {} {:?}", address, layer);
            return Lookup::Hit(raster);
        }
        if track.state == SlotState::Loading && track.pending.as_ref() == Some(desired) {
            trace!("Cache pending: {} {:?}", address, layer);
            return Lookup::Pending;
        }

        self.stats.misses += 1;
        if track.pending.is_some() {
            trace!("Redirecting in-flight {} {:?} to a new signature", address, layer);
        }
        track.state = SlotState::Loading;
        track.pending = Some(desired.clone());

        self.next_request += 1;
        Lookup::Issue(FetchRequest {
            id: self.next_request,
            address: address.clone(),
            layer,
            url,
            signature: desired.clone(),
        })
    }

    /// Apply a completion, arbitrating against the track's pending target.
    pub fn resolve(&mut self, completion: Completion) -> Resolution {
        let Completion { request, result } = completion;
        let FetchRequest {
            address,
            layer,
            signature,
            ..
        } = request;

        let Some(slot) = self.slots.get_mut(&address) else {
            self.stats.stale += 1;
            return Resolution::Stale { address, layer };
        };
        let track = slot.track_mut(layer);

        if track.pending.as_ref() != Some(&signature) {
            self.stats.stale += 1;
            trace!("Stale completion ignored: {} {:?}", address, layer);
            return Resolution::Stale { address, layer };
        }
        track.pending = None;

        match result {
            Ok(raster) => {
                let raster = Arc::new(raster);
                track.state = SlotState::Ready;
                track.loaded = Some(signature.clone());
                track.raster = Some(Arc::clone(&raster));
                trace!("Cached {} {:?}", address, layer);
                Resolution::Ready {
                    address,
                    layer,
                    signature,
                    raster,
                }
            }
            Err(error) => {
                // No retry here; the next explicit request re-issues
                self.stats.failures += 1;
                track.state = SlotState::Errored;
                warn!("Load failed for {} {:?}: {}", address, layer, error);
                Resolution::Failed { address, layer, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ProductState, RenderOptions, compute_signature};

    fn table() -> FrameTable {
        FrameTable::new().with_view("side", 4).with_view("top", 1)
    }

    fn sig(color: &str, address: &FrameAddress) -> Signature {
        let mut state = ProductState::new("b", "m");
        state.set_part("front", "nappa", color);
        compute_signature(&state, &RenderOptions::square(100)).for_frame(address)
    }

    fn issue(cache: &mut FrameCache, address: &FrameAddress, s: &Signature) -> FetchRequest {
        match cache.request(address, Layer::Frame, s, format!("url?{}", s)) {
            Lookup::Issue(req) => req,
            other => panic!("expected Issue, got {:?}", other),
        }
    }

    fn ok(request: FetchRequest, red: u8) -> Completion {
        Completion {
            request,
            result: Ok(RgbaImage::from_pixel(1, 1, image::Rgba([red, 0, 0, 255]))),
        }
    }

    #[test]
    fn test_slots_created_for_table() {
        let cache = FrameCache::new(&table());
        assert_eq!(cache.len(), 5);
        let slot = cache.slot(&FrameAddress::new("top", 0)).unwrap();
        assert_eq!(slot.state(), SlotState::Empty);
        assert_eq!(slot.track(Layer::Mask).state(), SlotState::Empty);
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 1);
        let s = sig("white", &a);

        let req = issue(&mut cache, &a, &s);
        assert_eq!(cache.slot(&a).unwrap().state(), SlotState::Loading);
        assert!(matches!(cache.request(&a, Layer::Frame, &s, "u".into()), Lookup::Pending));

        assert!(matches!(cache.resolve(ok(req, 1)), Resolution::Ready { .. }));
        assert!(matches!(cache.request(&a, Layer::Frame, &s, "u".into()), Lookup::Hit(_)));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_stale_ready_slot_is_a_miss() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 1);
        let white = sig("white", &a);
        let req = issue(&mut cache, &a, &white);
        cache.resolve(ok(req, 1));

        let black = sig("black", &a);
        assert!(cache.get(&a, Layer::Frame, &black).is_none());
        assert!(matches!(cache.request(&a, Layer::Frame, &black, "u".into()), Lookup::Issue(_)));
        // The old raster is superseded, not deleted
        assert_eq!(cache.slot(&a).unwrap().track(Layer::Frame).loaded_signature(), Some(&white));
    }

    #[test]
    fn test_overlapping_loads_older_completes_first() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 2);
        let (s1, s2) = (sig("white", &a), sig("black", &a));
        let r1 = issue(&mut cache, &a, &s1);
        let r2 = issue(&mut cache, &a, &s2);

        assert!(matches!(cache.resolve(ok(r1, 1)), Resolution::Stale { .. }));
        assert_eq!(cache.slot(&a).unwrap().state(), SlotState::Loading);
        assert!(matches!(cache.resolve(ok(r2, 2)), Resolution::Ready { .. }));

        let track = cache.slot(&a).unwrap().track(Layer::Frame);
        assert_eq!(track.loaded_signature(), Some(&s2));
        assert_eq!(cache.get(&a, Layer::Frame, &s2).unwrap().get_pixel(0, 0).0[0], 2);
    }

    #[test]
    fn test_overlapping_loads_newer_completes_first() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 2);
        let (s1, s2) = (sig("white", &a), sig("black", &a));
        let r1 = issue(&mut cache, &a, &s1);
        let r2 = issue(&mut cache, &a, &s2);

        assert!(matches!(cache.resolve(ok(r2, 2)), Resolution::Ready { .. }));
        // Superseded response arriving late must not overwrite
        assert!(matches!(cache.resolve(ok(r1, 1)), Resolution::Stale { .. }));

        let track = cache.slot(&a).unwrap().track(Layer::Frame);
        assert_eq!(track.state(), SlotState::Ready);
        assert_eq!(track.loaded_signature(), Some(&s2));
        assert_eq!(cache.stats().stale, 1);
    }

    #[test]
    fn test_failure_clears_pending_and_allows_retry() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("top", 0);
        let s = sig("white", &a);
        let req = issue(&mut cache, &a, &s);

        let res = cache.resolve(Completion {
            request: req,
            result: Err(FetchError::Network("timeout".into())),
        });
        assert!(matches!(res, Resolution::Failed { .. }));
        let track = cache.slot(&a).unwrap().track(Layer::Frame);
        assert_eq!(track.state(), SlotState::Errored);
        assert!(track.pending_signature().is_none());

        // Same signature again: re-issued rather than reported pending
        let retry = issue(&mut cache, &a, &s);
        assert!(matches!(cache.resolve(ok(retry, 9)), Resolution::Ready { .. }));
    }

    #[test]
    fn test_stale_failure_does_not_touch_slot() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 0);
        let (s1, s2) = (sig("white", &a), sig("black", &a));
        let r1 = issue(&mut cache, &a, &s1);
        let _r2 = issue(&mut cache, &a, &s2);
        let res = cache.resolve(Completion {
            request: r1,
            result: Err(FetchError::Network("reset".into())),
        });
        assert!(matches!(res, Resolution::Stale { .. }));
        let track = cache.slot(&a).unwrap().track(Layer::Frame);
        assert_eq!(track.state(), SlotState::Loading);
        assert_eq!(track.pending_signature(), Some(&s2));
    }

    #[test]
    fn test_layers_are_independent() {
        let mut cache = FrameCache::new(&table());
        let a = FrameAddress::new("side", 3);
        let s = sig("white", &a);
        let frame = issue(&mut cache, &a, &s);
        let mask = match cache.request(&a, Layer::Mask, &s, "mask".into()) {
            Lookup::Issue(req) => req,
            other => panic!("{:?}", other),
        };
        cache.resolve(ok(mask, 5));
        let slot = cache.slot(&a).unwrap();
        assert_eq!(slot.track(Layer::Mask).state(), SlotState::Ready);
        assert_eq!(slot.state(), SlotState::Loading);
        cache.resolve(ok(frame, 1));
        assert_eq!(cache.slot(&a).unwrap().state(), SlotState::Ready);
    }
}
