//! Configurator widget: rotates a product through server-rendered frames.
//!
//! Owns the frame cache, the double-buffered compositor, the hit-test mask,
//! the highlight overlay, the drag gesture and the preload scheduler, and
//! wires them together:
//!
//! ```text
//! update()/change_frame()/drag -> signature -> cache lookup
//!     hit  -> compositor.draw_frame()
//!     miss -> fetch job on the executor -> inbox -> pump() -> cache.resolve()
//!                                                          -> draw / preload mark
//! ```
//!
//! Everything runs on the thread that owns the widget. Worker jobs only
//! fetch and post [`Message`]s; the host calls [`Configurator::pump`] once per
//! UI frame to apply them, fire timers and advance animations.

use image::RgbaImage;
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::compositor::{AnimateMode, Compositor, DrawReport, DrawTag};
use super::configurator_events::{
    ChangedFrameEvent, DeselectedPartEvent, HighlightedPartEvent, LoadedEvent, PartsEvent, SelectedPartEvent,
};
use super::gesture::{GestureController, PointerEvent, PointerKind, PointerTarget};
use super::highlight::Overlay;
use super::mask::{MaskIndex, PartHitMap};
use crate::config::ConfiguratorOptions;
use crate::core::Context;
use crate::core::event_bus::WidgetEmitter;
use crate::core::frame_cache::{Completion, FetchRequest, FrameCache, Layer, Lookup, Resolution};
use crate::core::inbox::{self, InboxReceiver, InboxSender, Message, Upstream};
use crate::core::preloader::{Begin, PreloadScheduler, PreloadStart, Progress};
use crate::entities::{
    FrameAddress, FrameKeyError, FrameTable, ProductState, RenderOptions, Signature, compute_mask_signature,
    compute_signature, parse_frame_key, wrap,
};

/// Upper bound of apply/tick rounds per `pump()` call
const MAX_PUMP_ROUNDS: usize = 64;

/// Rejected `change_frame` request (the ValidationError family)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguratorError {
    InvalidFrameKey(FrameKeyError),
    UnsupportedView(String),
    PositionOutOfRange { frame: String, count: u32 },
    /// Frame table not received yet
    NotReady,
}

impl fmt::Display for ConfiguratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfiguratorError::InvalidFrameKey(e) => write!(f, "Invalid frame key: {}", e),
            ConfiguratorError::UnsupportedView(v) => write!(f, "View '{}' is not supported", v),
            ConfiguratorError::PositionOutOfRange { frame, count } => {
                write!(f, "Frame {} is not supported ({} frames in view)", frame, count)
            }
            ConfiguratorError::NotReady => write!(f, "Configurator is not ready"),
        }
    }
}

impl std::error::Error for ConfiguratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfiguratorError::InvalidFrameKey(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameKeyError> for ConfiguratorError {
    fn from(e: FrameKeyError) -> Self {
        ConfiguratorError::InvalidFrameKey(e)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Transition for the draw; a signature change without one uses `Simple`
    pub animate: AnimateMode,
    pub duration: Option<Duration>,
    /// Reload even if nothing relevant changed
    pub force: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeFrameOptions {
    /// Walk there one position at a time over this long
    pub duration: Option<Duration>,
    /// Transition of every step of a timed walk
    pub animate: Option<AnimateMode>,
    /// Suppress drag input until the change settles
    pub prevent_drag: bool,
}

impl Default for ChangeFrameOptions {
    fn default() -> Self {
        Self {
            duration: None,
            animate: None,
            prevent_drag: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightOptions {
    pub opacity: Option<f32>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FullscreenOptions {
    pub max_size: Option<u32>,
}

/// Whether an update issued a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateOutcome {
    Skipped,
    Loading,
}

/// Frame to draw once its raster lands
#[derive(Debug, Clone)]
struct PendingDraw {
    address: FrameAddress,
    signature: Signature,
    mode: AnimateMode,
    duration: Option<Duration>,
    tag: Option<DrawTag>,
}

/// A `change_frame` in progress
#[derive(Debug, Clone)]
struct StepRun {
    target: FrameAddress,
    /// Time left for a timed walk; `None` for a direct change
    remaining: Option<Duration>,
    animate: Option<AnimateMode>,
    prevent_drag: bool,
    timed: bool,
    step_mode: AnimateMode,
    step_duration: Duration,
    awaiting: Option<DrawTag>,
}

pub struct Configurator {
    id: Uuid,
    ctx: Context,
    options: ConfiguratorOptions,
    emitter: WidgetEmitter,
    tx: InboxSender,
    rx: InboxReceiver,

    state: ProductState,
    frames: Option<FrameTable>,
    hit_map: PartHitMap,
    cache: FrameCache,
    compositor: Compositor,
    mask_index: MaskIndex,
    overlay: Overlay,
    gesture: GestureController,
    preloader: PreloadScheduler,

    current: FrameAddress,
    size: u32,
    display: (f32, f32),
    fullscreen: bool,
    windowed_size: Option<u32>,

    signature: Option<Signature>,
    unique: Option<Signature>,
    preloaded: bool,
    animating: bool,

    run: Option<StepRun>,
    step_at: Option<Instant>,
    pending_draw: Option<PendingDraw>,
    preload_waiters: HashMap<FrameAddress, u64>,
    next_tag: u64,
    now: Instant,
}

impl fmt::Debug for Configurator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configurator")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("size", &self.size)
            .field("ready", &self.frames.is_some())
            .finish_non_exhaustive()
    }
}

impl Configurator {
    /// Create the widget and request the frame table and part metadata.
    ///
    /// Nothing is drawn until the frame table arrives through [`pump`](Self::pump).
    pub fn new(ctx: Context, state: ProductState, options: ConfiguratorOptions) -> Self {
        let (tx, rx) = inbox::inbox();
        subscribe_upstream(&ctx, &tx);

        let size = options.size;
        let this = Self {
            id: Uuid::new_v4(),
            emitter: WidgetEmitter::from_emitter(ctx.bus.emitter()),
            hit_map: PartHitMap::default(),
            cache: FrameCache::default(),
            compositor: Compositor::new(size, size, Duration::from_millis(options.crossfade_ms)),
            mask_index: MaskIndex::new(size),
            overlay: Overlay::new(),
            gesture: GestureController::new(options.sensitivity, options.vertical_threshold),
            preloader: PreloadScheduler::new(options.drain_mode(), options.preload_delay_ms),
            current: options.initial_frame(),
            size,
            display: (size as f32, size as f32),
            fullscreen: false,
            windowed_size: None,
            signature: None,
            unique: None,
            preloaded: false,
            animating: false,
            run: None,
            step_at: None,
            pending_draw: None,
            preload_waiters: HashMap::new(),
            next_tag: 0,
            now: Instant::now(),
            frames: None,
            ctx,
            options,
            state,
            tx,
            rx,
        };
        this.request_product_data();
        this
    }

    fn request_product_data(&self) {
        let config = Arc::clone(&self.ctx.config);
        let state = self.state.clone();
        let tx = self.tx.clone();
        self.ctx.executor.execute(Box::new(move || {
            let _ = tx.send(Message::FrameTable(config.frame_table(&state)));
        }));

        let config = Arc::clone(&self.ctx.config);
        let state = self.state.clone();
        let tx = self.tx.clone();
        self.ctx.executor.execute(Box::new(move || {
            let _ = tx.send(Message::ProductMeta(config.product_meta(&state)));
        }));
    }

    // ---- Host loop ----

    /// Apply queued completions, fire due timers and advance animations to
    /// `now`. Call once per UI frame.
    pub fn pump(&mut self, now: Instant) {
        self.now = now;
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut progressed = false;

            for message in inbox::drain(&self.rx) {
                progressed = true;
                self.apply(message);
            }

            if let Some(start) = self.preloader.tick(now) {
                progressed = true;
                self.start_preload_loads(start);
            }

            if self.step_at.is_some_and(|at| at <= now) {
                progressed = true;
                self.step_at = None;
                self.step();
            }

            self.compositor.tick(now);
            self.overlay.tick(now);
            let reports = self.compositor.take_finished();
            if !reports.is_empty() {
                progressed = true;
                for report in reports {
                    self.draw_settled(report);
                }
            }

            if !progressed {
                return;
            }
        }
        trace!("pump: round limit reached, continuing next frame");
    }

    /// Earliest instant at which `pump()` has timed work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.step_at,
            self.preloader.next_deadline(),
            self.compositor.next_deadline(),
            self.overlay.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn apply(&mut self, message: Message) {
        match message {
            Message::Fetched(completion) => self.on_fetched(completion),
            Message::Overlay { url, part, result } => match result {
                Ok(raster) => {
                    if self.overlay.on_loaded(&url, raster) {
                        self.emitter.emit(HighlightedPartEvent {
                            configurator: self.id,
                            part,
                        });
                    }
                }
                Err(e) => {
                    warn!("Highlight mask for '{}' failed: {}", part, e);
                    self.overlay.on_failed(&url);
                }
            },
            Message::FrameTable(Ok(table)) => self.on_frame_table(table),
            Message::FrameTable(Err(e)) => error!("Configurator {}: frame table unavailable: {}", self.id, e),
            Message::ProductMeta(Ok(meta)) => {
                self.hit_map = PartHitMap::from_meta(&meta);
                debug!("Part hit map: {:?}", self.hit_map.parts());
            }
            Message::ProductMeta(Err(e)) => error!("Configurator {}: product meta unavailable: {}", self.id, e),
            Message::Upstream(Upstream::Parts(parts)) => {
                let mut state = self.state.clone();
                state.parts = parts;
                self.update(Some(state), UpdateOptions::default());
            }
            Message::Upstream(Upstream::Selected(part)) => self.highlight(&part, HighlightOptions::default()),
            Message::Upstream(Upstream::Deselected(_)) => self.lowlight(),
        }
    }

    fn on_frame_table(&mut self, table: FrameTable) {
        let Some(first) = table.first() else {
            error!("Configurator {}: frame table has no frames", self.id);
            return;
        };
        if !table.contains(&self.current) {
            debug!("Initial frame {} not in table, using {}", self.current, first);
            self.current = first;
        }
        self.cache = FrameCache::new(&table);
        self.frames = Some(table);
        info!("Configurator {} ready at {}", self.id, self.current);
        self.update(
            None,
            UpdateOptions {
                force: true,
                ..Default::default()
            },
        );
    }

    fn on_fetched(&mut self, completion: Completion) {
        match self.cache.resolve(completion) {
            Resolution::Ready {
                address,
                layer: Layer::Frame,
                signature,
                raster,
            } => {
                let matches = self
                    .pending_draw
                    .as_ref()
                    .is_some_and(|p| p.address == address && p.signature == signature);
                if matches && let Some(draw) = self.pending_draw.take() {
                    self.commit_draw(raster, &draw);
                }
                if let Some(generation) = self.preload_waiters.remove(&address) {
                    self.preload_settled(vec![(generation, address)]);
                }
            }
            Resolution::Ready {
                address,
                layer: Layer::Mask,
                ..
            } => {
                if address == self.current {
                    self.refresh_mask();
                }
            }
            Resolution::Failed {
                address,
                layer: Layer::Frame,
                ..
            } => {
                if self.pending_draw.as_ref().is_some_and(|p| p.address == address)
                    && let Some(PendingDraw { tag: Some(tag), .. }) = self.pending_draw.take()
                {
                    self.draw_settled(DrawReport { tag, completed: false });
                }
                // A failed frame still counts as settled for the preload batch
                if let Some(generation) = self.preload_waiters.remove(&address) {
                    self.preload_settled(vec![(generation, address)]);
                }
            }
            Resolution::Failed { layer: Layer::Mask, .. } | Resolution::Stale { .. } => {}
        }
    }

    // ---- Public API ----

    /// Re-provision the canvases at `size` (default: configured size) and
    /// force a redraw of the current frame.
    pub fn resize(&mut self, size: Option<u32>) {
        let size = size.unwrap_or(self.options.size);
        info!("Configurator {} resize {} -> {}", self.id, self.size, size);
        self.size = size;
        self.display = (size as f32, size as f32);
        self.compositor.resize(size, size);
        self.mask_index.resize(size);
        self.update(
            None,
            UpdateOptions {
                force: true,
                ..Default::default()
            },
        );
    }

    /// Display size of the surfaces when the host scales them
    pub fn set_display_size(&mut self, width: f32, height: f32) {
        self.display = (width, height);
    }

    /// Recompute the signature and load the current frame if anything
    /// changed (or `force`). Returns true if a load was issued.
    pub fn update(&mut self, state: Option<ProductState>, options: UpdateOptions) -> bool {
        self.update_tagged(state, options, None) == UpdateOutcome::Loading
    }

    fn update_tagged(
        &mut self,
        state: Option<ProductState>,
        options: UpdateOptions,
        tag: Option<DrawTag>,
    ) -> UpdateOutcome {
        if let Some(state) = state {
            self.state = state;
        }
        if self.frames.is_none() {
            return UpdateOutcome::Skipped;
        }

        let signature = compute_signature(&self.state, &self.render_options());
        let changed = self.signature.as_ref() != Some(&signature);
        let mode = if options.animate.is_animated() {
            options.animate
        } else if changed {
            AnimateMode::Simple
        } else {
            AnimateMode::None
        };

        let unique = signature.for_frame(&self.current);
        self.signature = Some(signature);
        if self.unique.as_ref() == Some(&unique) && !options.force {
            trace!("update: {} unchanged", self.current);
            return UpdateOutcome::Skipped;
        }
        self.unique = Some(unique);

        let draw = PendingDraw {
            address: self.current.clone(),
            signature: self.frame_signature(&self.current),
            mode,
            duration: options.duration,
            tag,
        };
        let current = self.current.clone();
        self.load_frame(&current, Some(draw));

        if changed || !self.preloaded {
            self.start_preload();
        }
        UpdateOutcome::Loading
    }

    /// Show `frame` (a `"view-position"` key).
    ///
    /// With a duration the widget walks there one position per step, each
    /// step getting an equal share of the time; a view change is a single
    /// cross-faded step.
    pub fn change_frame(&mut self, frame: &str, options: ChangeFrameOptions) -> Result<(), ConfiguratorError> {
        let table = self.frames.as_ref().ok_or(ConfiguratorError::NotReady)?;
        let target = parse_frame_key(frame)?;
        let count = table
            .count(&target.view)
            .filter(|c| *c > 0)
            .ok_or_else(|| ConfiguratorError::UnsupportedView(target.view.clone()))?;
        if target.position >= count {
            return Err(ConfiguratorError::PositionOutOfRange {
                frame: frame.to_string(),
                count,
            });
        }

        // A new change replaces any walk in progress
        self.cancel_run();
        let timed = options.duration.is_some_and(|d| !d.is_zero());
        self.run = Some(StepRun {
            target,
            remaining: options.duration.filter(|_| timed),
            animate: options.animate,
            prevent_drag: options.prevent_drag,
            timed,
            step_mode: AnimateMode::None,
            step_duration: Duration::ZERO,
            awaiting: None,
        });
        self.step();
        Ok(())
    }

    /// Overlay the single-part mask of `part` on the current frame.
    pub fn highlight(&mut self, part: &str, options: HighlightOptions) {
        if !self.options.use_masks || self.frames.is_none() {
            return;
        }
        let url = self
            .ctx
            .images
            .mask_url(&self.current, &self.state, &self.render_options(), Some(part));
        let opacity = options.opacity.unwrap_or(self.options.mask_opacity);
        let duration = options
            .duration
            .unwrap_or(Duration::from_millis(self.options.mask_duration_ms));
        if !self.overlay.show(part, url.clone(), opacity, duration, self.now) {
            return;
        }

        let source = Arc::clone(&self.ctx.source);
        let tx = self.tx.clone();
        let part = part.to_string();
        self.ctx.executor.execute(Box::new(move || {
            let result = source.fetch(&url);
            let _ = tx.send(Message::Overlay { url, part, result });
        }));
    }

    pub fn lowlight(&mut self) {
        if !self.options.use_masks {
            return;
        }
        self.overlay.clear();
    }

    /// Publish a part selection on the bus (the widget hears it back and
    /// highlights the part).
    pub fn select_part(&self, part: &str) {
        debug!("Configurator {} selected part '{}'", self.id, part);
        self.emitter.emit(SelectedPartEvent(part.to_string()));
    }

    pub fn enter_fullscreen(&mut self, options: FullscreenOptions) {
        if !self.fullscreen {
            self.windowed_size = Some(self.size);
        }
        self.fullscreen = true;
        info!("Configurator {} entering fullscreen", self.id);
        self.resize(Some(options.max_size.unwrap_or(self.options.max_size)));
    }

    pub fn leave_fullscreen(&mut self) {
        self.fullscreen = false;
        info!("Configurator {} leaving fullscreen", self.id);
        let size = self.windowed_size.take();
        self.resize(size);
    }

    /// Route a pointer (or translated touch) event.
    ///
    /// Surface events are handled by the surface first and then bubble to
    /// the widget root, as they would in a DOM.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        if self.frames.is_none() {
            return;
        }
        if event.target == PointerTarget::Surface {
            match event.kind {
                PointerKind::Move => self.hover(event.x, event.y),
                PointerKind::Click => self.click(event.x, event.y),
                _ => {}
            }
        }

        match event.kind {
            PointerKind::Down => self.gesture.pointer_down(event.x, event.y, &self.current),
            PointerKind::Move => self.drag_to(event.x, event.y),
            PointerKind::Up | PointerKind::Leave => self.gesture.release(),
            PointerKind::Click => {}
        }
    }

    // ---- Accessors ----

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.frames.is_some()
    }

    pub fn frames(&self) -> Option<&FrameTable> {
        self.frames.as_ref()
    }

    pub fn current_frame(&self) -> &FrameAddress {
        &self.current
    }

    pub fn state(&self) -> &ProductState {
        &self.state
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn frame_cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn mask_index(&self) -> &MaskIndex {
        &self.mask_index
    }

    pub fn hit_map(&self) -> &PartHitMap {
        &self.hit_map
    }

    /// Product signature of the last update
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Cache key of `address` under the current state and size
    pub fn frame_signature(&self, address: &FrameAddress) -> Signature {
        compute_signature(&self.state, &self.render_options()).for_frame(address)
    }

    pub fn is_preloading(&self) -> bool {
        self.preloader.is_suppressing()
    }

    /// A `change_frame` transition holds the drag lock
    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// Drag input ignored: preload and transitions take priority
    pub fn is_drag_suppressed(&self) -> bool {
        self.preloader.is_suppressing() || self.animating
    }

    pub fn is_dragging(&self) -> bool {
        self.gesture.is_dragging()
    }

    // ---- Loading ----

    fn render_options(&self) -> RenderOptions {
        self.options.render_options(self.size)
    }

    /// Request frame and mask of `address`; with `draw`, the frame is drawn
    /// as soon as it is available. Returns true if the frame was a cache hit.
    fn load_frame(&mut self, address: &FrameAddress, draw: Option<PendingDraw>) -> bool {
        let render = self.render_options();

        let mask_signature = compute_mask_signature(&self.state, &render).for_frame(address);
        let mask_url = self.ctx.images.mask_url(address, &self.state, &render, None);
        if let Lookup::Issue(request) = self.cache.request(address, Layer::Mask, &mask_signature, mask_url) {
            self.dispatch(request);
        }
        if *address == self.current {
            self.refresh_mask();
        }

        let signature = compute_signature(&self.state, &render).for_frame(address);
        let url = self.ctx.images.image_url(address, &self.state, &render);
        let lookup = self.cache.request(address, Layer::Frame, &signature, url);

        if let Some(draw) = draw {
            // Whatever was waiting to be drawn is superseded
            if let Some(PendingDraw { tag: Some(tag), .. }) = self.pending_draw.take() {
                self.draw_settled(DrawReport { tag, completed: false });
            }
            match &lookup {
                Lookup::Hit(raster) => self.commit_draw(Arc::clone(raster), &draw),
                Lookup::Pending | Lookup::Issue(_) => self.pending_draw = Some(draw),
            }
        }

        match lookup {
            Lookup::Hit(_) => true,
            Lookup::Pending => false,
            Lookup::Issue(request) => {
                self.dispatch(request);
                false
            }
        }
    }

    fn dispatch(&self, request: FetchRequest) {
        let source = Arc::clone(&self.ctx.source);
        let tx = self.tx.clone();
        self.ctx.executor.execute(Box::new(move || {
            let result = source.fetch(&request.url);
            let _ = tx.send(Message::Fetched(Completion { request, result }));
        }));
    }

    fn commit_draw(&mut self, raster: Arc<RgbaImage>, draw: &PendingDraw) {
        debug!("Draw {} ({:?})", draw.address, draw.mode);
        self.compositor
            .draw_frame(raster, draw.mode, draw.duration, draw.tag, self.now);
    }

    /// Bind the mask of the current frame, or clear hit testing until it loads
    fn refresh_mask(&mut self) {
        let signature = compute_mask_signature(&self.state, &self.render_options()).for_frame(&self.current);
        match self.cache.get(&self.current, Layer::Mask, &signature) {
            Some(mask) => {
                if !self.mask_index.is_bound(&self.current, &mask) {
                    self.mask_index.bind(self.current.clone(), mask);
                }
            }
            None => {
                if self.mask_index.bound_address().is_some() {
                    self.mask_index.unbind();
                }
            }
        }
    }

    // ---- Preload ----

    fn start_preload(&mut self) {
        let Some(table) = self.frames.as_ref() else {
            return;
        };
        self.preloaded = true;
        match self.preloader.begin(table, Some(&self.current), self.now) {
            Begin::Scheduled(generation) => debug!("Configurator {} preload gen {} scheduled", self.id, generation),
            Begin::Empty(_) => self.emitter.emit(LoadedEvent { configurator: self.id }),
        }
    }

    fn start_preload_loads(&mut self, start: PreloadStart) {
        let settled: Vec<(u64, FrameAddress)> = start
            .issue
            .into_iter()
            .filter_map(|address| self.preload_load(start.generation, address))
            .collect();
        self.preload_settled(settled);
    }

    /// Load one preload frame; returns it back if it settled on the spot.
    fn preload_load(&mut self, generation: u64, address: FrameAddress) -> Option<(u64, FrameAddress)> {
        if self.load_frame(&address, None) {
            Some((generation, address))
        } else {
            self.preload_waiters.insert(address, generation);
            None
        }
    }

    fn preload_settled(&mut self, mut settled: Vec<(u64, FrameAddress)>) {
        while let Some((generation, address)) = settled.pop() {
            match self.preloader.mark(generation, &address) {
                Progress::Next(next) => settled.extend(self.preload_load(generation, next)),
                Progress::Finished => {
                    info!("Configurator {} preload gen {} loaded", self.id, generation);
                    self.emitter.emit(LoadedEvent { configurator: self.id });
                }
                Progress::Waiting | Progress::Ignored => {}
            }
        }
    }

    // ---- Frame changes ----

    fn cancel_run(&mut self) {
        if self.run.take().is_some() {
            trace!("change_frame run cancelled");
        }
        self.step_at = None;
        self.animating = false;
    }

    /// Execute the next step of the active run
    fn step(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        let Some(count) = self.frames.as_ref().and_then(|t| t.count(&run.target.view)) else {
            return;
        };

        self.lowlight();
        self.gesture.remember(&self.current);

        let view_change = run.target.view != self.current.view;
        let mut mode = if view_change { AnimateMode::Cross } else { AnimateMode::None };
        let mut step_duration = Duration::ZERO;

        let next = match run.remaining {
            Some(remaining) if run.timed => {
                if let Some(animate) = run.animate {
                    mode = animate;
                }
                let step_count: i64 = if view_change {
                    1
                } else {
                    shortest_steps(self.current.position, run.target.position, count)
                };
                if step_count == 0 {
                    step_duration = remaining;
                    run.remaining = Some(Duration::ZERO);
                    self.current.clone()
                } else {
                    step_duration = remaining / step_count.unsigned_abs() as u32;
                    run.remaining = Some(remaining.saturating_sub(step_duration));
                    if view_change {
                        run.target.clone()
                    } else {
                        let position = wrap(i64::from(self.current.position) + step_count.signum(), count);
                        FrameAddress::new(run.target.view.clone(), position)
                    }
                }
            }
            _ => run.target.clone(),
        };

        if view_change {
            debug!("View change {} -> {}", self.current.view, next.view);
        }
        if run.prevent_drag && (mode.is_animated() || run.timed) {
            self.animating = true;
        }

        self.current = next;
        self.refresh_mask();
        self.emitter.emit(ChangedFrameEvent {
            configurator: self.id,
            frame: self.current.key(),
        });

        self.next_tag += 1;
        let tag = DrawTag(self.next_tag);
        run.step_mode = mode;
        run.step_duration = step_duration;
        run.awaiting = Some(tag);
        self.run = Some(run);

        let options = UpdateOptions {
            animate: mode,
            duration: (!step_duration.is_zero()).then_some(step_duration),
            force: false,
        };
        if self.update_tagged(None, options, Some(tag)) == UpdateOutcome::Skipped {
            self.draw_settled(DrawReport { tag, completed: true });
        }
    }

    /// A tagged draw finished (or was cut off): continue or end the run
    fn draw_settled(&mut self, report: DrawReport) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if run.awaiting != Some(report.tag) {
            return;
        }
        run.awaiting = None;

        if !report.completed {
            debug!("change_frame run abandoned at {}", self.current);
            self.cancel_run();
            return;
        }

        if !run.timed || self.current == run.target {
            let release = run.prevent_drag;
            self.run = None;
            if release {
                self.animating = false;
            }
            return;
        }

        let delay = if run.step_mode.is_animated() {
            Duration::ZERO
        } else {
            run.step_duration
        };
        self.step_at = Some(self.now + delay);
    }

    // ---- Pointer ----

    fn drag_to(&mut self, x: f32, y: f32) {
        if self.is_drag_suppressed() {
            return;
        }
        let Some(table) = self.frames.as_ref() else {
            return;
        };
        let (width, height) = self.display;
        let Some(next) = self.gesture.pointer_move(x, y, width, height, &self.current, table) else {
            return;
        };
        if let Err(e) = self.change_frame(&next.key(), ChangeFrameOptions::default()) {
            warn!("Drag to {} rejected: {}", next, e);
        }
    }

    /// Hover and click are ignored while preloading or animating
    fn hit_testing_blocked(&self) -> bool {
        self.preloader.is_suppressing() || self.animating
    }

    fn hover(&mut self, x: f32, y: f32) {
        if self.hit_testing_blocked() {
            return;
        }
        let index = self.mask_index.index_at(x, y, self.display.0);
        if index == 0 || self.gesture.is_dragging() {
            self.lowlight();
            return;
        }
        if let Some(part) = self.hit_map.resolve(index).map(str::to_string) {
            self.highlight(&part, HighlightOptions::default());
        }
    }

    fn click(&mut self, x: f32, y: f32) {
        if self.hit_testing_blocked() {
            return;
        }
        let index = self.mask_index.index_at(x, y, self.display.0);
        if let Some(part) = self.hit_map.resolve(index) {
            self.select_part(part);
        }
    }
}

/// Signed step count from `from` to `to` the short way round a view of
/// `count` frames; ties go forward.
fn shortest_steps(from: u32, to: u32, count: u32) -> i64 {
    let forward = i64::from(wrap(i64::from(to) - i64::from(from), count));
    let backward = i64::from(count) - forward;
    if forward == 0 {
        0
    } else if forward <= backward {
        forward
    } else {
        -backward
    }
}

/// Forward product-model events into the widget inbox
fn subscribe_upstream(ctx: &Context, tx: &InboxSender) {
    let sender = tx.clone();
    ctx.bus.subscribe::<PartsEvent, _>(move |e| {
        let _ = sender.send(Message::Upstream(Upstream::Parts(e.0.clone())));
    });
    let sender = tx.clone();
    ctx.bus.subscribe::<SelectedPartEvent, _>(move |e| {
        let _ = sender.send(Message::Upstream(Upstream::Selected(e.0.clone())));
    });
    let sender = tx.clone();
    ctx.bus.subscribe::<DeselectedPartEvent, _>(move |e| {
        let _ = sender.send(Message::Upstream(Upstream::Deselected(e.0.clone())));
    });
}
