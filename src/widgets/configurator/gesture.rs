//! Drag gesture state machine: pointer movement -> frame address.
//!
//! ```text
//! Idle ──down──▶ Dragging{origin, base} ──up/leave──▶ Idle
//!                   │
//!                   └─move─▶ (view switch?, wrapped position) -> address
//! ```
//!
//! Horizontal travel rotates within the view relative to the frame under the
//! pointer at `down`. Vertical travel past the threshold switches view
//! (top <-> side <-> bottom) and re-arms the vertical origin, so each switch
//! needs a fresh threshold's worth of travel.

use log::debug;
use std::collections::HashMap;

use crate::entities::{FrameAddress, FrameTable, wrap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
    Click,
}

/// Where a pointer event was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// Widget root (drag handling)
    Root,
    /// One of the compositor surfaces (hit testing)
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Start,
    Move,
    End,
    Cancel,
}

/// Synthetic pointer event in widget display coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub target: PointerTarget,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn root(kind: PointerKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            target: PointerTarget::Root,
            x,
            y,
        }
    }

    pub fn surface(kind: PointerKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            target: PointerTarget::Surface,
            x,
            y,
        }
    }

    /// Touch events map 1:1 onto pointer events on the widget root
    pub fn from_touch(kind: TouchKind, x: f32, y: f32) -> Self {
        let kind = match kind {
            TouchKind::Start => PointerKind::Down,
            TouchKind::Move => PointerKind::Move,
            TouchKind::End => PointerKind::Up,
            TouchKind::Cancel => PointerKind::Leave,
        };
        Self::root(kind, x, y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureState {
    Idle,
    Dragging {
        origin_x: f32,
        origin_y: f32,
        base: FrameAddress,
    },
}

/// View reached by a vertical drag from `view`
fn next_view(view: &str, downward: bool) -> &'static str {
    match (view, downward) {
        ("top", true) => "side",
        (_, true) => "bottom",
        ("bottom", false) => "side",
        (_, false) => "top",
    }
}

#[derive(Debug)]
pub struct GestureController {
    state: GestureState,
    sensitivity: f32,
    vertical_threshold: f32,
    last_positions: HashMap<String, u32>,
}

impl GestureController {
    pub fn new(sensitivity: f32, vertical_threshold: f32) -> Self {
        Self {
            state: GestureState::Idle,
            sensitivity,
            vertical_threshold,
            last_positions: HashMap::new(),
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, GestureState::Dragging { .. })
    }

    pub fn pointer_down(&mut self, x: f32, y: f32, current: &FrameAddress) {
        self.state = GestureState::Dragging {
            origin_x: x,
            origin_y: y,
            base: current.clone(),
        };
    }

    /// Up or leave
    pub fn release(&mut self) {
        self.state = GestureState::Idle;
    }

    /// Record the position shown in a view before leaving it
    pub fn remember(&mut self, address: &FrameAddress) {
        self.last_positions.insert(address.view.clone(), address.position);
    }

    /// Last position shown in `view`, 0 if never visited
    pub fn last_position(&self, view: &str) -> u32 {
        self.last_positions.get(view).copied().unwrap_or(0)
    }

    /// Map a move to the address to show. `None` when idle or when the
    /// pointer still resolves to `current`.
    pub fn pointer_move(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        current: &FrameAddress,
        table: &FrameTable,
    ) -> Option<FrameAddress> {
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let GestureState::Dragging {
            origin_x,
            origin_y,
            base,
        } = &mut self.state
        else {
            return None;
        };

        let percent_x = (*origin_x - x) / width;
        let percent_y = (*origin_y - y) / height;
        let vertical = self.sensitivity * percent_y;

        let mut view = current.view.as_str();
        if vertical.abs() > self.vertical_threshold {
            let candidate = next_view(view, vertical > 0.0);
            if candidate != view && table.has_view(candidate) {
                debug!("Drag view switch {} -> {}", view, candidate);
                view = candidate;
                *origin_y = y;
            }
        }

        let next = if view != current.view {
            FrameAddress::new(view, self.last_positions.get(view).copied().unwrap_or(0))
        } else {
            let count = table.count(view).filter(|c| *c > 0)?;
            let raw = (f64::from(base.position) - f64::from(self.sensitivity * percent_x)).trunc() as i64;
            FrameAddress::new(view, wrap(raw, count))
        };

        (next != *current).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FrameTable {
        FrameTable::new()
            .with_view("side", 36)
            .with_view("top", 1)
            .with_view("bottom", 1)
    }

    fn side(p: u32) -> FrameAddress {
        FrameAddress::new("side", p)
    }

    #[test]
    fn test_horizontal_wraparound() {
        let mut g = GestureController::new(40.0, 15.0);
        g.pointer_down(100.0, 50.0, &side(10));
        // percentX = (100 - 150) / 100 = -0.5 -> 10 + 20 = 30
        assert_eq!(g.pointer_move(150.0, 50.0, 100.0, 100.0, &side(10), &table()), Some(side(30)));
        // percentX = 0.5 -> 10 - 20 = -10 -> 26
        assert_eq!(g.pointer_move(50.0, 50.0, 100.0, 100.0, &side(30), &table()), Some(side(26)));
    }

    #[test]
    fn test_small_moves_stay_on_frame() {
        let mut g = GestureController::new(40.0, 15.0);
        g.pointer_down(100.0, 50.0, &side(3));
        assert_eq!(g.pointer_move(101.0, 51.0, 100.0, 100.0, &side(3), &table()), None);
    }

    #[test]
    fn test_idle_ignores_moves() {
        let mut g = GestureController::new(40.0, 15.0);
        assert_eq!(g.pointer_move(0.0, 0.0, 100.0, 100.0, &side(0), &table()), None);
        g.pointer_down(0.0, 0.0, &side(0));
        g.release();
        assert_eq!(g.state(), &GestureState::Idle);
        assert_eq!(g.pointer_move(90.0, 0.0, 100.0, 100.0, &side(0), &table()), None);
    }

    #[test]
    fn test_vertical_switch_resumes_last_position() {
        let mut g = GestureController::new(40.0, 15.0);
        let t = table();
        g.pointer_down(50.0, 50.0, &side(7));

        // Pointer up by 50% -> 40 * 0.5 = 20 > 15 -> bottom
        let bottom = g.pointer_move(50.0, 0.0, 100.0, 100.0, &side(7), &t).unwrap();
        assert_eq!(bottom, FrameAddress::new("bottom", 0));

        // Origin Y re-armed at 0: tiny extra travel does nothing
        assert_eq!(g.pointer_move(50.0, -2.0, 100.0, 100.0, &bottom, &t), None);

        // Pointer back down by 50% -> side, at the last recorded side position
        g.remember(&side(7));
        let back = g.pointer_move(50.0, 50.0, 100.0, 100.0, &bottom, &t).unwrap();
        assert_eq!(back, side(7));
    }

    #[test]
    fn test_switch_to_missing_view_cancelled() {
        let mut g = GestureController::new(40.0, 15.0);
        let t = FrameTable::new().with_view("side", 36);
        g.pointer_down(50.0, 50.0, &side(4));
        // Vertical cancelled, horizontal still applies: 4 - 40*0.25 = -6 -> 30
        assert_eq!(g.pointer_move(25.0, 0.0, 100.0, 100.0, &side(4), &t), Some(side(30)));
    }

    #[test]
    fn test_view_order() {
        assert_eq!(next_view("top", true), "side");
        assert_eq!(next_view("side", true), "bottom");
        assert_eq!(next_view("bottom", true), "bottom");
        assert_eq!(next_view("bottom", false), "side");
        assert_eq!(next_view("side", false), "top");
        assert_eq!(next_view("top", false), "top");
    }

    #[test]
    fn test_touch_translation() {
        let e = PointerEvent::from_touch(TouchKind::Cancel, 1.0, 2.0);
        assert_eq!(e.kind, PointerKind::Leave);
        assert_eq!(e.target, PointerTarget::Root);
        assert_eq!(PointerEvent::from_touch(TouchKind::Start, 0.0, 0.0).kind, PointerKind::Down);
    }
}
