//! Messages posted to a configurator's inbox.
//!
//! Worker jobs and bus subscribers never touch widget state directly; they
//! send one of these and the UI thread applies it in `Configurator::pump`.

use crossbeam_channel::{Receiver, Sender, unbounded};
use image::RgbaImage;
use std::collections::BTreeMap;

use crate::core::frame_cache::Completion;
use crate::entities::{FrameTable, PartSelection, ProductMeta};
use crate::services::FetchError;

/// Events forwarded from the owning product model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    Parts(BTreeMap<String, PartSelection>),
    Selected(String),
    Deselected(String),
}

#[derive(Debug)]
pub enum Message {
    /// Frame or mask fetch settled
    Fetched(Completion),
    /// Single-part highlight mask fetched
    Overlay {
        url: String,
        part: String,
        result: Result<RgbaImage, FetchError>,
    },
    FrameTable(Result<FrameTable, FetchError>),
    ProductMeta(Result<ProductMeta, FetchError>),
    Upstream(Upstream),
}

pub type InboxSender = Sender<Message>;
pub type InboxReceiver = Receiver<Message>;

pub fn inbox() -> (InboxSender, InboxReceiver) {
    unbounded()
}

/// Drain everything currently queued without blocking
pub fn drain(rx: &InboxReceiver) -> Vec<Message> {
    rx.try_iter().collect()
}
