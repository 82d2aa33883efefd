//! Rendering adapter for one media node.
//!
//! # Responsibility
//! - Drive the `Idle -> Resizing -> Idle` machine from pointer events.
//! - Apply live frames to the visual surface without touching the document.
//! - Commit the final size as one attribute-replacing transaction.
//!
//! # Invariants
//! - Pointer-move never mutates the document.
//! - A failed live update restores the pre-gesture size and commits nothing.
//! - A node that disappeared mid-gesture makes the commit a silent no-op.

use crate::document::{Dimension, DocumentEditor, EditError, NodeId};
use crate::media::geometry::{resolve_resize, Corner, ResizeFrame, ResizeGesture};
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("media element is no longer attached")]
    Detached,
    #[error("failed to measure media element: {0}")]
    Measure(String),
    #[error("failed to render media element: {0}")]
    Render(String),
}

/// Visual element the node view draws into.
pub trait MediaSurface {
    /// Current rendered size.
    fn measure(&self) -> Result<(f64, f64), SurfaceError>;
    /// Applies a live frame (size plus origin shift).
    fn apply_frame(&mut self, frame: &ResizeFrame) -> Result<(), SurfaceError>;
    /// Renders at `width` x `height` with no origin shift.
    fn restore(&mut self, width: f64, height: f64) -> Result<(), SurfaceError>;
}

/// How a gesture ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEnd {
    Committed { width: f64, height: f64 },
    /// The node was gone at commit time.
    Skipped,
    /// The gesture failed and was rolled back.
    Abandoned,
    NotResizing,
}

#[derive(Debug, Clone, Copy)]
enum ViewState {
    Idle,
    Resizing {
        gesture: ResizeGesture,
        last: ResizeFrame,
    },
}

pub struct MediaNodeView<S: MediaSurface> {
    node_id: NodeId,
    surface: S,
    state: ViewState,
}

impl<S: MediaSurface> MediaNodeView<S> {
    pub fn new(node_id: NodeId, surface: S) -> Self {
        Self {
            node_id,
            surface,
            state: ViewState::Idle,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.state, ViewState::Resizing { .. })
    }

    /// Starts a gesture on `corner`. Returns whether resizing began.
    pub fn pointer_down(&mut self, corner: Corner, x: f64, y: f64) -> bool {
        if self.is_resizing() {
            return false;
        }
        let measured = self.surface.measure();
        let gesture = match measured {
            Ok((width, height)) => ResizeGesture::begin(corner, x, y, width, height)
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match gesture {
            Ok(gesture) => {
                debug!(
                    "event=media_resize module=media status=start corner={} width={} height={}",
                    corner.as_str(),
                    gesture.start_width,
                    gesture.start_height
                );
                self.state = ViewState::Resizing {
                    gesture,
                    last: gesture.initial_frame(),
                };
                true
            }
            Err(err) => {
                warn!(
                    "event=media_resize module=media status=error phase=begin error={}",
                    err
                );
                false
            }
        }
    }

    /// Applies the frame for the new pointer position to the surface.
    ///
    /// Returns the applied frame, or `None` when idle or when the gesture
    /// had to be abandoned.
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<ResizeFrame> {
        let ViewState::Resizing { gesture, .. } = self.state else {
            return None;
        };
        let applied = resolve_resize(&gesture, x, y)
            .map_err(|err| err.to_string())
            .and_then(|frame| {
                self.surface
                    .apply_frame(&frame)
                    .map(|()| frame)
                    .map_err(|err| err.to_string())
            });
        match applied {
            Ok(frame) => {
                self.state = ViewState::Resizing {
                    gesture,
                    last: frame,
                };
                Some(frame)
            }
            Err(err) => {
                warn!(
                    "event=media_resize module=media status=error phase=move error={}",
                    err
                );
                self.abandon(gesture);
                None
            }
        }
    }

    /// Ends the gesture and commits the last frame into `editor`.
    ///
    /// The committed size is snapped to attribute precision; the surface
    /// settles at that same size.
    pub fn pointer_up(&mut self, editor: &mut DocumentEditor) -> GestureEnd {
        let ViewState::Resizing { gesture, last } = std::mem::replace(&mut self.state, ViewState::Idle)
        else {
            return GestureEnd::NotResizing;
        };

        let Some(attrs) = editor.media_attrs(self.node_id) else {
            debug!("event=media_resize module=media status=skip reason=node_missing");
            return GestureEnd::Skipped;
        };
        let width = Dimension::snap_px(last.width);
        let height = Dimension::snap_px(last.height);
        let next = attrs.resized(width, height);
        match editor.replace_media_attrs(self.node_id, next) {
            Ok(()) => {
                if let Err(err) = self.surface.restore(width, height) {
                    warn!(
                        "event=media_resize module=media status=error phase=settle error={}",
                        err
                    );
                }
                info!(
                    "event=media_resize module=media status=ok width={} height={} version={}",
                    width,
                    height,
                    editor.version()
                );
                GestureEnd::Committed { width, height }
            }
            Err(EditError::NodeNotFound(_)) => {
                debug!("event=media_resize module=media status=skip reason=node_missing");
                GestureEnd::Skipped
            }
            Err(err) => {
                warn!(
                    "event=media_resize module=media status=error phase=commit error={}",
                    err
                );
                self.abandon(gesture);
                GestureEnd::Abandoned
            }
        }
    }

    /// Abandons an in-flight gesture, restoring the starting size.
    pub fn cancel(&mut self) {
        if let ViewState::Resizing { gesture, .. } = self.state {
            self.abandon(gesture);
        }
    }

    fn abandon(&mut self, gesture: ResizeGesture) {
        self.state = ViewState::Idle;
        if let Err(err) = self
            .surface
            .restore(gesture.start_width, gesture.start_height)
        {
            warn!(
                "event=media_resize module=media status=error phase=restore error={}",
                err
            );
        }
    }
}
