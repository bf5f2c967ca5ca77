//! Pointer-driven drawing engine
//!
//! Turns pointer events on a page into annotation edits according to the active tool.
//! Pointer positions arrive in screen space and are divided by the current zoom before
//! anything is stored, so zoom stays a pure view-time transform.
//!
//! A gesture (pointer-down, optional moves, pointer-up) is one history entry. The
//! annotation being drawn is appended to the working set on pointer-down and mutated in
//! place until pointer-up; finished states are handed to [`History`] as snapshots and
//! never mutated afterwards.

use crate::annotation::{
    Annotation, AnnotationError, AnnotationId, AnnotationKind, DocPoint, HighlightArea,
    HighlightContent, ScreenPoint, ShapeKind, DEFAULT_HIGHLIGHT_COLOR,
};
use crate::config::EngineConfig;
use crate::geometry::{topmost_hit, PageSize};
use crate::history::{History, Snapshot};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Interaction mode selecting what a pointer-down does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Marker,
    Square,
    Circle,
    Triangle,
    Check,
    Cross,
    Text,
    Eraser,
}

/// Gesture state of the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Idle,

    /// A new shape or stroke is being stretched
    Drawing { id: AnnotationId, page_index: u32 },

    /// The selected annotation is being dragged; `anchor` is the last pointer position
    Moving { id: AnnotationId, page_index: u32, anchor: DocPoint },
}

/// Source of text content for the text tool
pub trait TextPrompt {
    /// Ask for the text to place at `at`; `None` cancels
    fn prompt(&mut self, page_index: u32, at: DocPoint) -> Option<String>;
}

impl<F> TextPrompt for F
where
    F: FnMut(u32, DocPoint) -> Option<String>,
{
    fn prompt(&mut self, page_index: u32, at: DocPoint) -> Option<String> {
        self(page_index, at)
    }
}

/// Prompt that always cancels; the default until a real one is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextPrompt;

impl TextPrompt for NoTextPrompt {
    fn prompt(&mut self, _page_index: u32, _at: DocPoint) -> Option<String> {
        None
    }
}

/// What an engine operation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResponse {
    /// Pages whose overlay must be repainted
    pub dirty_pages: BTreeSet<u32>,

    /// A new history entry was pushed
    pub committed: bool,

    /// Undo or redo replaced the working set
    pub history_moved: bool,
}

impl EngineResponse {
    fn repaint(page_index: u32) -> Self {
        Self::repaint_pages(BTreeSet::from([page_index]))
    }

    fn repaint_pages(dirty_pages: BTreeSet<u32>) -> Self {
        Self { dirty_pages, ..Self::default() }
    }

    pub fn merge(&mut self, other: EngineResponse) {
        self.dirty_pages.extend(other.dirty_pages);
        self.committed |= other.committed;
        self.history_moved |= other.history_moved;
    }

    /// Whether the annotation set differs from what was last handed to storage
    pub fn needs_save(&self) -> bool {
        self.committed || self.history_moved
    }

    pub fn is_empty(&self) -> bool {
        self.dirty_pages.is_empty() && !self.committed && !self.history_moved
    }
}

/// New list with `annotation` appended on top of the z-order
pub fn with_added(annotations: &[Annotation], annotation: Annotation) -> Vec<Annotation> {
    let mut updated = Vec::with_capacity(annotations.len() + 1);
    updated.extend_from_slice(annotations);
    updated.push(annotation);
    updated
}

/// New list without the annotation `id`
pub fn without(annotations: &[Annotation], id: &AnnotationId) -> Vec<Annotation> {
    annotations.iter().filter(|a| a.id() != id).cloned().collect()
}

/// New list with the annotation sharing `annotation`'s id swapped in at the same position
pub fn with_replaced(annotations: &[Annotation], annotation: Annotation) -> Vec<Annotation> {
    annotations
        .iter()
        .map(|a| if a.id() == annotation.id() { annotation.clone() } else { a.clone() })
        .collect()
}

/// Pages whose annotation subsets differ between two lists
fn changed_pages(before: &[Annotation], after: &[Annotation]) -> BTreeSet<u32> {
    let pages: BTreeSet<u32> = before.iter().chain(after).flat_map(Annotation::pages).collect();
    pages
        .into_iter()
        .filter(|page| {
            let old = before.iter().filter(|a| a.is_on_page(*page));
            let new = after.iter().filter(|a| a.is_on_page(*page));
            !old.eq(new)
        })
        .collect()
}

/// Pointer-event state machine over a document's annotation set
pub struct DrawingEngine {
    config: EngineConfig,

    /// Working set, including an in-progress annotation while drawing
    annotations: Vec<Annotation>,

    history: History,

    selected: Option<AnnotationId>,

    tool: Tool,

    zoom: f32,

    /// Color given to newly drawn annotations
    color: String,

    state: EngineState,

    /// Unscaled page sizes, needed to hit test highlights
    page_sizes: HashMap<u32, PageSize>,

    prompt: Box<dyn TextPrompt>,
}

impl DrawingEngine {
    /// Create an engine over a loaded annotation set; the set becomes the first
    /// history entry
    pub fn new(config: EngineConfig, annotations: Vec<Annotation>) -> Self {
        let color = config.default_color.clone();
        Self {
            history: History::new(annotations.clone()),
            annotations,
            config,
            selected: None,
            tool: Tool::default(),
            zoom: 1.0,
            color,
            state: EngineState::Idle,
            page_sizes: HashMap::new(),
            prompt: Box::new(NoTextPrompt),
        }
    }

    pub fn set_text_prompt(&mut self, prompt: impl TextPrompt + 'static) {
        self.prompt = Box::new(prompt);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current working set in z-order
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations of one page in z-order
    pub fn page_annotations(&self, page_index: u32) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations.iter().filter(move |a| a.is_on_page(page_index))
    }

    pub fn find(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == id)
    }

    /// Last committed snapshot
    pub fn snapshot(&self) -> &Snapshot {
        self.history.current()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn selected(&self) -> Option<&AnnotationId> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, id: &AnnotationId) -> bool {
        self.selected.as_ref() == Some(id)
    }

    pub fn page_size(&self, page_index: u32) -> Option<PageSize> {
        self.page_sizes.get(&page_index).copied()
    }

    pub fn set_page_size(&mut self, page_index: u32, size: PageSize) {
        self.page_sizes.insert(page_index, size);
    }

    /// Change the view zoom; rejects non-positive or non-finite values
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        if !zoom.is_finite() || zoom <= 0.0 {
            return false;
        }
        self.zoom = zoom;
        true
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    /// Switch tools, finishing any gesture in progress and dropping the selection
    pub fn set_tool(&mut self, tool: Tool) -> EngineResponse {
        let mut response = self.finish_gesture();
        if tool != self.tool {
            debug!("tool {:?} -> {:?}", self.tool, tool);
            self.tool = tool;
            response.merge(self.clear_selection());
        }
        response
    }

    pub fn pointer_down(&mut self, page_index: u32, position: ScreenPoint) -> EngineResponse {
        // A lost pointer-up must not leave the previous gesture open
        let mut response = self.finish_gesture();
        let point = position.to_document(self.zoom);

        let action = match self.tool {
            Tool::Select => self.begin_move(page_index, point),
            Tool::Eraser => self.erase_at(page_index, point),
            Tool::Marker => {
                self.begin_drawing(page_index, AnnotationKind::Freehand { path: vec![point] })
            }
            Tool::Square => self.begin_shape(page_index, ShapeKind::Square, point),
            Tool::Circle => self.begin_shape(page_index, ShapeKind::Circle, point),
            Tool::Triangle => self.begin_shape(page_index, ShapeKind::Triangle, point),
            Tool::Check => self.place_stamp(page_index, ShapeKind::Check, point),
            Tool::Cross => self.place_stamp(page_index, ShapeKind::Cross, point),
            Tool::Text => self.place_text(page_index, point),
        };

        response.merge(action);
        response
    }

    pub fn pointer_move(&mut self, position: ScreenPoint) -> EngineResponse {
        let point = position.to_document(self.zoom);

        match self.state.clone() {
            EngineState::Idle => EngineResponse::default(),
            EngineState::Drawing { id, page_index } => {
                let Some(annotation) = self.annotations.iter_mut().find(|a| *a.id() == id) else {
                    return EngineResponse::default();
                };
                match annotation.kind_mut() {
                    AnnotationKind::Freehand { path } => {
                        if path.last() != Some(&point) {
                            path.push(point);
                        }
                    }
                    AnnotationKind::Shape { x, y, width, height, .. } => {
                        // Signed, so shapes can be dragged out in any direction
                        *width = point.x - *x;
                        *height = point.y - *y;
                    }
                    AnnotationKind::Text { .. } | AnnotationKind::Highlight { .. } => {}
                }
                EngineResponse::repaint(page_index)
            }
            EngineState::Moving { id, page_index, anchor } => {
                let dx = point.x - anchor.x;
                let dy = point.y - anchor.y;
                if let Some(moved) = self.find(&id).map(|a| a.translated(dx, dy)) {
                    self.annotations = with_replaced(&self.annotations, moved);
                }
                self.state = EngineState::Moving { id, page_index, anchor: point };
                EngineResponse::repaint(page_index)
            }
        }
    }

    pub fn pointer_up(&mut self) -> EngineResponse {
        self.finish_gesture()
    }

    pub fn undo(&mut self) -> EngineResponse {
        let mut response = self.finish_gesture();
        if self.history.undo() {
            response.merge(self.restore_current());
        }
        response
    }

    pub fn redo(&mut self) -> EngineResponse {
        let mut response = self.finish_gesture();
        if self.history.redo() {
            response.merge(self.restore_current());
        }
        response
    }

    pub fn clear_selection(&mut self) -> EngineResponse {
        match self.selected.take() {
            Some(id) => match self.find(&id) {
                Some(annotation) => EngineResponse::repaint_pages(annotation.pages()),
                None => EngineResponse::default(),
            },
            None => EngineResponse::default(),
        }
    }

    pub fn delete_selected(&mut self) -> EngineResponse {
        match self.selected.clone() {
            Some(id) => self.remove(&id),
            None => EngineResponse::default(),
        }
    }

    /// Remove an annotation and commit the result
    pub fn remove(&mut self, id: &AnnotationId) -> EngineResponse {
        let Some(pages) = self.find(id).map(Annotation::pages) else {
            return EngineResponse::default();
        };

        self.annotations = without(&self.annotations, id);
        if self.is_selected(id) {
            self.selected = None;
        }
        debug!("removed annotation {id} from pages {pages:?}");
        self.commit_pages(pages)
    }

    /// Add a highlight reported by the text-selection capability
    pub fn add_highlight(
        &mut self,
        page_index: u32,
        areas: Vec<HighlightArea>,
        text: Option<String>,
    ) -> Result<(AnnotationId, EngineResponse), AnnotationError> {
        if areas.is_empty() {
            return Err(AnnotationError::NoHighlightAreas);
        }

        let mut response = self.finish_gesture();
        let annotation = Annotation::new(
            AnnotationId::generate(),
            page_index,
            DEFAULT_HIGHLIGHT_COLOR,
            AnnotationKind::Highlight {
                areas,
                comment: String::new(),
                content: text.map(|text| HighlightContent { text }),
            },
        );
        let id = annotation.id().clone();
        let pages = annotation.pages();

        self.annotations = with_added(&self.annotations, annotation);
        response.merge(self.commit_pages(pages));
        Ok((id, response))
    }

    /// Replace the comment of a highlight
    pub fn update_comment(&mut self, id: &AnnotationId, comment: &str) -> EngineResponse {
        let Some(updated) = self.find(id).and_then(|a| a.with_comment(comment)) else {
            return EngineResponse::default();
        };

        let pages = updated.pages();
        self.annotations = with_replaced(&self.annotations, updated);
        self.commit_pages(pages)
    }

    /// Annotations carrying selected text, for the comments listing
    pub fn annotations_with_content(&self) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.content_text().is_some()).collect()
    }

    /// Swap in a freshly loaded annotation set and restart history from it
    pub fn replace_annotations(&mut self, annotations: Vec<Annotation>) -> EngineResponse {
        let dirty_pages = changed_pages(&self.annotations, &annotations);
        self.state = EngineState::Idle;
        self.selected = None;
        self.history.reset(annotations.clone());
        self.annotations = annotations;
        EngineResponse { dirty_pages, ..EngineResponse::default() }
    }

    fn new_annotation(&self, page_index: u32, kind: AnnotationKind) -> Annotation {
        Annotation::new(AnnotationId::generate(), page_index, self.color.clone(), kind)
    }

    fn commit(&mut self, page_index: u32) -> EngineResponse {
        self.commit_pages(BTreeSet::from([page_index]))
    }

    fn commit_pages(&mut self, dirty_pages: BTreeSet<u32>) -> EngineResponse {
        let committed = self.history.commit(self.annotations.clone());
        let mut response = EngineResponse::repaint_pages(dirty_pages);
        response.committed = committed;
        response
    }

    fn restore_current(&mut self) -> EngineResponse {
        let restored = self.history.current().to_vec();
        let dirty_pages = changed_pages(&self.annotations, &restored);
        self.annotations = restored;

        if let Some(id) = self.selected.clone() {
            if self.find(&id).is_none() {
                self.selected = None;
            }
        }

        EngineResponse { dirty_pages, committed: false, history_moved: true }
    }

    fn begin_move(&mut self, page_index: u32, point: DocPoint) -> EngineResponse {
        let hit = topmost_hit(
            &self.annotations,
            page_index,
            &point,
            self.config.hit_margin,
            self.page_size(page_index),
        )
        .map(|a| a.id().clone());

        let Some(id) = hit else {
            return self.clear_selection();
        };

        let mut response = self.clear_selection();
        debug!("selected annotation {id} on page {page_index}");
        self.selected = Some(id.clone());
        self.state = EngineState::Moving { id, page_index, anchor: point };
        response.dirty_pages.insert(page_index);
        response
    }

    fn erase_at(&mut self, page_index: u32, point: DocPoint) -> EngineResponse {
        let hit = topmost_hit(
            &self.annotations,
            page_index,
            &point,
            self.config.hit_margin,
            self.page_size(page_index),
        )
        .map(|a| a.id().clone());

        match hit {
            Some(id) => self.remove(&id),
            None => EngineResponse::default(),
        }
    }

    fn begin_drawing(&mut self, page_index: u32, kind: AnnotationKind) -> EngineResponse {
        let annotation = self.new_annotation(page_index, kind);
        let id = annotation.id().clone();
        debug!("drawing {} {id} on page {page_index}", annotation.type_name());

        self.annotations.push(annotation);
        self.state = EngineState::Drawing { id, page_index };
        EngineResponse::repaint(page_index)
    }

    fn begin_shape(&mut self, page_index: u32, shape: ShapeKind, at: DocPoint) -> EngineResponse {
        self.begin_drawing(
            page_index,
            AnnotationKind::Shape { shape, x: at.x, y: at.y, width: 0.0, height: 0.0 },
        )
    }

    /// Place a fixed-size stamp centered on `at`; there is no drag phase
    fn place_stamp(&mut self, page_index: u32, shape: ShapeKind, at: DocPoint) -> EngineResponse {
        let size = self.config.stamp_size;
        let half = size / 2.0;
        let annotation = self.new_annotation(
            page_index,
            AnnotationKind::Shape { shape, x: at.x - half, y: at.y - half, width: size, height: size },
        );

        self.annotations = with_added(&self.annotations, annotation);
        self.commit(page_index)
    }

    fn place_text(&mut self, page_index: u32, at: DocPoint) -> EngineResponse {
        let text = match self.prompt.prompt(page_index, at) {
            Some(text) if !text.trim().is_empty() => text,
            _ => return EngineResponse::default(),
        };

        let annotation = self.new_annotation(
            page_index,
            AnnotationKind::Text { x: at.x, y: at.y, text, font_size: self.config.default_font_size },
        );

        self.annotations = with_added(&self.annotations, annotation);
        self.commit(page_index)
    }

    /// Close the open gesture, if any, and commit its result.
    ///
    /// Returns to idle first, so a repeated pointer-up finds nothing to commit.
    fn finish_gesture(&mut self) -> EngineResponse {
        match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Idle => EngineResponse::default(),
            EngineState::Drawing { id, page_index } => {
                if self.find(&id).is_some_and(Annotation::is_degenerate) {
                    debug!("discarding empty annotation {id}");
                    self.annotations.retain(|a| *a.id() != id);
                }
                self.commit(page_index)
            }
            EngineState::Moving { page_index, .. } => self.commit(page_index),
        }
    }
}
