//! Composition root for one open document
//!
//! Wires pointer input through the drawing engine and history, tracks which page
//! overlays need repainting, drives base-page renders and saves committed states.

use crate::config::{ConfigError, ViewerConfig};
use crate::summary::{NoSummarizer, Summarizer, SummaryError};
use log::{debug, info, warn};
use pdf_annotator_core::{
    Annotation, AnnotationError, AnnotationId, DocumentRecord, DocumentScope, DocumentStore,
    DrawingEngine, EngineResponse, HighlightArea, Notifier, PersistenceAdapter, SaveMode,
    SaveStatus, ScreenPoint, TextPrompt, Tool,
};
use pdf_annotator_render::{
    Compositor, PageRasterizer, PageRenderController, RenderError, RenderOutcome, RenderStyle,
    RenderTicket, Surface, Viewport,
};
use std::collections::BTreeSet;

pub struct Viewer<R: PageRasterizer, S: DocumentStore, N: Notifier> {
    config: ViewerConfig,
    engine: DrawingEngine,
    compositor: Compositor,
    rasterizer: R,
    renders: PageRenderController<R::Raster>,
    persistence: PersistenceAdapter<S, N>,
    summarizer: Box<dyn Summarizer>,

    /// Pages whose overlay must be repainted
    dirty: BTreeSet<u32>,

    closed: bool,
}

impl<R: PageRasterizer, S: DocumentStore, N: Notifier> Viewer<R, S, N> {
    /// Open `document`, loading its stored annotations defensively
    pub fn open(
        config: ViewerConfig,
        scope: DocumentScope,
        document: DocumentRecord,
        rasterizer: R,
        store: S,
        notifier: N,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let annotations = document.load_annotations();
        info!(
            "opening {} ({} pages, {} annotations)",
            document.id,
            rasterizer.page_count(),
            annotations.len()
        );
        if let Some(url) = &config.worker_url {
            debug!("render worker at {url}");
        }

        let mut engine = DrawingEngine::new(config.engine.clone(), annotations);
        engine.set_zoom(config.initial_zoom);
        for page_index in 0..rasterizer.page_count() {
            if let Ok(size) = rasterizer.page_size(page_index) {
                engine.set_page_size(page_index, size);
            }
        }

        let compositor = Compositor::new(RenderStyle {
            marker_width: config.engine.marker_width,
            marker_alpha: config.engine.marker_alpha,
            ..config.style.clone()
        });

        let dirty = (0..rasterizer.page_count()).collect();

        Ok(Self {
            engine,
            compositor,
            rasterizer,
            renders: PageRenderController::new(),
            persistence: PersistenceAdapter::new(scope, document, store, notifier),
            summarizer: Box::new(NoSummarizer),
            dirty,
            closed: false,
            config,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn engine(&self) -> &DrawingEngine {
        &self.engine
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.engine.annotations()
    }

    /// The document as last loaded or saved
    pub fn document(&self) -> &DocumentRecord {
        self.persistence.document()
    }

    pub fn store(&self) -> &S {
        self.persistence.store()
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    pub fn page_count(&self) -> u32 {
        self.rasterizer.page_count()
    }

    pub fn zoom(&self) -> f32 {
        self.engine.zoom()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_text_prompt(&mut self, prompt: impl TextPrompt + 'static) {
        self.engine.set_text_prompt(prompt);
    }

    pub fn pointer_down(&mut self, page_index: u32, position: ScreenPoint) -> EngineResponse {
        let response = self.engine.pointer_down(page_index, position);
        self.apply(response)
    }

    pub fn pointer_move(&mut self, position: ScreenPoint) -> EngineResponse {
        let response = self.engine.pointer_move(position);
        self.apply(response)
    }

    pub fn pointer_up(&mut self) -> EngineResponse {
        let response = self.engine.pointer_up();
        self.apply(response)
    }

    pub fn set_tool(&mut self, tool: Tool) -> EngineResponse {
        let response = self.engine.set_tool(tool);
        self.apply(response)
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.engine.set_color(color);
    }

    pub fn undo(&mut self) -> EngineResponse {
        let response = self.engine.undo();
        self.apply(response)
    }

    pub fn redo(&mut self) -> EngineResponse {
        let response = self.engine.redo();
        self.apply(response)
    }

    pub fn delete_selected(&mut self) -> EngineResponse {
        let response = self.engine.delete_selected();
        self.apply(response)
    }

    pub fn clear_selection(&mut self) -> EngineResponse {
        let response = self.engine.clear_selection();
        self.apply(response)
    }

    pub fn remove(&mut self, id: &AnnotationId) -> EngineResponse {
        let response = self.engine.remove(id);
        self.apply(response)
    }

    pub fn add_highlight(
        &mut self,
        page_index: u32,
        areas: Vec<HighlightArea>,
        text: Option<String>,
    ) -> Result<AnnotationId, AnnotationError> {
        let (id, response) = self.engine.add_highlight(page_index, areas, text)?;
        self.apply(response);
        Ok(id)
    }

    pub fn update_comment(&mut self, id: &AnnotationId, comment: &str) -> EngineResponse {
        let response = self.engine.update_comment(id, comment);
        self.apply(response)
    }

    /// Annotations listed in the comments sidebar
    pub fn comments(&self) -> Vec<&Annotation> {
        self.engine.annotations_with_content()
    }

    pub fn set_summarizer(&mut self, summarizer: impl Summarizer + 'static) {
        self.summarizer = Box::new(summarizer);
    }

    /// Summarize the text selected under annotation `id`
    pub fn summarize(&mut self, id: &AnnotationId) -> Result<String, SummaryError> {
        let annotation =
            self.engine.find(id).ok_or_else(|| SummaryError::NotFound(id.to_string()))?;
        let text = annotation.content_text().ok_or_else(|| SummaryError::NoContent(id.to_string()))?;

        match self.summarizer.summarize(text) {
            Ok(summary) => Ok(summary.trim().to_owned()),
            Err(err) => {
                warn!("summary of {id} failed: {err}");
                Err(err)
            }
        }
    }

    /// Save the current state on user request
    pub fn save(&mut self) -> SaveStatus {
        self.persistence.save(self.engine.snapshot(), SaveMode::Explicit)
    }

    /// Change zoom within the configured bounds; every page needs repainting and
    /// re-rendering afterwards. Returns the zoom in effect.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            return self.zoom();
        }

        let zoom = self.config.clamp_zoom(zoom);
        if zoom != self.zoom() && self.engine.set_zoom(zoom) {
            debug!("zoom -> {zoom}");
            let pages = self.page_count();
            self.renders.invalidate_all();
            self.dirty.extend(0..pages);
        }
        self.zoom()
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_zoom(self.zoom() + self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_zoom(self.zoom() - self.config.zoom_step)
    }

    /// Take the set of pages whose overlay must be repainted
    pub fn dirty_pages(&mut self) -> BTreeSet<u32> {
        std::mem::take(&mut self.dirty)
    }

    /// Repaint the overlay of one page
    pub fn paint<T: Surface + ?Sized>(&self, page_index: u32, surface: &mut T) {
        self.compositor.paint_page(
            surface,
            self.engine.annotations(),
            page_index,
            self.engine.zoom(),
            self.engine.selected(),
            self.engine.page_size(page_index),
        );
    }

    /// Start a base render of `page_index` at the current zoom.
    ///
    /// The caller rasterizes with the ticket's viewport and token, then hands the result
    /// to [`finish_render`](Self::finish_render).
    pub fn begin_render(&mut self, page_index: u32) -> Result<RenderTicket, RenderError> {
        if self.closed {
            return Err(RenderError::Cancelled);
        }
        let size = self.rasterizer.page_size(page_index)?;
        Ok(self.renders.request(page_index, Viewport::for_page(size, self.zoom())))
    }

    pub fn finish_render(
        &mut self,
        ticket: RenderTicket,
        result: Result<R::Raster, RenderError>,
    ) -> RenderOutcome {
        self.renders.complete(ticket, result, self.persistence.notifier())
    }

    /// Render a page's base surface synchronously
    pub fn render_page(&mut self, page_index: u32) -> RenderOutcome {
        if self.closed {
            return RenderOutcome::Cancelled;
        }
        let zoom = self.zoom();
        self.renders.render(&self.rasterizer, page_index, zoom, self.persistence.notifier())
    }

    pub fn base_surface(&self, page_index: u32) -> Option<&R::Raster> {
        self.renders.surface(page_index)
    }

    /// Stop rendering; in-flight renders are cancelled and their results discarded
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.renders.cancel_all();
        info!("closed {}", self.persistence.document().id);
    }

    fn apply(&mut self, response: EngineResponse) -> EngineResponse {
        self.dirty.extend(response.dirty_pages.iter().copied());
        if self.config.autosave && response.needs_save() {
            self.persistence.save(self.engine.snapshot(), SaveMode::Auto);
        }
        response
    }
}
