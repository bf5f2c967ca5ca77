//! Base-surface render lifecycle per page
//!
//! Each request for a page supersedes the page's previous one. A completion is only
//! committed when it belongs to the page's latest request; cancellations are silent and
//! failures are logged every time but shown to the user once.

use crate::page::{PageRasterizer, RenderError, Viewport};
use log::{debug, error, trace};
use pdf_annotator_core::{Notification, Notifier};
use pdf_annotator_scheduler::{CancellationToken, Generation, PageGenerations, RenderJob};
use std::collections::HashMap;

pub const RENDER_FAILED_MESSAGE: &str = "Some pages could not be rendered.";

/// Proof of a started render, handed back on completion
#[derive(Debug, Clone)]
pub struct RenderTicket {
    job: RenderJob,
    viewport: Viewport,
}

impl RenderTicket {
    pub fn page_index(&self) -> u32 {
        self.job.page_index
    }

    pub fn generation(&self) -> Generation {
        self.job.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.job.token
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The raster is now the page's base surface
    Committed,

    /// A newer request for the page exists; the result was dropped
    Superseded,

    Cancelled,

    Failed,
}

/// Owns the committed base surface of every page
pub struct PageRenderController<T> {
    generations: PageGenerations,
    surfaces: HashMap<u32, T>,
    failure_reported: bool,
}

impl<T> Default for PageRenderController<T> {
    fn default() -> Self {
        Self { generations: PageGenerations::new(), surfaces: HashMap::new(), failure_reported: false }
    }
}

impl<T> PageRenderController<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render of `page_index`, cancelling the page's in-flight one
    pub fn request(&mut self, page_index: u32, viewport: Viewport) -> RenderTicket {
        let job = self.generations.begin(page_index);
        trace!("page {page_index}: render {} requested at scale {}", job.generation, viewport.scale);
        RenderTicket { job, viewport }
    }

    /// Accept the result of a render started with [`request`](Self::request)
    pub fn complete<N: Notifier + ?Sized>(
        &mut self,
        ticket: RenderTicket,
        result: Result<T, RenderError>,
        notifier: &N,
    ) -> RenderOutcome {
        let page_index = ticket.page_index();
        let current = self.generations.finish(&ticket.job);

        match result {
            Err(RenderError::Cancelled) => {
                trace!("page {page_index}: render {} cancelled", ticket.generation());
                RenderOutcome::Cancelled
            }
            _ if !current => {
                debug!("page {page_index}: dropping superseded render {}", ticket.generation());
                RenderOutcome::Superseded
            }
            Ok(raster) => {
                self.surfaces.insert(page_index, raster);
                RenderOutcome::Committed
            }
            Err(err) => {
                error!("page {page_index}: render failed: {err}");
                if !self.failure_reported {
                    self.failure_reported = true;
                    notifier.notify(Notification::error(RENDER_FAILED_MESSAGE));
                }
                RenderOutcome::Failed
            }
        }
    }

    /// Request, rasterize and complete a page in one call
    pub fn render<R, N>(
        &mut self,
        rasterizer: &R,
        page_index: u32,
        scale: f32,
        notifier: &N,
    ) -> RenderOutcome
    where
        R: PageRasterizer<Raster = T> + ?Sized,
        N: Notifier + ?Sized,
    {
        let size = match rasterizer.page_size(page_index) {
            Ok(size) => size,
            Err(err) => {
                let ticket = self.request(page_index, Viewport { width: 0.0, height: 0.0, scale });
                return self.complete(ticket, Err(err), notifier);
            }
        };
        let ticket = self.request(page_index, Viewport::for_page(size, scale));
        let result = rasterizer.rasterize(page_index, ticket.viewport(), ticket.token());
        self.complete(ticket, result, notifier)
    }

    /// Committed base surface of a page
    pub fn surface(&self, page_index: u32) -> Option<&T> {
        self.surfaces.get(&page_index)
    }

    /// Drop every committed surface, e.g. after a zoom change
    pub fn invalidate_all(&mut self) {
        self.surfaces.clear();
    }

    /// Cancel every in-flight render; their completions will be discarded
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.generations.cancel_all();
        if cancelled > 0 {
            debug!("cancelled {cancelled} in-flight page renders");
        }
        cancelled
    }

    pub fn in_flight(&self) -> usize {
        self.generations.in_flight()
    }
}
