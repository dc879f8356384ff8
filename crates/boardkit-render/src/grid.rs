//! Constrained-grid surface.
//!
//! Lays items out on a fixed number of columns with a fixed row height. Drags are
//! previewed locally and only proposed to the session when they end.

use crate::renderer::{
    Frame, Placement, PlacementKind, RenderResult, Renderer, RendererError, SurfaceState,
};
use boardkit_core::config::SurfaceConfig;
use boardkit_core::grid::{compact_vertical, layout_bottom, snap_to_cell};
use boardkit_core::widget::{handles_for_rect, hit_test_handle};
use boardkit_core::{
    Board, BindingSnapshot, ComponentDefinition, Diagnostic, Diagnostics, EditorEvent, GridRect,
    HandleKind, InstanceId, InteractionKind, LayoutItem, SurfaceBounds, SurfaceContext,
};
use kurbo::{Point, Rect, Size};
use std::collections::BTreeSet;

/// Pixel distance within which a pointer grabs a resize handle.
pub const HANDLE_HIT_TOLERANCE: f64 = 6.0;

/// A drag in progress.
struct Drag {
    instance_id: InstanceId,
    kind: InteractionKind,
    origin: GridRect,
    preview: GridRect,
    definition: ComponentDefinition,
    bounds: SurfaceBounds,
}

impl Drag {
    /// Preview for a pointer offset of `(dx, dy)` cells from where the drag started.
    fn preview_for(&self, dx: i64, dy: i64) -> GridRect {
        let origin = self.origin;
        match self.kind {
            InteractionKind::Moving => {
                let x = (i64::from(origin.x) + dx).clamp(0, i64::from(u32::MAX)) as u32;
                let y = (i64::from(origin.y) + dy).clamp(0, i64::from(u32::MAX)) as u32;
                self.bounds.clamp_rect(GridRect::new(x, y, origin.w, origin.h))
            }
            InteractionKind::Resizing(handle) => {
                let resized = handle.resize(origin, dx, dy);
                let size = self
                    .bounds
                    .clamp_size(self.definition.clamp_size(resized.size()));
                // Clamping must not move the edge opposite to the handle.
                let x = if handle.moves_left() {
                    origin.right().saturating_sub(size.w)
                } else {
                    resized.x
                };
                let y = if handle.moves_top() {
                    origin.bottom().saturating_sub(size.h)
                } else {
                    resized.y
                };
                self.bounds.clamp_rect(GridRect::new(x, y, size.w, size.h))
            }
        }
    }
}

/// The reference grid surface.
pub struct GridRenderer {
    config: SurfaceConfig,
    state: SurfaceState,
    frame: Frame,
    /// Instances whose bindings this surface activated.
    activated: BTreeSet<InstanceId>,
    drag: Option<Drag>,
    diagnostics: Diagnostics,
}

impl Default for GridRenderer {
    fn default() -> Self {
        Self::new(SurfaceConfig::default())
    }
}

impl GridRenderer {
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            config,
            state: SurfaceState::Uninitialized,
            frame: Frame::default(),
            activated: BTreeSet::new(),
            drag: None,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// The last rendered frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Problems found while activating items since the last `init`.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Pixel width of one column.
    pub fn column_width(&self) -> f64 {
        let columns = f64::from(self.config.columns.max(1));
        ((self.config.width - self.config.margin * (columns + 1.0)) / columns).max(1.0)
    }

    /// Pixel rectangle of a grid rectangle.
    pub fn cell_rect(&self, rect: GridRect) -> Rect {
        let margin = self.config.margin;
        let col = self.column_width();
        let row = self.config.row_height;
        let x0 = margin + f64::from(rect.x) * (col + margin);
        let y0 = margin + f64::from(rect.y) * (row + margin);
        let w = f64::from(rect.w) * col + f64::from(rect.w.saturating_sub(1)) * margin;
        let h = f64::from(rect.h) * row + f64::from(rect.h.saturating_sub(1)) * margin;
        Rect::new(x0, y0, x0 + w, y0 + h)
    }

    /// Convert a pixel offset to whole cells.
    pub fn cells_for_offset(&self, dx: f64, dy: f64) -> (i64, i64) {
        let margin = self.config.margin;
        (
            snap_to_cell(dx / (self.column_width() + margin)),
            snap_to_cell(dy / (self.config.row_height + margin)),
        )
    }

    fn expect_active(&self, operation: &'static str) -> RenderResult<()> {
        if self.state == SurfaceState::Active {
            Ok(())
        } else {
            Err(RendererError::InvalidState {
                from: self.state,
                operation,
            })
        }
    }

    fn teardown_activated(&mut self, ctx: &mut SurfaceContext<'_>) {
        for instance_id in std::mem::take(&mut self.activated) {
            ctx.binder.teardown(&instance_id);
        }
    }

    /// Bring bindings in line with the board: activate ready items the binder does not
    /// hold and tear down what left the board.
    fn reconcile(&mut self, board: &Board, ctx: &mut SurfaceContext<'_>) {
        let stale: Vec<InstanceId> = self
            .activated
            .iter()
            .filter(|id| !board.contains(id))
            .cloned()
            .collect();
        for instance_id in stale {
            ctx.binder.teardown(&instance_id);
            self.activated.remove(&instance_id);
        }

        let registry = ctx.registry;
        for resolved in board.resolve(registry) {
            let Some(definition) = resolved.definition else {
                continue;
            };
            let instance_id = &resolved.item.instance_id;
            if !ctx.binder.is_active(instance_id) {
                log::debug!("Activating bindings for {}", instance_id);
                self.check_config(resolved.item, definition);
                ctx.binder.resolve(resolved.item, definition);
            }
            self.activated.insert(instance_id.clone());
        }
    }

    fn check_config(&mut self, item: &LayoutItem, definition: &ComponentDefinition) {
        let issues = definition.validate_config(item.instance_config());
        if issues.is_empty() {
            return;
        }
        let reason = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        self.diagnostics.report(Diagnostic::InvalidInstanceConfig {
            instance_id: item.instance_id.to_string(),
            reason,
        });
    }

    fn layout(&mut self, board: &Board, ctx: &SurfaceContext<'_>) {
        let resolved = board.resolve(ctx.registry);
        let mut rects: Vec<GridRect> = resolved
            .iter()
            .map(|r| match &self.drag {
                Some(drag) if drag.instance_id == r.item.instance_id => drag.preview,
                _ => r.item.geometry(),
            })
            .collect();
        if self.config.vertical_compact {
            rects = compact_vertical(&rects);
        }

        let mut placements = Vec::with_capacity(resolved.len());
        for (r, grid) in resolved.iter().zip(&rects) {
            let item = r.item;
            let bounds = self.cell_rect(*grid);
            let selected = ctx.widgets.is_selected(&item.instance_id);
            let (kind, config, data) = match r.definition {
                Some(definition) => (
                    PlacementKind::Widget,
                    definition.effective_config(item.instance_config()),
                    ctx.binder.snapshot(&item.instance_id).unwrap_or_default(),
                ),
                None => (
                    PlacementKind::Placeholder,
                    item.instance_config().clone(),
                    BindingSnapshot::new(),
                ),
            };
            let handles = if selected && kind == PlacementKind::Widget {
                handles_for_rect(bounds)
            } else {
                Vec::new()
            };
            placements.push(Placement {
                instance_id: item.instance_id.clone(),
                type_id: item.type_id().to_string(),
                render_id: item.data.render_id.clone(),
                grid: *grid,
                bounds,
                kind,
                selected,
                handles,
                config,
                data,
            });
        }

        let rows = layout_bottom(&rects);
        let height = if rows == 0 {
            0.0
        } else {
            self.config.margin + f64::from(rows) * (self.config.row_height + self.config.margin)
        };
        self.frame = Frame {
            placements,
            size: Size::new(self.config.width, height),
            rows,
        };
    }

    /// Replace the selection with the instances of `instance_ids` that are on the board.
    pub fn select(
        &mut self,
        board: &Board,
        ctx: &mut SurfaceContext<'_>,
        instance_ids: &[InstanceId],
    ) -> RenderResult<()> {
        self.expect_active("select")?;
        ctx.widgets.clear_selection();
        for instance_id in instance_ids.iter().filter(|id| board.contains(id)) {
            ctx.widgets.add_to_selection(instance_id);
        }
        let instance_ids = ctx.widgets.selected();
        ctx.bus.publish(EditorEvent::SelectionChanged { instance_ids });
        Ok(())
    }

    /// Start moving an instance.
    pub fn begin_move(
        &mut self,
        board: &Board,
        ctx: &mut SurfaceContext<'_>,
        instance_id: &InstanceId,
    ) -> RenderResult<()> {
        self.begin(board, ctx, instance_id, InteractionKind::Moving)
    }

    /// Start resizing an instance by one of its handles.
    pub fn begin_resize(
        &mut self,
        board: &Board,
        ctx: &mut SurfaceContext<'_>,
        instance_id: &InstanceId,
        handle: HandleKind,
    ) -> RenderResult<()> {
        self.begin(board, ctx, instance_id, InteractionKind::Resizing(handle))
    }

    fn begin(
        &mut self,
        board: &Board,
        ctx: &mut SurfaceContext<'_>,
        instance_id: &InstanceId,
        kind: InteractionKind,
    ) -> RenderResult<()> {
        self.expect_active("begin a drag")?;
        let item = board
            .item(instance_id)
            .ok_or_else(|| RendererError::NotInteractive(instance_id.clone()))?;
        // Placeholders keep their geometry until their type is registered again.
        let definition = ctx
            .registry
            .get(item.type_id())
            .ok_or_else(|| RendererError::NotInteractive(instance_id.clone()))?;

        if self.drag.is_some() {
            self.cancel_drag(ctx);
        }
        let origin = item.geometry();
        self.drag = Some(Drag {
            instance_id: instance_id.clone(),
            kind,
            origin,
            preview: origin,
            definition: definition.clone(),
            bounds: ctx.bounds,
        });
        ctx.widgets.begin_interaction(instance_id, kind);
        Ok(())
    }

    /// Update the drag preview for a pointer offset of `(dx, dy)` pixels from where the
    /// drag began. Returns the previewed grid rectangle.
    pub fn drag(&mut self, dx: f64, dy: f64) -> RenderResult<GridRect> {
        self.expect_active("drag")?;
        let (cx, cy) = self.cells_for_offset(dx, dy);
        let drag = self.drag.as_mut().ok_or(RendererError::NoInteraction)?;
        drag.preview = drag.preview_for(cx, cy);
        Ok(drag.preview)
    }

    /// Finish the drag and propose its geometry to the session.
    ///
    /// Returns the proposal, or `None` when the preview ended where it started.
    pub fn end_drag(&mut self, ctx: &mut SurfaceContext<'_>) -> RenderResult<Option<GridRect>> {
        self.expect_active("end a drag")?;
        let drag = self.drag.take().ok_or(RendererError::NoInteraction)?;
        ctx.widgets.end_interaction();
        if drag.preview == drag.origin {
            return Ok(None);
        }
        log::debug!(
            "Proposing {}x{} at ({}, {}) for {}",
            drag.preview.w,
            drag.preview.h,
            drag.preview.x,
            drag.preview.y,
            drag.instance_id
        );
        ctx.bus.publish(EditorEvent::GeometryProposed {
            instance_id: drag.instance_id,
            geometry: drag.preview,
        });
        Ok(Some(drag.preview))
    }

    /// Abandon the drag without proposing anything. Returns false if none was running.
    pub fn cancel_drag(&mut self, ctx: &mut SurfaceContext<'_>) -> bool {
        if self.drag.take().is_none() {
            return false;
        }
        ctx.widgets.end_interaction();
        true
    }

    /// Ask the session to remove an instance.
    pub fn request_remove(
        &mut self,
        ctx: &mut SurfaceContext<'_>,
        instance_id: &InstanceId,
    ) -> RenderResult<()> {
        self.expect_active("request removal")?;
        ctx.bus.publish(EditorEvent::RemoveRequested {
            instance_id: instance_id.clone(),
        });
        Ok(())
    }

    /// The resize handle of a selected widget under `point` in the last frame.
    pub fn handle_at(&self, point: Point) -> Option<(&InstanceId, HandleKind)> {
        self.frame.placements.iter().rev().find_map(|p| {
            hit_test_handle(&p.handles, point, HANDLE_HIT_TOLERANCE)
                .map(|kind| (&p.instance_id, kind))
        })
    }
}

impl Renderer for GridRenderer {
    fn name(&self) -> &str {
        "grid"
    }

    fn state(&self) -> SurfaceState {
        self.state
    }

    fn init(&mut self, board: &Board, ctx: &mut SurfaceContext<'_>) -> RenderResult<()> {
        match self.state {
            SurfaceState::Uninitialized => {}
            SurfaceState::Active => {
                log::debug!("Re-initialising grid surface");
                self.cancel_drag(ctx);
                self.teardown_activated(ctx);
            }
            from => {
                return Err(RendererError::InvalidState {
                    from,
                    operation: "init",
                });
            }
        }
        self.frame = Frame::default();
        self.diagnostics = Diagnostics::new();
        self.reconcile(board, ctx);
        self.state = SurfaceState::Active;
        log::info!(
            "Grid surface ready for board {} ({} bound instances)",
            board.id,
            self.activated.len()
        );
        Ok(())
    }

    fn render(&mut self, board: &Board, ctx: &mut SurfaceContext<'_>) -> RenderResult<&Frame> {
        self.expect_active("render")?;
        let dragged_away = self
            .drag
            .as_ref()
            .is_some_and(|drag| !board.contains(&drag.instance_id));
        if dragged_away {
            self.cancel_drag(ctx);
        }
        ctx.widgets.retain(|id| board.contains(id));
        self.reconcile(board, ctx);
        self.layout(board, ctx);
        Ok(&self.frame)
    }

    fn destroy(&mut self, ctx: &mut SurfaceContext<'_>) -> RenderResult<()> {
        if self.state == SurfaceState::Destroyed {
            return Err(RendererError::InvalidState {
                from: self.state,
                operation: "destroy",
            });
        }
        self.cancel_drag(ctx);
        self.teardown_activated(ctx);
        self.frame = Frame::default();
        self.state = SurfaceState::Destroyed;
        Ok(())
    }

    fn sleep(&mut self) -> RenderResult<()> {
        self.expect_active("sleep")?;
        self.state = SurfaceState::Asleep;
        Ok(())
    }

    fn wakeup(&mut self) -> RenderResult<()> {
        if self.state != SurfaceState::Asleep {
            return Err(RendererError::InvalidState {
                from: self.state,
                operation: "wake up",
            });
        }
        self.state = SurfaceState::Active;
        Ok(())
    }
}
