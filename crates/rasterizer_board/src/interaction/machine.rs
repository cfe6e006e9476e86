use log::debug;

use crate::color::Color;
use crate::element::{ElementId, ElementList, Shape};

use super::geometry::{Handle, Point, Surface, SurfaceRect};

/// Side length of a resize handle's hit box, in surface units.
pub const HANDLE_SIZE: f32 = 8.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Circle,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InteractionOptions {
    /// A drawn box must exceed this in both directions to become an element.
    pub min_draw_size: f32,
    /// Floor applied to both dimensions while resizing.
    pub min_resize_size: f32,
}

impl Default for InteractionOptions {
    fn default() -> Self {
        Self { min_draw_size: 5.0, min_resize_size: 10.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Drawing,
    Dragging,
    Resizing,
    Marquee,
}

#[derive(Clone, Debug, PartialEq)]
enum State {
    Idle,
    Drawing { tool: Tool, anchor: Point },
    Dragging { id: ElementId, start: Point, origin: (u32, u32) },
    Resizing { id: ElementId, handle: Handle, start: Point, original: SurfaceRect, font_size: f32 },
    Marquee { anchor: Point },
}

/// What a pointer event did, for the caller to redraw or recomposite.
#[derive(Clone, Debug, PartialEq)]
pub enum Feedback {
    None,
    /// Outline of the shape being drawn; nothing is committed yet.
    DrawPreview { tool: Tool, rect: SurfaceRect },
    /// Element geometry changed mid-gesture.
    Moved(ElementId),
    Resized(ElementId),
    MarqueeRect(SurfaceRect),
    /// A newly drawn element was added.
    Committed(ElementId),
    /// A drag or resize was released; its final geometry is in place.
    Finished(ElementId),
    /// The drawn box was too small and was dropped.
    Discarded,
    SelectionChanged,
}

impl Feedback {
    /// Whether the element list changed and the grid needs recompositing.
    pub fn mutates_scene(&self) -> bool {
        matches!(
            self,
            Feedback::Moved(_) | Feedback::Resized(_) | Feedback::Committed(_) | Feedback::Finished(_)
        )
    }
}

/// Pointer-driven draw, drag, resize and marquee machines.
///
/// At most one gesture is active at a time; events that do not belong to the active
/// gesture are ignored.
#[derive(Debug)]
pub struct Interactor {
    surface: Surface,
    options: InteractionOptions,
    tool: Tool,
    state: State,
    selection: Vec<ElementId>,
    text: String,
}

impl Interactor {
    pub fn new(surface: Surface, options: InteractionOptions) -> Self {
        Self {
            surface,
            options,
            tool: Tool::default(),
            state: State::Idle,
            selection: Vec::new(),
            text: String::from("A"),
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools drops the selection and abandons any gesture in progress.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.cancel();
    }

    /// Text used for elements drawn with the text tool.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn cancel(&mut self) {
        self.state = State::Idle;
        self.selection.clear();
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Drawing { .. } => Phase::Drawing,
            State::Dragging { .. } => Phase::Dragging,
            State::Resizing { .. } => Phase::Resizing,
            State::Marquee { .. } => Phase::Marquee,
        }
    }

    pub fn selection(&self) -> &[ElementId] {
        &self.selection
    }

    pub fn select(&mut self, id: ElementId) {
        self.selection = vec![id];
    }

    /// Drops ids that no longer exist, e.g. after a delete.
    pub fn retain_existing(&mut self, elements: &ElementList) {
        self.selection.retain(|id| elements.get(id).is_some());
        let stale = match &self.state {
            State::Dragging { id, .. } | State::Resizing { id, .. } => elements.get(id).is_none(),
            _ => false,
        };
        if stale {
            self.state = State::Idle;
        }
    }

    /// Hit boxes of the resize handles for the single selected rectangle or text element.
    pub fn handles(&self, elements: &ElementList) -> Vec<(Handle, SurfaceRect)> {
        let [id] = self.selection.as_slice() else {
            return Vec::new();
        };
        let Some(element) = elements.get(id) else {
            return Vec::new();
        };
        if matches!(element.shape, Shape::Circle { .. }) {
            return Vec::new();
        }

        let bounds = self.surface.element_bounds(element);
        Handle::ALL.iter().map(|&handle| (handle, handle.hit_box(&bounds, HANDLE_SIZE))).collect()
    }

    pub fn pointer_down(&mut self, point: Point, elements: &ElementList) -> Feedback {
        if self.state != State::Idle {
            return Feedback::None;
        }

        if self.tool != Tool::Select {
            self.state = State::Drawing { tool: self.tool, anchor: point };
            return Feedback::DrawPreview { tool: self.tool, rect: SurfaceRect::from_corners(point, point) };
        }

        if let Some((handle, id)) = self.handle_at(point, elements) {
            if let Some(element) = elements.get(&id) {
                let original = self.surface.element_bounds(element);
                let font_size = match element.shape {
                    Shape::Text { font_size, .. } => font_size,
                    _ => 0.0,
                };
                debug!("resizing {id} from {handle:?}");
                self.state = State::Resizing { id, handle, start: point, original, font_size };
                return Feedback::None;
            }
        }

        let hit = elements
            .iter()
            .rev()
            .find(|element| self.surface.element_bounds(element).contains(point));
        match hit {
            Some(element) => {
                self.selection = vec![element.id.clone()];
                self.state = State::Dragging {
                    id: element.id.clone(),
                    start: point,
                    origin: element.shape.anchor(),
                };
                Feedback::SelectionChanged
            },
            None => {
                self.selection.clear();
                self.state = State::Marquee { anchor: point };
                Feedback::SelectionChanged
            },
        }
    }

    pub fn pointer_move(&mut self, point: Point, elements: &mut ElementList) -> Feedback {
        match self.state.clone() {
            State::Idle => Feedback::None,
            State::Drawing { tool, anchor } => {
                Feedback::DrawPreview { tool, rect: SurfaceRect::from_corners(anchor, point) }
            },
            State::Dragging { id, start, origin } => {
                if self.drag_to(&id, start, origin, point, elements) {
                    Feedback::Moved(id)
                } else {
                    Feedback::None
                }
            },
            State::Resizing { id, handle, start, original, font_size } => {
                if self.resize_to(&id, handle, start, &original, font_size, point, elements) {
                    Feedback::Resized(id)
                } else {
                    Feedback::None
                }
            },
            State::Marquee { anchor } => Feedback::MarqueeRect(SurfaceRect::from_corners(anchor, point)),
        }
    }

    pub fn pointer_up(&mut self, point: Point, elements: &mut ElementList, color: Color) -> Feedback {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Feedback::None,
            State::Drawing { tool, anchor } => {
                let rect = SurfaceRect::from_corners(anchor, point);
                let min = self.options.min_draw_size;
                if rect.w <= min || rect.h <= min {
                    return Feedback::Discarded;
                }

                let Some(shape) = self.shape_for(tool, &rect) else {
                    return Feedback::Discarded;
                };
                let id = elements.add(shape, color);
                self.selection = vec![id.clone()];
                Feedback::Committed(id)
            },
            State::Dragging { id, start, origin } => {
                self.drag_to(&id, start, origin, point, elements);
                Feedback::Finished(id)
            },
            State::Resizing { id, handle, start, original, font_size } => {
                self.resize_to(&id, handle, start, &original, font_size, point, elements);
                Feedback::Finished(id)
            },
            State::Marquee { anchor } => {
                let rect = SurfaceRect::from_corners(anchor, point);
                let min = self.options.min_draw_size;
                self.selection = if rect.w <= min && rect.h <= min {
                    Vec::new()
                } else {
                    elements
                        .iter()
                        .filter(|element| self.surface.element_bounds(element).intersects(&rect))
                        .map(|element| element.id.clone())
                        .collect()
                };
                Feedback::SelectionChanged
            },
        }
    }

    fn handle_at(&self, point: Point, elements: &ElementList) -> Option<(Handle, ElementId)> {
        let [id] = self.selection.as_slice() else {
            return None;
        };
        self.handles(elements)
            .into_iter()
            .find(|(_, hit_box)| hit_box.contains(point))
            .map(|(handle, _)| (handle, id.clone()))
    }

    fn shape_for(&self, tool: Tool, rect: &SurfaceRect) -> Option<Shape> {
        let surface = &self.surface;
        let shape = match tool {
            Tool::Select => return None,
            Tool::Rectangle => Shape::Rectangle {
                x: surface.cell_at(rect.x),
                y: surface.cell_at(rect.y),
                w: surface.cell_span(rect.w),
                h: surface.cell_span(rect.h),
            },
            Tool::Circle => {
                let center = rect.center();
                let radius = (rect.w.min(rect.h) / 2.0 / surface.cell_size).round().max(0.0);
                Shape::Circle {
                    cx: surface.cell_at(center.x),
                    cy: surface.cell_at(center.y),
                    r: radius as u32,
                }
            },
            Tool::Text => Shape::Text {
                text: self.text.clone(),
                x: surface.cell_at(rect.x),
                y: surface.cell_at(rect.y),
                font_size: rect.h,
            },
        };
        Some(shape)
    }

    /// Moves the element to `origin` plus the pointer delta, snapped to cells and clamped so
    /// the whole shape stays on the grid. Returns whether its position changed.
    fn drag_to(
        &self,
        id: &ElementId,
        start: Point,
        origin: (u32, u32),
        point: Point,
        elements: &mut ElementList,
    ) -> bool {
        let Some(element) = elements.get_mut(id) else {
            return false;
        };

        let cell = self.surface.cell_size;
        let dx = ((point.x - start.x) / cell).round() as i64;
        let dy = ((point.y - start.y) / cell).round() as i64;
        let columns = i64::from(self.surface.columns);
        let rows = i64::from(self.surface.rows);

        let ((min_x, max_x), (min_y, max_y)) = match element.shape {
            Shape::Rectangle { w, h, .. } => {
                ((1, columns - i64::from(w) + 1), (1, rows - i64::from(h) + 1))
            },
            Shape::Circle { r, .. } => {
                let r = i64::from(r);
                ((1 + r, columns - r), (1 + r, rows - r))
            },
            Shape::Text { .. } => {
                let bounds = self.surface.element_bounds(element);
                let w = ((bounds.w / cell).ceil() as i64).max(1);
                let h = ((bounds.h / cell).ceil() as i64).max(1);
                ((1, columns - w + 1), (1, rows - h + 1))
            },
        };

        let x = clamp_axis(i64::from(origin.0) + dx, min_x, max_x);
        let y = clamp_axis(i64::from(origin.1) + dy, min_y, max_y);
        if element.shape.anchor() == (x, y) {
            return false;
        }

        element.shape.set_anchor(x, y);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn resize_to(
        &self,
        id: &ElementId,
        handle: Handle,
        start: Point,
        original: &SurfaceRect,
        original_font_size: f32,
        point: Point,
        elements: &mut ElementList,
    ) -> bool {
        let Some(element) = elements.get_mut(id) else {
            return false;
        };

        let bounds = handle.resize(
            original,
            point.x - start.x,
            point.y - start.y,
            self.options.min_resize_size,
        );
        let surface = &self.surface;

        let resized = match &element.shape {
            Shape::Rectangle { .. } => Shape::Rectangle {
                x: surface.cell_at(bounds.x),
                y: surface.cell_at(bounds.y),
                w: surface.cell_span(bounds.w),
                h: surface.cell_span(bounds.h),
            },
            Shape::Text { text, .. } => {
                let scale_x = bounds.w / original.w.max(f32::EPSILON);
                let scale_y = bounds.h / original.h.max(f32::EPSILON);
                let scale =
                    if (scale_x - 1.0).abs() >= (scale_y - 1.0).abs() { scale_x } else { scale_y };
                Shape::Text {
                    text: text.clone(),
                    x: surface.cell_at(bounds.x),
                    y: surface.cell_at(bounds.y),
                    font_size: (original_font_size * scale).max(1.0),
                }
            },
            Shape::Circle { .. } => return false,
        };

        if element.shape == resized {
            return false;
        }
        element.shape = resized;
        true
    }
}

fn clamp_axis(value: i64, min: i64, max: i64) -> u32 {
    value.clamp(min, max.max(min)).max(0) as u32
}
