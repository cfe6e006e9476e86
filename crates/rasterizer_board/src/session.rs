use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::color::Color;
use crate::compositor::{self, Compositor};
use crate::element::{Element, ElementId, ElementList, Shape};
use crate::export::{self, ExportFormat, BOARD_FILE_EXTENSION, DEFAULT_BOARD_EXPORT_NAME};
use crate::glyph;
use crate::grid::{PixelGrid, BACKGROUND};
use crate::interaction::{Feedback, Interactor, Point, Surface, Tool};
use crate::library::{GlyphLibrary, SnapshotLibrary};
use crate::preview::quantize::PreviewGrid;
use crate::preview::refresh::{RefreshScheduler, RefreshTicket};
use crate::preview::render::Scene;
use crate::preview::{Downsampler, PreviewOutput};
use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::store::KeyValueStore;
use crate::{BoardConfig, BoardError};

/// Editing context for one board.
///
/// Owns the pixel grid, the element list and the interaction state; every mutation goes
/// through here on the caller's thread. Time is passed in with each timer event.
pub struct Session<S> {
    config: BoardConfig,
    grid: PixelGrid,
    elements: ElementList,
    glyphs: GlyphLibrary<S>,
    boards: SnapshotLibrary<S>,
    current_color: Color,
    name: String,
    selected: BTreeSet<(u16, u16)>,
    interactor: Interactor,
    scheduler: RefreshScheduler,
    downsampler: Downsampler,
    preview: PreviewOutput,
    edited: bool,
}

impl<S: KeyValueStore + Clone> Session<S> {
    pub fn new(config: BoardConfig, store: S) -> Self {
        let surface =
            Surface { columns: config.width, rows: config.height, cell_size: config.cell_size };

        Self {
            grid: PixelGrid::new(config.width, config.height),
            elements: ElementList::new(),
            glyphs: GlyphLibrary::open(store.clone()),
            boards: SnapshotLibrary::new(store),
            current_color: Color::WHITE,
            name: String::new(),
            selected: BTreeSet::new(),
            interactor: Interactor::new(surface, config.interaction),
            scheduler: RefreshScheduler::new(config.refresh),
            downsampler: Downsampler::new(config.preview),
            preview: PreviewOutput {
                grid: PreviewGrid::blank(config.width, config.height),
                geometry: None,
            },
            edited: false,
            config,
        }
    }
}

impl<S: KeyValueStore> Session<S> {
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn elements(&self) -> &ElementList {
        &self.elements
    }

    pub fn glyphs(&self) -> &GlyphLibrary<S> {
        &self.glyphs
    }

    pub fn interactor(&self) -> &Interactor {
        &self.interactor
    }

    pub fn preview(&self) -> &PreviewOutput {
        &self.preview
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    pub fn current_color(&self) -> Color {
        self.current_color
    }

    pub fn set_current_color(&mut self, color: Color) {
        self.current_color = color;
    }

    pub fn set_color_hex(&mut self, hex: &str) -> Result<Color, BoardError> {
        let color = Color::parse_hex(hex)?;
        self.current_color = color;
        Ok(color)
    }

    pub fn set_color_channels(&mut self, r: i64, g: i64, b: i64) -> Color {
        self.current_color = Color::from_channels(r, g, b);
        self.current_color
    }

    // Element model.

    /// Appends an element in the current color and recomposites.
    pub fn add_element(&mut self, shape: Shape) -> ElementId {
        let id = self.elements.add(shape, self.current_color);
        self.recomposite();
        id
    }

    /// Replaces an element's contents, keeping its id and paint position.
    pub fn update_element(
        &mut self,
        id: &ElementId,
        shape: Shape,
        color: Option<Color>,
    ) -> Result<(), BoardError> {
        let color = match (color, self.elements.get(id)) {
            (_, None) => return Err(BoardError::NotFound(id.to_string())),
            (Some(color), Some(_)) => color,
            (None, Some(element)) => element.color,
        };
        self.elements.replace(id, shape, color);
        self.recomposite();
        Ok(())
    }

    pub fn remove_element(&mut self, id: &ElementId) -> Option<Element> {
        let removed = self.elements.remove(id)?;
        self.interactor.retain_existing(&self.elements);
        self.recomposite();
        Some(removed)
    }

    /// Redraws the grid from the element list alone.
    pub fn recomposite(&mut self) {
        Compositor::new(&self.glyphs).composite(&self.elements, &mut self.grid);
        self.edited = true;
    }

    // Pointer interaction.

    pub fn set_tool(&mut self, tool: Tool) {
        self.interactor.set_tool(tool);
    }

    pub fn set_text(&mut self, text: &str) {
        self.interactor.set_text(text);
    }

    pub fn pointer_down(&mut self, point: Point) -> Feedback {
        let feedback = self.interactor.pointer_down(point, &self.elements);
        self.after_pointer(&feedback);
        feedback
    }

    pub fn pointer_move(&mut self, point: Point) -> Feedback {
        let feedback = self.interactor.pointer_move(point, &mut self.elements);
        self.after_pointer(&feedback);
        feedback
    }

    pub fn pointer_up(&mut self, point: Point) -> Feedback {
        let feedback = self.interactor.pointer_up(point, &mut self.elements, self.current_color);
        self.after_pointer(&feedback);
        feedback
    }

    fn after_pointer(&mut self, feedback: &Feedback) {
        if feedback.mutates_scene() {
            self.recomposite();
        }
    }

    // Direct cell editing. Coordinates are 0-indexed unless noted.

    /// Paints the selected cells, or just the clicked one when nothing is selected, then
    /// clears the selection. Returns the number of cells that changed.
    pub fn click_cell(&mut self, column: u16, row: u16) -> usize {
        if self.selected.is_empty() {
            self.selected.insert((column, row));
        }
        self.apply_color_to_selection()
    }

    /// Adds or removes a cell from the selection; returns whether it is now selected.
    pub fn toggle_cell(&mut self, column: u16, row: u16) -> bool {
        if column >= self.grid.width() || row >= self.grid.height() {
            return false;
        }
        if self.selected.remove(&(column, row)) {
            return false;
        }
        self.selected.insert((column, row))
    }

    pub fn selected_cells(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.selected.iter().copied()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn apply_color_to_selection(&mut self) -> usize {
        let color = self.current_color;
        self.paint_selection(color)
    }

    /// Resets the selected cells to the background color.
    pub fn clear_selected_cells(&mut self) -> usize {
        self.paint_selection(BACKGROUND)
    }

    /// Paints the inclusive rectangle between two 1-indexed corners, clamped to the grid.
    pub fn fill_region(&mut self, start: (i64, i64), end: (i64, i64)) -> usize {
        let clamp_x = |value: i64| value.clamp(1, i64::from(self.grid.width())) as u16 - 1;
        let clamp_y = |value: i64| value.clamp(1, i64::from(self.grid.height())) as u16 - 1;
        let (x0, x1) = (clamp_x(start.0), clamp_x(end.0));
        let (y0, y1) = (clamp_y(start.1), clamp_y(end.1));

        self.selected.clear();
        for row in y0.min(y1)..=y0.max(y1) {
            for column in x0.min(x1)..=x0.max(x1) {
                self.selected.insert((column, row));
            }
        }
        self.apply_color_to_selection()
    }

    /// Resets every pixel; elements are kept.
    pub fn clear_canvas(&mut self) {
        self.grid.clear();
        self.selected.clear();
        self.edited = true;
    }

    fn paint_selection(&mut self, color: Color) -> usize {
        let cells = std::mem::take(&mut self.selected);
        let changed =
            cells.into_iter().filter(|&(column, row)| self.grid.set(column, row, color)).count();
        if changed > 0 {
            self.edited = true;
        }
        changed
    }

    // Glyphs.

    /// Parses a glyph definition and adds it to the glyph library.
    ///
    /// A glyph the store refuses is still usable for the rest of the session.
    pub fn add_glyph(&mut self, definition: &str, now: DateTime<Utc>) -> Result<String, BoardError> {
        let glyph = glyph::parse(definition)?;
        let character = glyph.character.clone();
        let id = match self.glyphs.add(glyph, now) {
            Ok(id) => id,
            Err(err) => {
                warn!("glyph {character:?} kept for this session only: {err}");
                self.glyphs.records().last().map(|record| record.id.clone()).unwrap_or_default()
            },
        };

        info!("added glyph {character:?} as {id}");
        // Text may resolve differently now; the grid itself is left alone.
        self.edited = true;
        Ok(id)
    }

    /// Stamps a library glyph onto the pixel grid with its top-left at the 1-indexed
    /// `(column, row)`, using the current color. No element is created.
    pub fn stamp_glyph(&mut self, id: &str, column: i64, row: i64) -> Result<(), BoardError> {
        let record = self.glyphs.get(id).ok_or_else(|| BoardError::NotFound(id.to_string()))?;
        compositor::stamp_glyph(&mut self.grid, &record.glyph, column - 1, row - 1, self.current_color);
        self.edited = true;
        Ok(())
    }

    // Preview refresh.

    /// Timer event. Returns `true` when the preview grid was recomputed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if std::mem::take(&mut self.edited) {
            self.scheduler.notify_edit(now);
        }

        match self.scheduler.poll(now) {
            Some(ticket) => {
                let output = self.downsample();
                self.publish(ticket, output)
            },
            None => false,
        }
    }

    /// Recomputes the preview immediately, superseding any refresh in flight.
    pub fn refresh_preview(&mut self, now: Instant) -> &PreviewOutput {
        self.edited = false;
        self.scheduler.cancel_pending();
        let ticket = self.scheduler.dispatch(now);
        let output = self.downsample();
        self.publish(ticket, output);
        &self.preview
    }

    pub fn set_live_preview(&mut self, live: bool) {
        self.scheduler.set_live(live);
    }

    pub fn is_live_preview(&self) -> bool {
        self.scheduler.is_live()
    }

    /// When the next [`Self::tick`] can do work.
    pub fn next_refresh(&self, now: Instant) -> Option<Instant> {
        if self.edited {
            return Some(now);
        }
        self.scheduler.next_deadline(now)
    }

    /// Stops all refresh activity; results still in flight are dropped.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.edited = false;
    }

    fn downsample(&mut self) -> PreviewOutput {
        let scene = Scene { elements: self.elements.as_slice(), glyphs: &self.glyphs };
        self.downsampler.downsample(scene, self.config.width, self.config.height)
    }

    fn publish(&mut self, ticket: RefreshTicket, output: PreviewOutput) -> bool {
        if !self.scheduler.complete(ticket) {
            debug!("discarding superseded preview");
            return false;
        }
        self.preview = output;
        true
    }

    // Snapshots and libraries.

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        Snapshot::capture(&self.grid, &self.elements, &self.name, self.current_color, now)
    }

    /// Replaces the board with `snapshot`: its pixels first, then its elements drawn on top
    /// without clearing. The session is untouched when validation fails.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), BoardError> {
        snapshot.validate(self.config.width, self.config.height)?;
        let mut grid = snapshot.pixel_grid()?;
        let elements = ElementList::from_elements(snapshot.elements.iter().cloned());
        Compositor::new(&self.glyphs).draw_all(&elements, &mut grid);

        self.grid = grid;
        self.elements = elements;
        self.selected.clear();
        self.interactor.cancel();
        if !snapshot.name.trim().is_empty() {
            self.set_name(&snapshot.name);
        }
        if let Some(color) = snapshot.current_color {
            self.current_color = color;
        }
        self.edited = true;

        debug!("applied board {:?} ({} painted)", self.name, self.grid.painted_count());
        Ok(())
    }

    /// Applies a board file and records it in the library. Returns the library id, or
    /// `None` when the board applied but could not be stored.
    pub fn import_snapshot(
        &mut self,
        json: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, BoardError> {
        let snapshot = Snapshot::from_json(json, self.config.width, self.config.height)?;
        self.apply_snapshot(&snapshot)?;

        match self.boards.save(&snapshot, now) {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                warn!("imported board not added to library: {err}");
                Ok(None)
            },
        }
    }

    /// Serializes the board for download, also recording it in the library. Returns the
    /// suggested file name and the JSON text.
    pub fn export_snapshot(&mut self, now: DateTime<Utc>) -> Result<(String, String), BoardError> {
        let snapshot = self.snapshot(now);
        if let Err(err) = self.boards.save(&snapshot, now) {
            warn!("exported board not added to library: {err}");
        }

        let file_name =
            export::export_file_name(&self.name, DEFAULT_BOARD_EXPORT_NAME, BOARD_FILE_EXTENSION, now);
        Ok((file_name, snapshot.to_json_pretty()?))
    }

    /// Pixel export in `format`. Returns the suggested file name and the contents.
    pub fn export(&self, format: ExportFormat, now: DateTime<Utc>) -> (String, String) {
        let file_name =
            export::export_file_name(&self.name, export::DEFAULT_EXPORT_NAME, format.extension(), now);
        (file_name, format.render(&self.grid))
    }

    pub fn save_to_library(&mut self, now: DateTime<Utc>) -> Result<String, BoardError> {
        let id = self.boards.save(&self.snapshot(now), now)?;
        info!("saved board {:?} as {id}", self.name);
        Ok(id)
    }

    pub fn library_entries(&self) -> Result<Vec<SnapshotSummary>, BoardError> {
        self.boards.list()
    }

    /// Saves the current board, then loads library entry `id` in its place.
    pub fn switch_to_library_entry(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), BoardError> {
        if let Err(err) = self.save_to_library(now) {
            warn!("could not save current board before switching: {err}");
        }

        let snapshot = self.boards.load(id, self.config.width, self.config.height)?;
        self.apply_snapshot(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::preview::quantize::{ColorBucket, PreviewCell};
    use crate::store::MemoryStore;

    const RED: Color = Color::new(255, 0, 0);

    fn session() -> Session<MemoryStore> {
        Session::new(BoardConfig::default(), MemoryStore::new())
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    #[test]
    fn elements_recomposite_grid() {
        let mut session = session();
        session.set_current_color(RED);
        let id = session.add_element(Shape::Rectangle { x: 1, y: 1, w: 4, h: 2 });
        assert_eq!(session.grid().painted_count(), 8);

        session
            .update_element(&id, Shape::Rectangle { x: 3, y: 3, w: 2, h: 2 }, Some(Color::WHITE))
            .unwrap();
        assert_eq!(session.grid().painted_count(), 4);
        assert_eq!(session.grid().get(2, 2), Some(Color::WHITE));
        assert_eq!(session.elements().position(&id), Some(0));

        let missing = ElementId::new("circle-99");
        assert!(matches!(
            session.update_element(&missing, Shape::Circle { cx: 1, cy: 1, r: 1 }, None),
            Err(BoardError::NotFound(_))
        ));

        session.remove_element(&id).unwrap();
        assert_eq!(session.grid().painted_count(), 0);
    }

    #[test]
    fn cell_selection_paints_and_clears() {
        let mut session = session();
        session.set_current_color(RED);
        assert_eq!(session.click_cell(0, 0), 1);

        assert!(session.toggle_cell(1, 0));
        assert!(session.toggle_cell(2, 0));
        assert!(!session.toggle_cell(2, 0));
        assert!(!session.toggle_cell(64, 0));
        assert_eq!(session.click_cell(10, 10), 1);
        assert_eq!(session.grid().get(1, 0), Some(RED));
        assert_eq!(session.grid().get(10, 10), Some(BACKGROUND));
        assert_eq!(session.selected_cells().count(), 0);

        session.toggle_cell(0, 0);
        session.toggle_cell(5, 5);
        assert_eq!(session.clear_selected_cells(), 1);
        assert_eq!(session.grid().painted_count(), 1);
        assert_eq!(session.grid().painted_count(), session.grid().scan_painted());
    }

    #[test]
    fn region_fill_is_inclusive_and_clamped() {
        let mut session = session();
        assert_eq!(session.fill_region((3, 2), (1, 1)), 6);
        assert_eq!(session.fill_region((60, 30), (100, -4)), 5 * 30);
        assert_eq!(session.grid().painted_count(), 6 + 150);

        session.clear_canvas();
        assert_eq!(session.grid().painted_count(), 0);
    }

    #[test]
    fn color_inputs() {
        let mut session = session();
        assert_eq!(session.set_color_hex("#0f0").unwrap(), Color::new(0, 255, 0));
        assert!(session.set_color_hex("nope").unwrap_err().is_validation());
        assert_eq!(session.current_color(), Color::new(0, 255, 0));
        assert_eq!(session.set_color_channels(300, -5, 16), Color::new(255, 0, 16));
    }

    #[test]
    fn glyphs_render_in_text_and_stamp_onto_grid() {
        let mut session = session();
        let id = session.add_glyph("T\n{0xE0}\n{0x40}\n{0x40}", at(0)).unwrap();

        session.add_element(Shape::Text { text: "TT?".into(), x: 1, y: 1, font_size: 16.0 });
        assert_eq!(session.grid().painted_count(), 10);
        assert_eq!(session.grid().get(9, 1), Some(Color::WHITE));

        session.clear_canvas();
        session.set_current_color(RED);
        session.stamp_glyph(&id, 63, 32).unwrap();
        assert_eq!(session.grid().get(62, 31), Some(RED));
        assert_eq!(session.grid().painted_count(), 2);
        assert!(matches!(session.stamp_glyph("x-1", 1, 1), Err(BoardError::NotFound(_))));

        assert!(session.add_glyph("T\n{0xZZ}\n{0x40}", at(1)).unwrap_err().is_validation());
    }

    #[test]
    fn adding_a_glyph_keeps_direct_edits() {
        let mut session = session();
        session.click_cell(5, 5);
        session.fill_region((1, 1), (3, 1));
        assert_eq!(session.grid().painted_count(), 4);

        session.add_glyph("A\n{0x80}\n{0x80}", at(0)).unwrap();
        assert_eq!(session.grid().painted_count(), 4);
        assert_eq!(session.grid().get(5, 5), Some(Color::WHITE));
    }

    #[test]
    fn oversized_circle_fills_the_board() {
        let mut session = session();
        session.add_element(Shape::Circle { cx: 10, cy: 10, r: u32::MAX });
        assert_eq!(session.grid().painted_count(), 64 * 32);

        let board = serde_json::json!({
            "grid": { "width": 64, "height": 32 },
            "pixels": vec![vec![serde_json::Value::Null; 64]; 32],
            "elements": [{
                "type": "circle", "id": "circle-1", "cx": 1, "cy": 1,
                "r": 4294967295u64, "color": "#FF0000"
            }],
        });
        let mut imported = self::session();
        imported.import_snapshot(&board.to_string(), at(0)).unwrap();
        assert_eq!(imported.grid().painted_count(), 64 * 32);
        assert_eq!(imported.grid().get(63, 31), Some(RED));
    }

    #[test]
    fn pointer_draw_commits_and_schedules_refresh() {
        let mut session = session();
        session.set_live_preview(false);
        session.set_current_color(RED);
        session.set_tool(Tool::Rectangle);

        let start = Instant::now();
        session.pointer_down(Point::new(0.0, 0.0));
        assert!(!session.pointer_move(Point::new(30.0, 20.0)).mutates_scene());
        let feedback = session.pointer_up(Point::new(40.0, 20.0));
        assert!(matches!(feedback, Feedback::Committed(_)));
        assert_eq!(session.grid().painted_count(), 8);

        assert!(!session.tick(start));
        assert!(!session.tick(start + Duration::from_millis(50)));
        assert!(session.tick(start + Duration::from_millis(100)));
        assert_eq!(session.preview().grid.get(0, 0), Some(PreviewCell::Bucket(ColorBucket::Red)));
        assert!(!session.tick(start + Duration::from_millis(400)));
    }

    #[test]
    fn live_preview_refreshes_periodically() {
        let mut session = session();
        let start = Instant::now();
        assert!(session.tick(start));
        assert!(!session.tick(start + Duration::from_millis(150)));
        assert!(session.tick(start + Duration::from_millis(200)));

        session.shutdown();
        assert!(!session.tick(start + Duration::from_millis(1000)));
        assert_eq!(session.next_refresh(start), None);
    }

    #[test]
    fn mismatched_import_leaves_board_unchanged() {
        let mut session = session();
        session.fill_region((1, 1), (2, 2));
        let before = session.grid().clone();

        let mut other = Session::new(
            BoardConfig { width: 32, ..BoardConfig::default() },
            MemoryStore::new(),
        );
        other.fill_region((1, 1), (32, 32));
        let json = other.snapshot(at(0)).to_json_pretty().unwrap();

        let err = session.import_snapshot(&json, at(1)).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(session.grid(), &before);
        assert!(session.library_entries().unwrap().is_empty());
    }

    #[test]
    fn applied_snapshot_overlays_elements_on_pixels() {
        let mut source = session();
        source.set_name("overlay");
        source.set_current_color(Color::new(0, 0, 255));
        source.add_element(Shape::Rectangle { x: 1, y: 1, w: 2, h: 1 });
        source.fill_region((10, 10), (10, 10));
        let json = source.export_snapshot(at(0)).unwrap().1;

        let mut session = session();
        let id = session.import_snapshot(&json, at(1)).unwrap();
        assert!(id.is_some());
        assert_eq!(session.name(), "overlay");
        assert_eq!(session.current_color(), Color::new(0, 0, 255));
        assert_eq!(session.grid().painted_count(), 3);
        assert_eq!(session.grid().get(9, 9), Some(Color::new(0, 0, 255)));
        assert_eq!(session.elements().len(), 1);
    }

    #[test]
    fn saving_twice_under_one_name_keeps_one_entry() {
        let mut session = session();
        session.set_name("sign");
        let first = session.save_to_library(at(0)).unwrap();
        session.fill_region((1, 1), (4, 4));
        let second = session.save_to_library(at(1)).unwrap();
        assert_eq!(first, second);

        let entries = session.library_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].saved_at, Some(at(1)));
    }

    #[test]
    fn switching_boards_autosaves_current_one() {
        let mut session = session();
        session.set_name("first");
        session.fill_region((1, 1), (2, 1));
        let first = session.save_to_library(at(0)).unwrap();

        session.set_name("second");
        session.clear_canvas();
        session.fill_region((1, 1), (5, 1));
        session.switch_to_library_entry(&first, at(1)).unwrap();
        assert_eq!(session.name(), "first");
        assert_eq!(session.grid().painted_count(), 2);

        let names: Vec<_> =
            session.library_entries().unwrap().into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, ["second", "first"]);
        assert!(matches!(
            session.switch_to_library_entry("board-missing", at(2)),
            Err(BoardError::NotFound(_))
        ));
    }

    #[test]
    fn pixel_export_names_follow_board_name() {
        let mut session = session();
        session.set_name("hello world");
        let (name, contents) = session.export(ExportFormat::SourceArray, at(0));
        assert_eq!(name, "hello_world-2024-01-01T00-00-00-000Z.c");
        assert!(contents.starts_with("const uint32_t FONT_64x32[32][64] = {"));
    }
}
