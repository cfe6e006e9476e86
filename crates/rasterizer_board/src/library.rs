use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::glyph::{Glyph, GlyphSource};
use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::store::KeyValueStore;
use crate::BoardError;

pub const BOARD_LIBRARY_KEY: &str = "rasterizer-board-library";
pub const FONT_LIBRARY_KEY: &str = "rasterizer-font-library";

/// Named boards persisted under [`BOARD_LIBRARY_KEY`] as one JSON object of id -> snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotLibrary<S> {
    store: S,
}

impl<S: KeyValueStore> SnapshotLibrary<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Stores `snapshot` and returns its library id.
    ///
    /// A snapshot whose trimmed name matches an existing entry overwrites that entry. Other
    /// entries are written back untouched, including ones that no longer parse.
    pub fn save(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<String, BoardError> {
        let mut entries = self.entries()?;

        let name = snapshot.name.trim();
        let existing = (!name.is_empty())
            .then(|| {
                entries.iter().find(|(_, entry)| {
                    entry.get("name").and_then(Value::as_str).map(str::trim) == Some(name)
                })
            })
            .flatten()
            .map(|(id, _)| id.clone());
        let id = existing
            .or_else(|| snapshot.id.clone().filter(|id| !id.is_empty()))
            .unwrap_or_else(|| generate_board_id(now));

        let mut entry = snapshot.clone();
        entry.id = Some(id.clone());
        entry.name = if name.is_empty() {
            format!("Untitled board {}", now.format("%Y-%m-%d %H:%M:%S"))
        } else {
            name.to_string()
        };
        entry.saved_at = Some(now);

        debug!("saving board {:?} as {id}", entry.name);
        entries.insert(id.clone(), serde_json::to_value(&entry)?);
        self.write(&entries)?;

        Ok(id)
    }

    /// Entries ordered most recently saved first. Entries that do not parse are skipped.
    pub fn list(&self) -> Result<Vec<SnapshotSummary>, BoardError> {
        let mut summaries: Vec<_> = self
            .entries()?
            .into_iter()
            .filter_map(|(id, entry)| match parse_entry(&id, entry) {
                Ok(snapshot) => snapshot.summary(),
                Err(err) => {
                    warn!("skipping library entry {id:?}: {err}");
                    None
                },
            })
            .collect();
        summaries.sort_by(|a, b| b.recency().cmp(&a.recency()).then_with(|| a.name.cmp(&b.name)));
        Ok(summaries)
    }

    /// Loads an entry, validating it against the live grid size.
    pub fn load(&self, id: &str, width: u16, height: u16) -> Result<Snapshot, BoardError> {
        let entry =
            self.entries()?.remove(id).ok_or_else(|| BoardError::NotFound(id.to_string()))?;
        let snapshot = parse_entry(id, entry)?;
        snapshot.validate(width, height)?;
        Ok(snapshot)
    }

    fn entries(&self) -> Result<BTreeMap<String, Value>, BoardError> {
        read_map(&self.store, BOARD_LIBRARY_KEY)
    }

    fn write(&mut self, entries: &BTreeMap<String, Value>) -> Result<(), BoardError> {
        write_map(&mut self.store, BOARD_LIBRARY_KEY, entries)
    }
}

/// Stored entries are kept as loose JSON; each one is checked only when it is read. The
/// map key is the id even when the entry itself lacks one.
fn parse_entry(id: &str, entry: Value) -> Result<Snapshot, BoardError> {
    let mut snapshot: Snapshot = serde_json::from_value(entry)
        .map_err(|err| BoardError::Validation(format!("library entry {id:?}: {err}")))?;
    snapshot.id.get_or_insert_with(|| id.to_string());
    Ok(snapshot)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlyphRecord {
    pub id: String,
    #[serde(flatten)]
    pub glyph: Glyph,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// User-supplied glyphs, shared across boards. Lookups resolve to the most recently added
/// variant of a character.
#[derive(Clone, Debug)]
pub struct GlyphLibrary<S> {
    store: S,
    records: Vec<GlyphRecord>,
}

impl<S: KeyValueStore> GlyphLibrary<S> {
    /// Loads every stored record. An unreadable library starts out empty.
    pub fn open(store: S) -> Self {
        let mut records: Vec<GlyphRecord> = match read_map(&store, FONT_LIBRARY_KEY) {
            Ok(map) => map.into_values().collect(),
            Err(err) => {
                warn!("glyph library unavailable: {err}");
                Vec::new()
            },
        };
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Self { store, records }
    }

    pub fn records(&self) -> &[GlyphRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&GlyphRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds `glyph` under `<char>-<millis>` and persists the library.
    ///
    /// The record stays usable in memory when the store rejects the write; the error is
    /// still returned.
    pub fn add(&mut self, glyph: Glyph, now: DateTime<Utc>) -> Result<String, BoardError> {
        let mut millis = now.timestamp_millis();
        let mut id = format!("{}-{millis}", glyph.character);
        while self.get(&id).is_some() {
            millis += 1;
            id = format!("{}-{millis}", glyph.character);
        }

        self.records.push(GlyphRecord { id: id.clone(), glyph, created_at: Some(now) });

        let map: BTreeMap<_, _> =
            self.records.iter().map(|record| (record.id.clone(), record)).collect();
        write_map(&mut self.store, FONT_LIBRARY_KEY, &map)?;

        Ok(id)
    }
}

impl<S> GlyphSource for GlyphLibrary<S> {
    fn glyph_for(&self, ch: char) -> Option<&Glyph> {
        self.records
            .iter()
            .rev()
            .map(|record| &record.glyph)
            .find(|glyph| glyph.character.chars().eq(std::iter::once(ch)))
    }
}

fn read_map<S, T>(store: &S, key: &str) -> Result<BTreeMap<String, T>, BoardError>
where
    S: KeyValueStore,
    T: DeserializeOwned,
{
    if !store.is_available() {
        return Err(BoardError::StorageUnavailable(format!("no store for {key}")));
    }

    let Some(raw) = store.get(key)? else {
        return Ok(BTreeMap::new());
    };

    match serde_json::from_str(&raw) {
        Ok(map) => Ok(map),
        Err(err) => {
            warn!("ignoring unreadable {key}: {err}");
            Ok(BTreeMap::new())
        },
    }
}

fn write_map<S, T>(store: &mut S, key: &str, map: &BTreeMap<String, T>) -> Result<(), BoardError>
where
    S: KeyValueStore,
    T: Serialize,
{
    if !store.is_available() {
        return Err(BoardError::StorageUnavailable(format!("no store for {key}")));
    }

    let raw = serde_json::to_string(map)?;
    store.set(key, &raw)
}

fn generate_board_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("board-{}-{suffix:06x}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::color::Color;
    use crate::element::ElementList;
    use crate::grid::PixelGrid;
    use crate::store::MemoryStore;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn board(name: &str, painted: u16) -> Snapshot {
        let mut grid = PixelGrid::new(4, 4);
        for column in 0..painted {
            grid.set(column, 0, Color::WHITE);
        }
        Snapshot::capture(&grid, &ElementList::new(), name, Color::WHITE, at(0))
    }

    #[test]
    fn same_name_overwrites_entry() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        let first = library.save(&board(" sign ", 1), at(1)).unwrap();
        let second = library.save(&board("sign", 3), at(2)).unwrap();
        assert_eq!(first, second);

        let entries = library.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "sign");

        let loaded = library.load(&first, 4, 4).unwrap();
        assert_eq!(loaded.pixel_grid().unwrap().painted_count(), 3);
        assert_eq!(loaded.saved_at, Some(at(2)));
    }

    #[test]
    fn unnamed_boards_get_generated_names_and_ids() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        let a = library.save(&board("", 0), at(1)).unwrap();
        let b = library.save(&board("  ", 0), at(2)).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("board-"));

        let entries = library.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.name.starts_with("Untitled board ")));
    }

    #[test]
    fn snapshot_id_is_reused_for_new_names() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        let mut snapshot = board("imported", 0);
        snapshot.id = Some("board-42".into());
        assert_eq!(library.save(&snapshot, at(1)).unwrap(), "board-42");
    }

    #[test]
    fn list_is_most_recent_first() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        library.save(&board("old", 0), at(1)).unwrap();
        library.save(&board("new", 0), at(5)).unwrap();
        library.save(&board("middle", 0), at(3)).unwrap();

        let names: Vec<_> = library.list().unwrap().into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, ["new", "middle", "old"]);
    }

    #[test]
    fn load_reports_missing_and_mismatched_entries() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        let id = library.save(&board("small", 0), at(1)).unwrap();

        assert!(matches!(library.load("nope", 4, 4), Err(BoardError::NotFound(_))));
        assert!(matches!(library.load(&id, 64, 32), Err(BoardError::Validation(_))));
    }

    #[test]
    fn broken_entry_does_not_hide_the_rest() {
        let mut library = SnapshotLibrary::new(MemoryStore::new());
        let good = library.save(&board("good", 2), at(1)).unwrap();

        let raw = library.store.get(BOARD_LIBRARY_KEY).unwrap().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let mut bad = value[&good].clone();
        bad["id"] = "bad".into();
        bad["name"] = "bad".into();
        bad["pixels"][0][0] = "#XYZ".into();
        value["bad"] = bad;
        library.store.set(BOARD_LIBRARY_KEY, &value.to_string()).unwrap();

        let names: Vec<_> = library.list().unwrap().into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, ["good"]);
        assert_eq!(library.load(&good, 4, 4).unwrap().pixel_grid().unwrap().painted_count(), 2);
        assert!(matches!(library.load("bad", 4, 4), Err(BoardError::Validation(_))));

        // Saving another board keeps both stored entries.
        library.save(&board("other", 1), at(2)).unwrap();
        assert!(library.load(&good, 4, 4).is_ok());
        assert!(matches!(library.load("bad", 4, 4), Err(BoardError::Validation(_))));
        assert_eq!(library.list().unwrap().len(), 2);
    }

    #[test]
    fn corrupt_library_reads_as_empty() {
        let mut store = MemoryStore::new();
        store.set(BOARD_LIBRARY_KEY, "not json").unwrap();
        let library = SnapshotLibrary::new(store);
        assert!(library.list().unwrap().is_empty());
    }

    #[test]
    fn full_store_rejects_save() {
        let mut library = SnapshotLibrary::new(MemoryStore::with_quota(64));
        assert!(matches!(
            library.save(&board("big", 4), at(1)),
            Err(BoardError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn glyph_lookup_prefers_latest_variant() {
        let store = MemoryStore::new();
        let mut library = GlyphLibrary::open(store);
        let first = library
            .add(Glyph { character: "A".into(), rows: vec![vec![0x80]] }, at(1))
            .unwrap();
        let second = library
            .add(Glyph { character: "A".into(), rows: vec![vec![0xC0]] }, at(1))
            .unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("A-"));
        assert_eq!(library.glyph_for('A').map(|glyph| glyph.rows.clone()), Some(vec![vec![0xC0]]));
        assert!(library.glyph_for('B').is_none());

        let reopened = GlyphLibrary::open(library.store.clone());
        assert_eq!(reopened.records().len(), 2);
        assert_eq!(reopened.glyph_for('A').map(|glyph| glyph.rows.clone()), Some(vec![vec![0xC0]]));
    }

    #[test]
    fn glyph_records_keep_char_and_rows_fields() {
        let mut library = GlyphLibrary::open(MemoryStore::new());
        let id = library.add(Glyph { character: "x".into(), rows: vec![vec![1, 2]] }, at(0)).unwrap();

        let raw = library.store.get(FONT_LIBRARY_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[&id]["char"], "x");
        assert_eq!(value[&id]["rows"][0][1], 2);
        assert_eq!(value[&id]["id"], id.as_str());
    }
}
