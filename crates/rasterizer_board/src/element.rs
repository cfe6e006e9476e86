use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::color::Color;

pub const DEFAULT_FONT_SIZE: f32 = 16.0;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geometry of a vector element. All positions are 1-indexed grid cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rectangle {
        #[serde(deserialize_with = "non_negative")]
        x: u32,
        #[serde(deserialize_with = "non_negative")]
        y: u32,
        #[serde(deserialize_with = "non_negative")]
        w: u32,
        #[serde(deserialize_with = "non_negative")]
        h: u32,
    },
    Circle {
        #[serde(deserialize_with = "non_negative")]
        cx: u32,
        #[serde(deserialize_with = "non_negative")]
        cy: u32,
        #[serde(deserialize_with = "non_negative")]
        r: u32,
    },
    Text {
        text: String,
        #[serde(deserialize_with = "non_negative")]
        x: u32,
        #[serde(deserialize_with = "non_negative")]
        y: u32,
        #[serde(rename = "fontSize", default = "default_font_size")]
        font_size: f32,
    },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Rectangle { .. } => "rectangle",
            Shape::Circle { .. } => "circle",
            Shape::Text { .. } => "text",
        }
    }

    /// The cell the element is positioned by: top-left for rectangles and text, center for
    /// circles.
    pub fn anchor(&self) -> (u32, u32) {
        match *self {
            Shape::Rectangle { x, y, .. } | Shape::Text { x, y, .. } => (x, y),
            Shape::Circle { cx, cy, .. } => (cx, cy),
        }
    }

    pub fn set_anchor(&mut self, column: u32, row: u32) {
        match self {
            Shape::Rectangle { x, y, .. } | Shape::Text { x, y, .. } => {
                *x = column;
                *y = row;
            },
            Shape::Circle { cx, cy, .. } => {
                *cx = column;
                *cy = row;
            },
        }
    }

    /// Enforces the size floors: rectangles are at least one cell in each direction and text
    /// keeps a positive, finite font size.
    pub fn normalized(mut self) -> Self {
        match &mut self {
            Shape::Rectangle { w, h, .. } => {
                *w = (*w).max(1);
                *h = (*h).max(1);
            },
            Shape::Text { font_size, .. } => {
                if !font_size.is_finite() || *font_size < 1.0 {
                    *font_size = DEFAULT_FONT_SIZE;
                }
            },
            Shape::Circle { .. } => (),
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub shape: Shape,
    pub color: Color,
}

/// Paint-ordered element collection: later entries cover earlier ones where they overlap.
///
/// Ids are stable across edits, so lookups and removals never depend on position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementList {
    elements: Vec<Element>,
    next_serial: u64,
}

impl ElementList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from persisted elements, normalizing geometry and replacing duplicate
    /// ids so lookups stay unambiguous.
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut list = Self::new();
        for element in elements {
            let id = if list.position(&element.id).is_some() {
                list.fresh_id(element.shape.kind())
            } else {
                element.id
            };
            list.elements.push(Element { id, shape: element.shape.normalized(), color: element.color });
        }
        list
    }

    /// Appends a new element on top of the paint order.
    pub fn add(&mut self, shape: Shape, color: Color) -> ElementId {
        let id = self.fresh_id(shape.kind());
        self.elements.push(Element { id: id.clone(), shape: shape.normalized(), color });
        id
    }

    /// Replaces an element's geometry and color in place, keeping its id and paint position.
    pub fn replace(&mut self, id: &ElementId, shape: Shape, color: Color) -> bool {
        match self.get_mut(id) {
            Some(element) => {
                element.shape = shape.normalized();
                element.color = color;
                true
            },
            None => false,
        }
    }

    pub fn remove(&mut self, id: &ElementId) -> Option<Element> {
        let index = self.position(id)?;
        Some(self.elements.remove(index))
    }

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.iter().find(|element| &element.id == id)
    }

    pub fn get_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| &element.id == id)
    }

    pub fn position(&self, id: &ElementId) -> Option<usize> {
        self.elements.iter().position(|element| &element.id == id)
    }

    /// Elements in paint order, bottom first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Element> + '_ {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    fn fresh_id(&mut self, kind: &str) -> ElementId {
        loop {
            self.next_serial += 1;
            let id = ElementId(format!("{kind}-{}", self.next_serial));
            if self.position(&id).is_none() {
                return id;
            }
        }
    }
}

impl<'a> IntoIterator for &'a ElementList {
    type IntoIter = std::slice::Iter<'a, Element>;
    type Item = &'a Element;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value <= 0.0 {
        return Ok(0);
    }
    Ok(value.round().min(f64::from(u32::MAX)) as u32)
}
