//! Parsed EDM display model.
//!
//! A screen is a tree: the root `EdmGroup` carries the screen size and its
//! screen-level properties; its `nodes` hold objects and nested groups in
//! painter's order. Raw property values are kept exactly as written (after
//! macro and reference rewriting) and are only interpreted by the mapper.

use crate::palette::Rgba;
use indexmap::IndexMap;

// ─── Property values ─────────────────────────────────────────────────────

/// A raw property value as it appeared in the `.edl` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    /// A bare key with no value (`editable`, `closePolygon`).
    Flag,
    /// `key value` with surrounding quotes removed.
    Str(String),
    /// `key { ... }` block, index prefixes stripped when they were dense.
    List(Vec<String>),
}

impl PropValue {
    /// The scalar text, or the first list element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::List(items) => items.first().map(String::as_str),
            Self::Flag => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Flags count as true; `0`/`false` strings do not.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Flag => true,
            Self::Str(s) => !matches!(s.trim(), "" | "0" | "false" | "False"),
            Self::List(items) => !items.is_empty(),
        }
    }
}

/// Insertion-ordered raw properties. A repeated key overrides the earlier
/// value but keeps its original position.
pub type Properties = IndexMap<String, PropValue>;

/// Convenience lookups over `Properties`.
pub trait PropertiesExt {
    fn text(&self, key: &str) -> Option<&str>;
    fn list(&self, key: &str) -> Option<&[String]>;
    fn flag(&self, key: &str) -> bool;
    fn int(&self, key: &str) -> Option<i32>;
}

impl PropertiesExt for Properties {
    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    fn list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(PropValue::as_list)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(PropValue::is_truthy)
    }

    fn int(&self, key: &str) -> Option<i32> {
        let raw = self.text(key)?.trim();
        raw.parse::<i32>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|f| f as i32))
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────

/// Position and size in EDM coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

// ─── Tree ────────────────────────────────────────────────────────────────

/// Visibility state attached to one state group of an expanded symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolState {
    /// Controlling channel (first entry of the symbol's `controlPvs`).
    pub channel: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
}

/// A leaf widget instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EdmObject {
    /// EDM class identifier with any `:` removed.
    pub name: String,
    pub bounds: Bounds,
    pub properties: Properties,
    /// Controlling channel when this object came out of a symbol expansion.
    pub symbol_channel: Option<String>,
}

impl EdmObject {
    pub fn new(name: impl Into<String>, bounds: Bounds, properties: Properties) -> Self {
        Self {
            name: name.into(),
            bounds,
            properties,
            symbol_channel: None,
        }
    }
}

/// A container of objects and nested groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdmGroup {
    pub bounds: Bounds,
    pub properties: Properties,
    pub nodes: Vec<EdmNode>,
    /// Set on the per-state groups produced by symbol expansion.
    pub symbol_state: Option<SymbolState>,
}

impl EdmGroup {
    pub fn new(bounds: Bounds, properties: Properties) -> Self {
        Self {
            bounds,
            properties,
            nodes: Vec::new(),
            symbol_state: None,
        }
    }

    pub fn push(&mut self, node: EdmNode) {
        self.nodes.push(node);
    }

    /// Count of every object below this group, at any depth.
    pub fn object_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match n {
                EdmNode::Object(_) => 1,
                EdmNode::Group(g) => g.object_count(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdmNode {
    Object(EdmObject),
    Group(EdmGroup),
}

impl EdmNode {
    pub fn bounds_mut(&mut self) -> &mut Bounds {
        match self {
            Self::Object(o) => &mut o.bounds,
            Self::Group(g) => &mut g.bounds,
        }
    }
}

/// A parsed `.edl` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdmScreen {
    /// Screen size and properties; `root.nodes` is the widget forest.
    pub root: EdmGroup,
    /// `bgColor` resolved through the palette while parsing.
    pub background: Option<Rgba>,
}

impl EdmScreen {
    pub fn width(&self) -> i32 {
        self.root.bounds.width
    }

    pub fn height(&self) -> i32 {
        self.root.bounds.height
    }

    pub fn properties(&self) -> &Properties {
        &self.root.properties
    }
}
