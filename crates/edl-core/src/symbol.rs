//! Symbol expansion.
//!
//! An `activeSymbolClass` object embeds another `.edl` file whose top-level
//! groups are the visual states of the symbol. Expansion turns the symbol
//! into one group holding the surviving state groups, each tagged with the
//! value range of the controlling channel that makes it visible.
//!
//! State groups fill the symbol's box and their members are re-based onto
//! the group origin, so the symbol's own position is carried once by the
//! enclosing group.

use crate::error::ConvertError;
use crate::model::{
    Bounds, EdmGroup, EdmNode, EdmObject, PropValue, Properties, PropertiesExt, SymbolState,
};

const SYMBOL_CLASSES: &[&str] = &["activesymbolclass", "anasymbolclass"];

/// `true` for the EDM classes that embed a symbol file.
pub fn is_symbol_class(name: &str) -> bool {
    SYMBOL_CLASSES.iter().any(|c| name.eq_ignore_ascii_case(c))
}

/// The embedded file name, with `.edl` appended when missing.
pub fn symbol_file(props: &Properties) -> Option<String> {
    let file = props.text("file")?.trim();
    if file.is_empty() {
        return None;
    }
    if file.ends_with(".edl") {
        Some(file.to_string())
    } else {
        Some(format!("{file}.edl"))
    }
}

/// Orientation change requested by the symbol's `orientation` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    FlipVertical,
    FlipHorizontal,
    RotateClockwise,
    RotateCounterClockwise,
}

impl Orientation {
    pub fn from_edm(value: &str) -> Option<Self> {
        match value.trim() {
            "FlipV" => Some(Self::FlipVertical),
            "FlipH" => Some(Self::FlipHorizontal),
            "rotateCW" => Some(Self::RotateClockwise),
            "rotateCCW" => Some(Self::RotateCounterClockwise),
            _ => None,
        }
    }
}

/// Value range of one state; `None` is unbounded on that side.
pub type StateRange = (Option<String>, Option<String>);

/// Turn the parsed forest of an embedded file into the expanded symbol group.
pub fn expand(
    embedded: EdmGroup,
    props: &Properties,
    bounds: Bounds,
) -> Result<EdmGroup, ConvertError> {
    let mut states: Vec<EdmGroup> = embedded
        .nodes
        .into_iter()
        .filter_map(|node| match node {
            EdmNode::Group(g) => Some(g),
            EdmNode::Object(o) => {
                log::warn!("symbol file has a top-level {} outside any state group; dropped", o.name);
                None
            }
        })
        .collect();

    for state in &mut states {
        rebase(state, bounds);
    }

    if let Some(orientation) = props.text("orientation").and_then(Orientation::from_edm) {
        for state in &mut states {
            reorient(state, orientation);
        }
    }

    let control_pvs = props.list("controlPvs").unwrap_or_default();
    if control_pvs.len() > 1 {
        log::warn!(
            "symbol object has {} controlling channels; only the first is used",
            control_pvs.len()
        );
    }
    let channel = control_pvs
        .first()
        .cloned()
        .or_else(|| props.text("controlPv").map(str::to_string));
    let num_pvs = props
        .int("numPvs")
        .unwrap_or(if channel.is_some() { 1 } else { 0 });

    let ranges = state_ranges(props)?;
    match &ranges {
        None => states.truncate(1),
        Some(ranges) => states.truncate(ranges.len()),
    }

    if num_pvs == 0 {
        if let Some(ranges) = &ranges {
            let mut index = 0;
            states.retain(|_| {
                let keep = ranges.get(index).is_some_and(contains_one);
                index += 1;
                keep
            });
        }
    } else {
        if let Some(ranges) = &ranges {
            for (state, (min, max)) in states.iter_mut().zip(ranges) {
                state.symbol_state = Some(SymbolState {
                    channel: channel.clone(),
                    min: min.clone(),
                    max: max.clone(),
                });
            }
        }
        if let Some(channel) = &channel {
            for state in &mut states {
                tag_members(state, channel);
            }
        }
    }

    let mut group = EdmGroup::new(bounds, Properties::new());
    group.nodes = states.into_iter().map(EdmNode::Group).collect();
    Ok(group)
}

/// Place a state group at the symbol origin, sized like the symbol, and move
/// its members (and line points) into the group's local frame.
fn rebase(state: &mut EdmGroup, symbol: Bounds) {
    let (dx, dy) = (state.bounds.x, state.bounds.y);
    for node in &mut state.nodes {
        let b = node.bounds_mut();
        b.x -= dx;
        b.y -= dy;
        if let EdmNode::Object(obj) = node {
            shift_points(obj, "xPoints", -dx);
            shift_points(obj, "yPoints", -dy);
        }
    }
    state.bounds = Bounds::new(0, 0, symbol.width, symbol.height);
}

fn shift_points(obj: &mut EdmObject, key: &str, delta: i32) {
    map_points(obj, key, |p| p + delta);
}

fn map_points(obj: &mut EdmObject, key: &str, f: impl Fn(i32) -> i32) {
    if let Some(PropValue::List(points)) = obj.properties.get_mut(key) {
        for p in points.iter_mut() {
            if let Ok(v) = p.trim().parse::<i32>() {
                *p = f(v).to_string();
            }
        }
    }
}

fn set_angle(obj: &mut EdmObject, key: &str, f: impl Fn(i32) -> i32) {
    let Some(value) = obj.properties.int(key) else {
        return;
    };
    obj.properties.insert(
        key.to_string(),
        PropValue::Str(f(value).to_string()),
    );
}

fn is_class(obj: &EdmObject, class: &str) -> bool {
    obj.name.eq_ignore_ascii_case(class)
}

/// Flip or rotate every member of a state group inside the group's box.
fn reorient(state: &mut EdmGroup, orientation: Orientation) {
    let (gw, gh) = (state.bounds.width, state.bounds.height);
    let (cx, cy) = (f64::from(gw) / 2.0, f64::from(gh) / 2.0);

    for node in &mut state.nodes {
        if let EdmNode::Object(obj) = node {
            let is_arc = is_class(obj, "activeArcClass");
            match orientation {
                Orientation::FlipVertical => {
                    if is_arc {
                        set_angle(obj, "startAngle", i32::wrapping_neg);
                        set_angle(obj, "totalAngle", i32::wrapping_neg);
                    }
                    map_points(obj, "yPoints", |p| gh.saturating_sub(p));
                }
                Orientation::FlipHorizontal => {
                    if is_arc {
                        set_angle(obj, "startAngle", |a| 180i32.saturating_sub(a));
                        set_angle(obj, "totalAngle", i32::wrapping_neg);
                    }
                    map_points(obj, "xPoints", |p| gw.saturating_sub(p));
                }
                Orientation::RotateClockwise => {
                    if is_arc {
                        set_angle(obj, "startAngle", |a| (a.rem_euclid(360) + 270) % 360);
                    }
                    rotate_points(obj, cx, cy, true);
                }
                Orientation::RotateCounterClockwise => {
                    if is_arc {
                        set_angle(obj, "startAngle", |a| (a.rem_euclid(360) + 90) % 360);
                    }
                    rotate_points(obj, cx, cy, false);
                }
            }
        }

        let b = node.bounds_mut();
        match orientation {
            Orientation::FlipVertical => b.y = gh - (b.y + b.height),
            Orientation::FlipHorizontal => b.x = gw - (b.x + b.width),
            Orientation::RotateClockwise | Orientation::RotateCounterClockwise => {
                let clockwise = orientation == Orientation::RotateClockwise;
                let ox = f64::from(b.x) + f64::from(b.width) / 2.0;
                let oy = f64::from(b.y) + f64::from(b.height) / 2.0;
                let (nx, ny) = rotate(ox, oy, cx, cy, clockwise);
                let (w, h) = (b.height, b.width);
                b.x = (nx - f64::from(w) / 2.0).round() as i32;
                b.y = (ny - f64::from(h) / 2.0).round() as i32;
                b.width = w;
                b.height = h;
            }
        }
    }
}

/// Rotate `(x, y)` by 90° about `(cx, cy)`.
fn rotate(x: f64, y: f64, cx: f64, cy: f64, clockwise: bool) -> (f64, f64) {
    let (rx, ry) = (x - cx, y - cy);
    if clockwise {
        (cx - ry, cy + rx)
    } else {
        (cx + ry, cy - rx)
    }
}

fn rotate_points(obj: &mut EdmObject, cx: f64, cy: f64, clockwise: bool) {
    let (Some(xs), Some(ys)) = (obj.properties.list("xPoints"), obj.properties.list("yPoints")) else {
        return;
    };
    let (mut new_x, mut new_y) = (Vec::with_capacity(xs.len()), Vec::with_capacity(ys.len()));
    for (px, py) in xs.iter().zip(ys) {
        let (Ok(px), Ok(py)) = (px.trim().parse::<f64>(), py.trim().parse::<f64>()) else {
            return;
        };
        let (nx, ny) = rotate(px, py, cx, cy, clockwise);
        new_x.push((nx.round() as i32).to_string());
        new_y.push((ny.round() as i32).to_string());
    }
    obj.properties.insert("xPoints".into(), PropValue::List(new_x));
    obj.properties.insert("yPoints".into(), PropValue::List(new_y));
}

/// Mark every object below `group` as a member of a symbol bound to `channel`.
fn tag_members(group: &mut EdmGroup, channel: &str) {
    for node in &mut group.nodes {
        match node {
            EdmNode::Object(obj) => obj.symbol_channel = Some(channel.to_string()),
            EdmNode::Group(inner) => tag_members(inner, channel),
        }
    }
}

/// Ranges from `minValues`/`maxValues`. `None` when either list is absent.
///
/// Entries are either a positional `value` or an `index value` pair.
pub fn state_ranges(props: &Properties) -> Result<Option<Vec<StateRange>>, ConvertError> {
    let (Some(mins), Some(maxs)) = (props.list("minValues"), props.list("maxValues")) else {
        return Ok(None);
    };
    let num_states = props
        .int("numStates")
        .map(|n| n.max(0) as usize)
        .unwrap_or_else(|| mins.len().max(maxs.len()));

    let mut ranges: Vec<StateRange> = vec![(None, None); num_states];
    fill_side(&mut ranges, mins, |r| &mut r.0)?;
    fill_side(&mut ranges, maxs, |r| &mut r.1)?;
    Ok(Some(ranges))
}

fn fill_side(
    ranges: &mut [StateRange],
    entries: &[String],
    side: impl Fn(&mut StateRange) -> &mut Option<String>,
) -> Result<(), ConvertError> {
    for (position, entry) in entries.iter().enumerate() {
        let tokens: Vec<&str> = entry.split_whitespace().map(|t| t.trim_matches('"')).collect();
        let (index, value) = match tokens.as_slice() {
            [value] => (position, *value),
            [index, value] => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| ConvertError::MalformedSymbolRange(entry.clone()))?;
                (index, *value)
            }
            _ => return Err(ConvertError::MalformedSymbolRange(entry.clone())),
        };
        let slot = ranges
            .get_mut(index)
            .ok_or_else(|| ConvertError::MalformedSymbolRange(format!("state {index} out of range: {entry}")))?;
        *side(slot) = Some(value.to_string());
    }
    Ok(())
}

/// `true` when the range includes the value 1.
fn contains_one(range: &StateRange) -> bool {
    let min = range
        .0
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(f64::NEG_INFINITY);
    let max = range
        .1
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(f64::INFINITY);
    min <= 1.0 && max > 1.0
}
