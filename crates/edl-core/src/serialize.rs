//! Property serializer: widget descriptors → name/value property trees.
//!
//! Each capability contributes properties through its own free function.
//! When two contributions name the same property the first one wins.

use crate::palette::Rgba;
use crate::rules::{render_rules, visibility_rule};
use crate::transform::Geometry;
use crate::widget::*;
use smallvec::SmallVec;

/// Typed property content, one variant per XML value form.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(i64),
    Double(f64),
    /// `notr` marks text that must not be translated (style sheets).
    String { value: String, notr: bool },
    Enum(String),
    Set(String),
    StringList(Vec<String>),
    Rect(Geometry),
    Font(Font),
    Color(Rgba),
    Brush { color: Rgba, fill: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    /// Emit `stdset="0"` (dynamic property not in the Qt base class).
    pub stdset: bool,
    pub value: PropertyValue,
}

impl Property {
    fn std(name: &str, value: PropertyValue) -> Self {
        Self {
            name: name.to_string(),
            stdset: false,
            value,
        }
    }

    fn dynamic(name: &str, value: PropertyValue) -> Self {
        Self {
            name: name.to_string(),
            stdset: true,
            value,
        }
    }
}

fn string(value: impl Into<String>) -> PropertyValue {
    PropertyValue::String {
        value: value.into(),
        notr: false,
    }
}

/// A serialized widget.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetNode {
    pub class: &'static str,
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<WidgetNode>,
}

impl WidgetNode {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Number of widgets in this subtree, itself included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(WidgetNode::count).sum::<usize>()
    }
}

/// Serialize a descriptor and its children.
#[must_use]
pub fn serialize(widget: &WidgetDescriptor) -> WidgetNode {
    let class = widget.class;
    let mut properties = Vec::new();
    properties.push(Property::std("geometry", PropertyValue::Rect(widget.geometry)));
    if class.has_text() {
        text_properties(&widget.text, &mut properties);
    }
    channel_properties(class, &widget.binding, &mut properties);
    alarm_properties(widget.alarm, &mut properties);
    if class.is_drawing() {
        draw_properties(class, &widget.draw, &mut properties);
    }
    class_properties(class, &widget.settings, &mut properties);

    WidgetNode {
        class: class.name(),
        name: widget.name.clone(),
        properties: dedup_first_wins(properties),
        children: widget.children.iter().map(serialize).collect(),
    }
}

fn dedup_first_wins(properties: Vec<Property>) -> Vec<Property> {
    let mut seen: SmallVec<[String; 16]> = SmallVec::new();
    properties
        .into_iter()
        .filter(|p| {
            if seen.contains(&p.name) {
                log::trace!("dropping duplicate property {}", p.name);
                false
            } else {
                seen.push(p.name.clone());
                true
            }
        })
        .collect()
}

// ─── Capabilities ────────────────────────────────────────────────────────

fn text_properties(text: &TextStyle, out: &mut Vec<Property>) {
    if let Some(value) = &text.text {
        out.push(Property::std("text", string(value.as_str())));
    }
    if let Some(font) = text.font {
        out.push(Property::std("font", PropertyValue::Font(font)));
    }
    if let Some(alignment) = &text.alignment {
        out.push(Property::std(
            "alignment",
            PropertyValue::Set(format!("Qt::Align{}|Qt::AlignVCenter", capitalize(alignment))),
        ));
    }
    if let Some(sheet) = text.style_sheet() {
        out.push(Property::std(
            "styleSheet",
            PropertyValue::String {
                value: sheet,
                notr: true,
            },
        ));
    }
}

fn channel_properties(class: WidgetClass, binding: &ChannelBinding, out: &mut Vec<Property>) {
    if let Some(channel) = &binding.channel {
        out.push(Property::dynamic("channel", string(channel.as_str())));
    }
    if let Some(tooltip) = &binding.tooltip {
        out.push(Property::dynamic("PyDMToolTip", string(tooltip.as_str())));
    }
    if let Some(visible) = visibility_rule(binding) {
        let mut rules = vec![visible];
        if class.is_push_button() {
            rules.push(rules[0].retarget("Enable"));
        }
        out.push(Property::dynamic("rules", string(render_rules(&rules))));
    }
}

fn alarm_properties(alarm: AlarmSensitivity, out: &mut Vec<Property>) {
    out.push(Property::dynamic(
        "alarmSensitiveContent",
        PropertyValue::Bool(alarm.content),
    ));
    out.push(Property::dynamic(
        "alarmSensitiveBorder",
        PropertyValue::Bool(alarm.border),
    ));
}

fn draw_properties(class: WidgetClass, draw: &DrawStyle, out: &mut Vec<Property>) {
    if let Some(color) = draw.pen_color {
        out.push(Property::dynamic("penColor", PropertyValue::Color(color)));
    }
    if let Some(style) = draw.pen_style {
        let name = match style {
            PenStyle::Dash => "Qt::DashLine",
            PenStyle::Solid => "Qt::SolidLine",
        };
        out.push(Property::dynamic("penStyle", PropertyValue::Enum(name.to_string())));
    }
    if let Some(width) = draw.pen_width {
        out.push(Property::dynamic("penWidth", PropertyValue::Double(f64::from(width))));
    }
    if let Some(color) = draw.brush {
        out.push(Property::dynamic(
            "brush",
            PropertyValue::Brush {
                color,
                fill: draw.brush_fill,
            },
        ));
    }
    match class {
        WidgetClass::Polyline => {
            let points = draw.points.iter().map(|(x, y)| format!("{x}, {y}")).collect();
            out.push(Property::dynamic("points", PropertyValue::StringList(points)));
            if draw.close_polygon {
                out.push(Property::dynamic("closePolygon", PropertyValue::Bool(true)));
            }
        }
        WidgetClass::Arc => {
            // Degrees. EDM arcs without totalAngle span half a circle.
            out.push(Property::dynamic(
                "startAngle",
                PropertyValue::Number(i64::from(draw.start_angle.unwrap_or(0))),
            ));
            out.push(Property::dynamic(
                "spanAngle",
                PropertyValue::Number(i64::from(draw.span_angle.unwrap_or(180))),
            ));
        }
        _ => {}
    }
}

fn class_properties(class: WidgetClass, settings: &ClassSettings, out: &mut Vec<Property>) {
    match class {
        WidgetClass::Label | WidgetClass::LineEdit => {
            if let Some(precision) = settings.precision {
                out.push(Property::dynamic("precision", PropertyValue::Number(i64::from(precision))));
                out.push(Property::dynamic("precisionFromPV", PropertyValue::Bool(false)));
            }
            if let Some(show) = settings.show_units {
                out.push(Property::dynamic("showUnits", PropertyValue::Bool(show)));
            }
            if class == WidgetClass::Label && settings.auto_size {
                out.push(Property::dynamic("autoSize", PropertyValue::Bool(true)));
            }
        }
        WidgetClass::PushButton => {
            if let Some(press) = &settings.press_value {
                out.push(Property::dynamic("pressValue", string(press.as_str())));
            }
            if let Some(release) = &settings.release_value {
                out.push(Property::dynamic("releaseValue", string(release.as_str())));
                out.push(Property::dynamic("writeWhenRelease", PropertyValue::Bool(true)));
            }
        }
        WidgetClass::RelatedDisplayButton => {
            out.push(Property::dynamic("showIcon", PropertyValue::Bool(false)));
            if !settings.filenames.is_empty() {
                out.push(Property::dynamic(
                    "filenames",
                    PropertyValue::StringList(settings.filenames.clone()),
                ));
            }
            if !settings.titles.is_empty() {
                out.push(Property::dynamic("titles", PropertyValue::StringList(settings.titles.clone())));
            }
            if !settings.macros.is_empty() {
                out.push(Property::dynamic("macros", PropertyValue::StringList(settings.macros.clone())));
            }
            out.push(Property::dynamic("openInNewWindow", PropertyValue::Bool(true)));
        }
        WidgetClass::ShellCommand => {
            out.push(Property::dynamic("showIcon", PropertyValue::Bool(false)));
            if !settings.titles.is_empty() {
                out.push(Property::dynamic("titles", PropertyValue::StringList(settings.titles.clone())));
            }
            out.push(Property::dynamic(
                "command",
                PropertyValue::StringList(settings.commands.clone()),
            ));
        }
        WidgetClass::EnumButton => {
            out.push(Property::dynamic("orientation", PropertyValue::Enum("Qt::Horizontal".into())));
        }
        WidgetClass::ByteIndicator => {
            if let Some(bits) = settings.num_bits {
                out.push(Property::dynamic("numBits", PropertyValue::Number(i64::from(bits))));
            }
            if let Some(color) = settings.on_color {
                out.push(Property::dynamic("onColor", PropertyValue::Color(color)));
            }
            if let Some(color) = settings.off_color {
                out.push(Property::dynamic("offColor", PropertyValue::Color(color)));
            }
        }
        WidgetClass::EmbeddedDisplay => {
            if let Some(file) = &settings.embedded_file {
                out.push(Property::dynamic("filename", string(file.as_str())));
            }
            if !settings.macros.is_empty() {
                out.push(Property::dynamic("macros", string(settings.macros.join(","))));
            }
        }
        _ => {}
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor(class: WidgetClass) -> WidgetDescriptor {
        WidgetDescriptor::new(class, &mut NamingContext::new())
    }

    #[test]
    fn geometry_and_alarm_always_present() {
        let node = serialize(&descriptor(WidgetClass::Rectangle));
        assert_eq!(node.class, "PyDMDrawingRectangle");
        assert_eq!(node.name, "PyDMDrawingRectangle_1");
        let names: Vec<_> = node.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["geometry", "alarmSensitiveContent", "alarmSensitiveBorder"]);
        assert_eq!(node.property("alarmSensitiveBorder"), Some(&PropertyValue::Bool(true)));
    }

    #[test]
    fn text_capability_only_for_textual_classes() {
        let mut rect = descriptor(WidgetClass::Rectangle);
        rect.text.text = Some("hidden".into());
        assert_eq!(serialize(&rect).property("text"), None);

        let mut label = descriptor(WidgetClass::Label);
        label.text.text = Some("shown".into());
        label.text.alignment = Some("right".into());
        let node = serialize(&label);
        assert_eq!(node.property("text"), Some(&string("shown")));
        assert_eq!(
            node.property("alignment"),
            Some(&PropertyValue::Set("Qt::AlignRight|Qt::AlignVCenter".into()))
        );
    }

    #[test]
    fn push_button_gets_enable_rule() {
        let mut button = descriptor(WidgetClass::PushButton);
        button.binding.hide_on_disconnect = Some("PV".into());
        let node = serialize(&button);
        let Some(PropertyValue::String { value, .. }) = node.property("rules") else {
            panic!("rules missing");
        };
        assert!(value.contains("\"property\":\"Visible\""));
        assert!(value.contains("\"property\":\"Enable\""));
    }

    #[test]
    fn first_duplicate_wins() {
        let props = vec![
            Property::std("text", string("a")),
            Property::std("text", string("b")),
        ];
        assert_eq!(dedup_first_wins(props), vec![Property::std("text", string("a"))]);
    }

    #[test]
    fn polyline_points() {
        let mut line = descriptor(WidgetClass::Polyline);
        line.draw.points = vec![(0, 4), (3, 0)];
        line.draw.pen_width = Some(2);
        let node = serialize(&line);
        assert_eq!(
            node.property("points"),
            Some(&PropertyValue::StringList(vec!["0, 4".into(), "3, 0".into()]))
        );
        assert_eq!(node.property("penWidth"), Some(&PropertyValue::Double(2.0)));
    }

    #[test]
    fn frame_children_are_serialized() {
        let mut naming = NamingContext::new();
        let mut frame = WidgetDescriptor::new(WidgetClass::Frame, &mut naming);
        frame.children.push(WidgetDescriptor::new(WidgetClass::Label, &mut naming));
        let node = serialize(&frame);
        assert_eq!(node.count(), 2);
        assert_eq!(node.children[0].name, "PyDMLabel_1");
    }
}
