//! Emitter: serialized widget tree → `.ui` XML document.

use crate::error::ConvertError;
use crate::palette::Rgba;
use crate::serialize::{Property, PropertyValue, WidgetNode};
use crate::transform::Geometry;
use crate::widget::{Font, WidgetClass};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeSet;

pub const DEFAULT_TITLE: &str = "PyDM Screen";

/// Everything the document needs besides the widget tree itself.
#[derive(Debug, Clone, PartialEq)]
pub struct UiDocument {
    pub width: i32,
    pub height: i32,
    pub title: String,
    pub background: Option<Rgba>,
    pub scrollable: bool,
    pub widgets: Vec<WidgetNode>,
    pub classes: BTreeSet<WidgetClass>,
}

type XmlWriter = Writer<Vec<u8>>;

fn emit_error(err: impl std::fmt::Display) -> ConvertError {
    ConvertError::Emit(err.to_string())
}

/// Render a complete `.ui` document.
pub fn emit_document(doc: &UiDocument) -> Result<String, ConvertError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 1);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(emit_error)?;

    start(&mut w, "ui", &[("version", "4.0")])?;
    text_element(&mut w, "class", "QWidget")?;

    start(&mut w, "widget", &[("class", "QWidget"), ("name", "Form")])?;
    let screen = Geometry::new(0, 0, doc.width, doc.height);
    write_property(&mut w, &property("geometry", PropertyValue::Rect(screen)))?;
    write_property(
        &mut w,
        &property(
            "windowTitle",
            PropertyValue::String {
                value: doc.title.clone(),
                notr: false,
            },
        ),
    )?;
    if let Some(bg) = doc.background {
        write_property(
            &mut w,
            &property(
                "styleSheet",
                PropertyValue::String {
                    value: format!("background-color: {};", bg.to_css()),
                    notr: true,
                },
            ),
        )?;
    }

    if doc.scrollable {
        start(&mut w, "widget", &[("class", "QScrollArea"), ("name", "scrollArea")])?;
        write_property(&mut w, &property("geometry", PropertyValue::Rect(screen)))?;
        write_property(&mut w, &property("widgetResizable", PropertyValue::Bool(true)))?;
        start(
            &mut w,
            "widget",
            &[("class", "QWidget"), ("name", "scrollAreaWidgetContents")],
        )?;
        write_property(&mut w, &property("geometry", PropertyValue::Rect(screen)))?;
        write_widgets(&mut w, &doc.widgets)?;
        end(&mut w, "widget")?;
        end(&mut w, "widget")?;
    } else {
        write_widgets(&mut w, &doc.widgets)?;
    }
    end(&mut w, "widget")?;

    write_custom_widgets(&mut w, &doc.classes)?;
    empty(&mut w, "resources")?;
    empty(&mut w, "connections")?;
    end(&mut w, "ui")?;

    let mut out = String::from_utf8(w.into_inner()).map_err(emit_error)?;
    out.push('\n');
    Ok(out)
}

fn property(name: &str, value: PropertyValue) -> Property {
    Property {
        name: name.to_string(),
        stdset: false,
        value,
    }
}

// ─── Low-level writers ───────────────────────────────────────────────────

fn start(w: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ConvertError> {
    let mut elem = BytesStart::new(tag);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    w.write_event(Event::Start(elem)).map_err(emit_error)
}

fn end(w: &mut XmlWriter, tag: &str) -> Result<(), ConvertError> {
    w.write_event(Event::End(BytesEnd::new(tag))).map_err(emit_error)
}

fn empty(w: &mut XmlWriter, tag: &str) -> Result<(), ConvertError> {
    w.write_event(Event::Empty(BytesStart::new(tag))).map_err(emit_error)
}

fn text_element(w: &mut XmlWriter, tag: &str, text: &str) -> Result<(), ConvertError> {
    text_element_with(w, tag, &[], text)
}

fn text_element_with(
    w: &mut XmlWriter,
    tag: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<(), ConvertError> {
    start(w, tag, attrs)?;
    w.write_event(Event::Text(BytesText::new(text))).map_err(emit_error)?;
    end(w, tag)
}

// ─── Widgets ─────────────────────────────────────────────────────────────

fn write_widgets(w: &mut XmlWriter, widgets: &[WidgetNode]) -> Result<(), ConvertError> {
    for widget in widgets {
        start(w, "widget", &[("class", widget.class), ("name", widget.name.as_str())])?;
        for prop in &widget.properties {
            write_property(w, prop)?;
        }
        write_widgets(w, &widget.children)?;
        end(w, "widget")?;
    }
    Ok(())
}

fn write_property(w: &mut XmlWriter, prop: &Property) -> Result<(), ConvertError> {
    if prop.stdset {
        start(w, "property", &[("name", prop.name.as_str()), ("stdset", "0")])?;
    } else {
        start(w, "property", &[("name", prop.name.as_str())])?;
    }
    write_value(w, &prop.value)?;
    end(w, "property")
}

fn write_value(w: &mut XmlWriter, value: &PropertyValue) -> Result<(), ConvertError> {
    match value {
        PropertyValue::Bool(b) => text_element(w, "bool", if *b { "true" } else { "false" }),
        PropertyValue::Number(n) => text_element(w, "number", &n.to_string()),
        PropertyValue::Double(d) => text_element(w, "double", &d.to_string()),
        PropertyValue::String { value, notr: true } => {
            text_element_with(w, "string", &[("notr", "true")], value)
        }
        PropertyValue::String { value, notr: false } => text_element(w, "string", value),
        PropertyValue::Enum(e) => text_element(w, "enum", e),
        PropertyValue::Set(s) => text_element(w, "set", s),
        PropertyValue::StringList(items) => {
            start(w, "stringlist", &[])?;
            for item in items {
                text_element(w, "string", item)?;
            }
            end(w, "stringlist")
        }
        PropertyValue::Rect(g) => write_rect(w, *g),
        PropertyValue::Font(f) => write_font(w, *f),
        PropertyValue::Color(c) => write_color(w, *c),
        PropertyValue::Brush { color, fill } => {
            let style = if *fill { "SolidPattern" } else { "NoBrush" };
            start(w, "brush", &[("brushstyle", style)])?;
            write_color(w, *color)?;
            end(w, "brush")
        }
    }
}

fn write_rect(w: &mut XmlWriter, g: Geometry) -> Result<(), ConvertError> {
    start(w, "rect", &[])?;
    text_element(w, "x", &g.x.to_string())?;
    text_element(w, "y", &g.y.to_string())?;
    text_element(w, "width", &g.width.to_string())?;
    text_element(w, "height", &g.height.to_string())?;
    end(w, "rect")
}

fn write_font(w: &mut XmlWriter, f: Font) -> Result<(), ConvertError> {
    start(w, "font", &[])?;
    text_element(w, "pointsize", &f.pointsize.to_string())?;
    text_element(w, "weight", &f.weight.to_string())?;
    text_element(w, "bold", if f.bold { "true" } else { "false" })?;
    text_element(w, "italic", if f.italic { "true" } else { "false" })?;
    end(w, "font")
}

fn write_color(w: &mut XmlWriter, c: Rgba) -> Result<(), ConvertError> {
    start(w, "color", &[("alpha", c.a.to_string().as_str())])?;
    text_element(w, "red", &c.r.to_string())?;
    text_element(w, "green", &c.g.to_string())?;
    text_element(w, "blue", &c.b.to_string())?;
    end(w, "color")
}

fn write_custom_widgets(w: &mut XmlWriter, classes: &BTreeSet<WidgetClass>) -> Result<(), ConvertError> {
    let mut sorted: Vec<WidgetClass> = classes.iter().copied().collect();
    sorted.sort_by_key(|c| c.name());

    start(w, "customwidgets", &[])?;
    for class in sorted {
        start(w, "customwidget", &[])?;
        text_element(w, "class", class.name())?;
        text_element(w, "extends", class.extends())?;
        text_element(w, "header", class.header())?;
        if class.is_container() {
            text_element(w, "container", "1")?;
        }
        end(w, "customwidget")?;
    }
    end(w, "customwidgets")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::serialize;
    use crate::widget::{NamingContext, WidgetDescriptor};

    fn document(widgets: Vec<WidgetNode>, classes: BTreeSet<WidgetClass>) -> UiDocument {
        UiDocument {
            width: 800,
            height: 600,
            title: DEFAULT_TITLE.to_string(),
            background: None,
            scrollable: false,
            widgets,
            classes,
        }
    }

    #[test]
    fn empty_screen_document() {
        let xml = emit_document(&document(Vec::new(), BTreeSet::new())).expect("emits");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<ui version=\"4.0\">"));
        assert!(xml.contains("<widget class=\"QWidget\" name=\"Form\">"));
        assert!(xml.contains("<width>800</width>"));
        assert!(xml.contains("<height>600</height>"));
        assert!(xml.contains("<string>PyDM Screen</string>"));
        assert!(xml.contains("<resources/>"));
        assert!(xml.contains("<connections/>"));
        assert_eq!(xml.matches("<widget ").count(), 1);
    }

    #[test]
    fn widgets_and_custom_widgets() {
        let mut naming = NamingContext::new();
        let mut frame = WidgetDescriptor::new(WidgetClass::Frame, &mut naming);
        let mut label = WidgetDescriptor::new(WidgetClass::Label, &mut naming);
        label.text.text = Some("a < b & c".into());
        frame.children.push(label);
        let mut classes = BTreeSet::new();
        frame.collect_classes(&mut classes);

        let xml = emit_document(&document(vec![serialize(&frame)], classes)).expect("emits");
        assert!(xml.contains("<widget class=\"PyDMFrame\" name=\"PyDMFrame_1\">"));
        assert!(xml.contains("<widget class=\"PyDMLabel\" name=\"PyDMLabel_1\">"));
        assert!(xml.contains("a &lt; b &amp; c"));
        assert!(xml.contains("<property name=\"alarmSensitiveBorder\" stdset=\"0\">"));

        let frame_decl = xml.find("<class>PyDMFrame</class>").expect("frame declared");
        let label_decl = xml.find("<class>PyDMLabel</class>").expect("label declared");
        assert!(frame_decl < label_decl);
        assert!(xml.contains("<header>pydm.widgets.frame</header>"));
        assert_eq!(xml.matches("<container>1</container>").count(), 1);
    }

    #[test]
    fn scroll_area_and_background() {
        let mut doc = document(Vec::new(), BTreeSet::new());
        doc.scrollable = true;
        doc.background = Some(Rgba::new(1, 2, 3, 255));
        let xml = emit_document(&doc).expect("emits");
        assert!(xml.contains("<widget class=\"QScrollArea\" name=\"scrollArea\">"));
        assert!(xml.contains("name=\"scrollAreaWidgetContents\""));
        assert!(xml.contains("<string notr=\"true\">background-color: rgba(1, 2, 3, 255);</string>"));
    }
}
