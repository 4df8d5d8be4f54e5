//! Widget mapper: parsed EDM tree → widget descriptors.
//!
//! Groups become frames; objects are looked up in the class catalog and
//! their raw properties are applied through `SETTERS`, a table from EDM key
//! to a typed setter. Keys with no setter are ignored. Visibility keys are
//! gathered per object and turned into a channel binding afterwards.

use crate::convert::ConvertConfig;
use crate::error::{ConvertError, Diagnostic};
use crate::model::*;
use crate::palette::{ColorTable, DEFAULT_GRAY, Rgba};
use crate::resolve::Resolver;
use crate::transform::ContainerContext;
use crate::widget::*;

/// An object whose class has no target counterpart, kept for manual follow-up.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedWidget {
    pub class: String,
    pub bounds: Bounds,
    pub channel: Option<String>,
}

/// Output of mapping one screen.
#[derive(Debug, Default)]
pub struct MappedScreen {
    pub widgets: Vec<WidgetDescriptor>,
    pub unsupported: Vec<UnsupportedWidget>,
    pub diagnostics: Vec<Diagnostic>,
}

type Setter = fn(&mut Mapper<'_, '_>, &mut WidgetDescriptor, &PropValue) -> Result<(), ConvertError>;

/// EDM property key → setter.
const SETTERS: &[(&str, Setter)] = &[
    // Channels
    ("controlPv", set_channel),
    ("alarmPv", set_channel),
    ("indicatorPv", set_channel),
    ("readPv", set_channel),
    ("tooltip", set_tooltip),
    // Text
    ("value", set_text),
    ("label", set_text),
    ("onLabel", set_text),
    ("buttonLabel", set_text),
    ("font", set_font),
    ("fontAlign", set_alignment),
    ("fgColor", set_foreground),
    ("bgColor", set_background),
    // Drawing
    ("lineColor", set_pen_color),
    ("lineWidth", set_pen_width),
    ("lineStyle", set_pen_style),
    ("fillColor", set_brush),
    ("fill", set_brush_fill),
    ("closePolygon", set_close_polygon),
    ("startAngle", set_start_angle),
    ("totalAngle", set_span_angle),
    // Alarm sensitivity
    ("fgAlarm", set_alarm_content),
    ("fillAlarm", set_alarm_content),
    ("lineAlarm", set_alarm_content),
    // Class-specific
    ("precision", set_precision),
    ("showUnits", set_show_units),
    ("autoSize", set_auto_size),
    ("pressValue", set_press_value),
    ("releaseValue", set_release_value),
    ("displayFileName", set_filenames),
    ("menuLabel", set_titles),
    ("symbols", set_macros),
    ("command", set_commands),
    ("commandLabel", set_titles),
    ("numBits", set_num_bits),
    ("onColor", set_on_color),
    ("offColor", set_off_color),
    ("file", set_embedded_file),
];

fn setter(key: &str) -> Option<Setter> {
    SETTERS.iter().find(|(k, _)| *k == key).map(|(_, f)| *f)
}

pub struct Mapper<'a, 'c> {
    colors: &'a ColorTable,
    resolver: &'a mut Resolver<'c>,
    config: &'a ConvertConfig,
    naming: NamingContext,
    out: MappedScreen,
}

impl<'a, 'c> Mapper<'a, 'c> {
    pub fn new(colors: &'a ColorTable, resolver: &'a mut Resolver<'c>, config: &'a ConvertConfig) -> Self {
        Self {
            colors,
            resolver,
            config,
            naming: NamingContext::new(),
            out: MappedScreen::default(),
        }
    }

    /// Map a whole screen.
    pub fn map_screen(mut self, screen: &EdmScreen) -> Result<MappedScreen, ConvertError> {
        let ctx = ContainerContext::root(
            screen.height(),
            self.config.scale,
            self.config.offset_x,
            self.config.offset_y,
        );
        let widgets = self.map_group(&screen.root, ctx, &[])?;
        self.out.widgets = widgets;
        log::debug!(
            "mapped {} top-level widgets, {} unsupported",
            self.out.widgets.len(),
            self.out.unsupported.len()
        );
        Ok(self.out)
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic.message);
        self.out.diagnostics.push(diagnostic);
    }

    fn map_group(
        &mut self,
        group: &EdmGroup,
        ctx: ContainerContext,
        inherited: &[VisibilitySource],
    ) -> Result<Vec<WidgetDescriptor>, ConvertError> {
        let mut widgets = Vec::with_capacity(group.nodes.len());
        for node in &group.nodes {
            match node {
                EdmNode::Group(child) => widgets.push(self.map_frame(child, ctx, inherited)?),
                EdmNode::Object(object) => {
                    if let Some(widget) = self.map_object(object, ctx, inherited)? {
                        widgets.push(widget);
                    }
                }
            }
        }
        Ok(widgets)
    }

    fn map_frame(
        &mut self,
        group: &EdmGroup,
        ctx: ContainerContext,
        inherited: &[VisibilitySource],
    ) -> Result<WidgetDescriptor, ConvertError> {
        let mut frame = WidgetDescriptor::new(WidgetClass::Frame, &mut self.naming);
        frame.geometry = ctx.place(group.bounds);
        if let Some(source) = self.visibility_source(&group.properties)? {
            frame.binding.visibility.push(source);
        }

        let mut child_sources = inherited.to_vec();
        if let Some(state) = &group.symbol_state {
            if let Some(channel) = &state.channel {
                child_sources.push(VisibilitySource {
                    channel: self.resolver.resolve_channel(channel)?,
                    min: state.min.clone(),
                    max: state.max.clone(),
                    invert: false,
                });
            }
        }

        frame.children = self.map_group(group, ctx.enter(frame.geometry), &child_sources)?;
        log::trace!("{} with {} children", frame.name, frame.children.len());
        Ok(frame)
    }

    fn map_object(
        &mut self,
        object: &EdmObject,
        ctx: ContainerContext,
        inherited: &[VisibilitySource],
    ) -> Result<Option<WidgetDescriptor>, ConvertError> {
        let Some(class) = WidgetClass::from_edm(&object.name) else {
            self.note(Diagnostic::warning(
                "unsupported-widget",
                format!("unsupported widget type: {}; skipped", object.name),
            ));
            self.out.unsupported.push(UnsupportedWidget {
                class: object.name.clone(),
                bounds: object.bounds,
                channel: object.properties.text("controlPv").map(str::to_string),
            });
            return Ok(None);
        };

        let mut widget = WidgetDescriptor::new(class, &mut self.naming);
        for (key, value) in &object.properties {
            if let Some(set) = setter(key) {
                set(self, &mut widget, value)?;
            }
        }

        widget.geometry = ctx.place(object.bounds);
        if class == WidgetClass::Polyline {
            self.apply_points(&mut widget, object, ctx.scale);
        }

        widget.binding.visibility.extend_from_slice(inherited);
        if let Some(source) = self.visibility_source(&object.properties)? {
            widget.binding.visibility.push(source);
        }
        widget.binding.hide_on_disconnect = match &object.symbol_channel {
            Some(channel) => Some(self.resolver.resolve_channel(channel)?),
            None if class.hides_on_disconnect() => widget.binding.channel.clone(),
            None => None,
        };

        log::trace!("{} from {}", widget.name, object.name);
        Ok(Some(widget))
    }

    /// `visPv` with its range and inversion, if present.
    fn visibility_source(&mut self, props: &Properties) -> Result<Option<VisibilitySource>, ConvertError> {
        let Some(channel) = props.text("visPv") else {
            return Ok(None);
        };
        Ok(Some(VisibilitySource {
            channel: self.resolver.resolve_channel(channel)?,
            min: props.text("visMin").map(str::to_string),
            max: props.text("visMax").map(str::to_string),
            invert: props.flag("visInvert"),
        }))
    }

    /// Convert absolute `xPoints`/`yPoints` to widget-local points and pad the
    /// geometry by the pen width.
    fn apply_points(&mut self, widget: &mut WidgetDescriptor, object: &EdmObject, scale: f64) {
        let props = &object.properties;
        let (Some(xs), Some(ys)) = (points(props, "xPoints"), points(props, "yPoints")) else {
            return;
        };
        if xs.len() != ys.len() {
            self.note(Diagnostic::warning(
                "line-points",
                format!("{}: {} x points but {} y points", widget.name, xs.len(), ys.len()),
            ));
        }
        let bottom = object.bounds.y + object.bounds.height;
        let local = |v: i32| (f64::from(v) * scale).round() as i32;
        widget.draw.points = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (local(x - object.bounds.x), local(bottom - y)))
            .collect();

        let pen = widget.draw.pen_width.unwrap_or(1).max(1);
        widget.draw.pen_width.get_or_insert(pen);
        widget.geometry.width += pen;
        widget.geometry.height += pen;
    }

    fn color(&mut self, spec: &str) -> Rgba {
        match self.colors.resolve(spec) {
            Some(color) => color,
            None => {
                self.note(Diagnostic::warning(
                    "color-fallback",
                    format!("could not resolve color '{spec}'; using default gray"),
                ));
                DEFAULT_GRAY
            }
        }
    }
}

fn points(props: &Properties, key: &str) -> Option<Vec<i32>> {
    let values: Option<Vec<i32>> = match props.get(key)? {
        PropValue::List(items) => items.iter().map(|v| v.trim().parse().ok()).collect(),
        PropValue::Str(s) => s.split_whitespace().map(|v| v.parse().ok()).collect(),
        PropValue::Flag => None,
    };
    if values.is_none() {
        log::warn!("non-numeric {key}; line points dropped");
    }
    values
}

// ─── Font ────────────────────────────────────────────────────────────────

/// Parse an EDM font (`family-weight-slant-size`, e.g. `helvetica-bold-r-12.0`).
pub fn parse_font(spec: &str, size_decrease: i32) -> Option<Font> {
    let parts: Vec<&str> = spec.trim().split('-').collect();
    if parts.len() < 2 {
        return None;
    }
    let size = parts.last()?.trim().parse::<f64>().ok()? as i32;
    // Family names may contain '-', so weight and slant count from the end.
    let (weight, slant) = match parts.len() {
        2 => (None, None),
        3 => (Some(parts[1]), None),
        n => (Some(parts[n - 3]), Some(parts[n - 2])),
    };
    Some(Font {
        pointsize: size.saturating_sub(size_decrease).max(1),
        weight: 50,
        bold: weight.is_some_and(|w| w.to_ascii_lowercase().contains("bold")),
        italic: slant.is_some_and(|s| s.to_ascii_lowercase().contains('i')),
    })
}

// ─── Setters ─────────────────────────────────────────────────────────────

fn text_of(value: &PropValue) -> Option<&str> {
    value.as_str()
}

fn list_of(value: &PropValue) -> Vec<String> {
    match value {
        PropValue::List(items) => items.clone(),
        PropValue::Str(s) => vec![s.clone()],
        PropValue::Flag => Vec::new(),
    }
}

fn set_channel(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if w.binding.channel.is_some() {
        return Ok(());
    }
    if let PropValue::List(items) = v {
        if items.len() > 1 {
            m.note(Diagnostic::warning(
                "multiple-channels",
                format!("{}: {} controlling channels; only the first is used", w.name, items.len()),
            ));
        }
    }
    if let Some(raw) = text_of(v).filter(|s| !s.trim().is_empty()) {
        w.binding.channel = Some(m.resolver.resolve_channel(raw)?);
    }
    Ok(())
}

fn set_tooltip(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.binding.tooltip = text_of(v).map(str::to_string);
    Ok(())
}

fn set_text(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if w.text.text.is_none() {
        w.text.text = text_of(v).map(str::to_string);
    }
    Ok(())
}

fn set_font(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    let Some(spec) = text_of(v) else {
        return Ok(());
    };
    w.text.font = parse_font(spec, m.config.font_size_decrease);
    if w.text.font.is_none() {
        m.note(Diagnostic::warning("font", format!("{}: unparsable font '{spec}'", w.name)));
    }
    Ok(())
}

fn set_alignment(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.text.alignment = text_of(v).map(|a| a.trim().to_ascii_lowercase());
    Ok(())
}

fn set_foreground(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.text.foreground = Some(m.color(spec));
    }
    Ok(())
}

fn set_background(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.text.background = Some(m.color(spec));
    }
    Ok(())
}

fn set_pen_color(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.draw.pen_color = Some(m.color(spec));
    }
    Ok(())
}

fn set_pen_width(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.pen_width = text_of(v).and_then(|s| s.trim().parse().ok());
    Ok(())
}

fn set_pen_style(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.pen_style = Some(match text_of(v) {
        Some("dash") => PenStyle::Dash,
        _ => PenStyle::Solid,
    });
    Ok(())
}

fn set_brush(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.draw.brush = Some(m.color(spec));
    }
    Ok(())
}

fn set_brush_fill(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.brush_fill = v.is_truthy();
    Ok(())
}

fn set_close_polygon(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.close_polygon = v.is_truthy();
    Ok(())
}

fn angle(v: &PropValue) -> Option<i32> {
    text_of(v)?.trim().parse::<f64>().ok().map(|a| a.round() as i32)
}

fn set_start_angle(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.start_angle = angle(v);
    Ok(())
}

fn set_span_angle(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.draw.span_angle = angle(v);
    Ok(())
}

fn set_alarm_content(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if v.is_truthy() {
        w.alarm.content = true;
    }
    Ok(())
}

fn set_precision(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.precision = text_of(v).and_then(|s| s.trim().parse().ok());
    Ok(())
}

fn set_show_units(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.show_units = Some(v.is_truthy());
    Ok(())
}

fn set_auto_size(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.auto_size = v.is_truthy();
    Ok(())
}

fn set_press_value(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.press_value = text_of(v).map(str::to_string);
    Ok(())
}

fn set_release_value(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.release_value = text_of(v).map(str::to_string);
    Ok(())
}

/// `name.edl` → `name.ui`
fn ui_file(file: &str) -> String {
    match file.strip_suffix(".edl") {
        Some(stem) => format!("{stem}.ui"),
        None => file.to_string(),
    }
}

fn set_filenames(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    let files: Vec<String> = list_of(v).iter().map(|f| ui_file(f)).collect();
    if w.class == WidgetClass::EmbeddedDisplay && w.settings.embedded_file.is_none() {
        w.settings.embedded_file = files.first().cloned();
    }
    w.settings.filenames = files;
    Ok(())
}

fn set_titles(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.titles = list_of(v);
    Ok(())
}

fn set_macros(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.macros = list_of(v);
    Ok(())
}

fn set_commands(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.commands = list_of(v);
    Ok(())
}

fn set_num_bits(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    w.settings.num_bits = text_of(v).and_then(|s| s.trim().parse().ok());
    Ok(())
}

fn set_on_color(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.settings.on_color = Some(m.color(spec));
    }
    Ok(())
}

fn set_off_color(m: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(spec) = text_of(v) {
        w.settings.off_color = Some(m.color(spec));
    }
    Ok(())
}

fn set_embedded_file(_: &mut Mapper<'_, '_>, w: &mut WidgetDescriptor, v: &PropValue) -> Result<(), ConvertError> {
    if let Some(file) = text_of(v) {
        w.settings.embedded_file = Some(ui_file(file));
    }
    Ok(())
}
