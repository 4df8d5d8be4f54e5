//! Target widget descriptors.
//!
//! Each descriptor aggregates independent capabilities (geometry, text style,
//! channel binding, alarm sensitivity, drawing style) plus a small set of
//! class-specific settings. Which capabilities a class emits is decided by
//! `WidgetClass`, not by a type hierarchy.

use crate::palette::Rgba;
use crate::transform::Geometry;
use std::collections::HashMap;

// ─── Classes ─────────────────────────────────────────────────────────────

/// Every target class the converter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WidgetClass {
    Frame,
    Rectangle,
    Ellipse,
    Arc,
    Polyline,
    Label,
    LineEdit,
    PushButton,
    RelatedDisplayButton,
    ShellCommand,
    EnumComboBox,
    EnumButton,
    ByteIndicator,
    EmbeddedDisplay,
}

/// EDM class (lowercase) → target class.
const CATALOG: &[(&str, WidgetClass)] = &[
    ("activerectangleclass", WidgetClass::Rectangle),
    ("activecircleclass", WidgetClass::Ellipse),
    ("activearcclass", WidgetClass::Arc),
    ("activelineclass", WidgetClass::Polyline),
    ("activextextclass", WidgetClass::Label),
    ("activextextdspclassnoedit", WidgetClass::Label),
    ("textupdateclass", WidgetClass::Label),
    ("activextextdspclass", WidgetClass::LineEdit),
    ("textentryclass", WidgetClass::LineEdit),
    ("activemessagebuttonclass", WidgetClass::PushButton),
    ("activebuttonclass", WidgetClass::PushButton),
    ("relateddisplayclass", WidgetClass::RelatedDisplayButton),
    ("shellcmdclass", WidgetClass::ShellCommand),
    ("activemenubuttonclass", WidgetClass::EnumComboBox),
    ("activechoicebuttonclass", WidgetClass::EnumButton),
    ("activeradiobuttonclass", WidgetClass::EnumButton),
    ("byteclass", WidgetClass::ByteIndicator),
    ("activepipclass", WidgetClass::EmbeddedDisplay),
];

impl WidgetClass {
    /// Look up an EDM object class, ignoring case.
    pub fn from_edm(class: &str) -> Option<Self> {
        let class = class.to_ascii_lowercase();
        CATALOG
            .iter()
            .find(|(edm, _)| *edm == class)
            .map(|(_, target)| *target)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Frame => "PyDMFrame",
            Self::Rectangle => "PyDMDrawingRectangle",
            Self::Ellipse => "PyDMDrawingEllipse",
            Self::Arc => "PyDMDrawingArc",
            Self::Polyline => "PyDMDrawingPolyline",
            Self::Label => "PyDMLabel",
            Self::LineEdit => "PyDMLineEdit",
            Self::PushButton => "PyDMPushButton",
            Self::RelatedDisplayButton => "PyDMRelatedDisplayButton",
            Self::ShellCommand => "PyDMShellCommand",
            Self::EnumComboBox => "PyDMEnumComboBox",
            Self::EnumButton => "PyDMEnumButton",
            Self::ByteIndicator => "PyDMByteIndicator",
            Self::EmbeddedDisplay => "PyDMEmbeddedDisplay",
        }
    }

    /// Qt base class for the custom-widget declaration.
    pub const fn extends(self) -> &'static str {
        match self {
            Self::Frame | Self::EmbeddedDisplay => "QFrame",
            Self::Rectangle | Self::Ellipse | Self::Arc | Self::Label => "QLabel",
            Self::Polyline | Self::EnumButton | Self::ByteIndicator => "QWidget",
            Self::LineEdit => "QLineEdit",
            Self::PushButton | Self::RelatedDisplayButton | Self::ShellCommand => "QPushButton",
            Self::EnumComboBox => "QComboBox",
        }
    }

    /// Python module registering the class.
    pub const fn header(self) -> &'static str {
        match self {
            Self::Frame => "pydm.widgets.frame",
            Self::Rectangle | Self::Ellipse | Self::Arc | Self::Polyline => "pydm.widgets.drawing",
            Self::Label => "pydm.widgets.label",
            Self::LineEdit => "pydm.widgets.line_edit",
            Self::PushButton => "pydm.widgets.pushbutton",
            Self::RelatedDisplayButton => "pydm.widgets.related_display_button",
            Self::ShellCommand => "pydm.widgets.shell_command",
            Self::EnumComboBox => "pydm.widgets.enum_combo_box",
            Self::EnumButton => "pydm.widgets.enum_button",
            Self::ByteIndicator => "pydm.widgets.byte",
            Self::EmbeddedDisplay => "pydm.widgets.embedded_display",
        }
    }

    pub const fn is_container(self) -> bool {
        matches!(self, Self::Frame)
    }

    pub const fn is_drawing(self) -> bool {
        matches!(
            self,
            Self::Rectangle | Self::Ellipse | Self::Arc | Self::Polyline
        )
    }

    pub const fn is_push_button(self) -> bool {
        matches!(
            self,
            Self::PushButton | Self::RelatedDisplayButton | Self::ShellCommand
        )
    }

    pub const fn has_text(self) -> bool {
        matches!(
            self,
            Self::Label
                | Self::LineEdit
                | Self::PushButton
                | Self::RelatedDisplayButton
                | Self::ShellCommand
                | Self::EnumComboBox
                | Self::EnumButton
        )
    }

    /// Drawing shapes hide while their channel is disconnected.
    pub const fn hides_on_disconnect(self) -> bool {
        self.is_drawing()
    }
}

// ─── Naming ──────────────────────────────────────────────────────────────

/// Per-run sequence numbers for generated widget names.
#[derive(Debug, Default)]
pub struct NamingContext {
    next: HashMap<WidgetClass, u32>,
}

impl NamingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{Class}_{n}`, counting from 1 per class.
    pub fn next_name(&mut self, class: WidgetClass) -> String {
        let n = self.next.entry(class).or_insert(0);
        *n += 1;
        format!("{}_{}", class.name(), n)
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Font {
    pub pointsize: i32,
    pub weight: i32,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextStyle {
    pub text: Option<String>,
    pub font: Option<Font>,
    /// Horizontal alignment word (`left`, `center`, `right`).
    pub alignment: Option<String>,
    pub foreground: Option<Rgba>,
    pub background: Option<Rgba>,
}

impl TextStyle {
    /// Qt style sheet for the foreground/background colors, if any.
    pub fn style_sheet(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(fg) = self.foreground {
            parts.push(format!("color: {};", fg.to_css()));
        }
        if let Some(bg) = self.background {
            parts.push(format!("background-color: {};", bg.to_css()));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// One visibility condition on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilitySource {
    pub channel: String,
    pub min: Option<String>,
    pub max: Option<String>,
    pub invert: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBinding {
    pub channel: Option<String>,
    pub tooltip: Option<String>,
    pub visibility: Vec<VisibilitySource>,
    /// Channel whose disconnection hides the widget.
    pub hide_on_disconnect: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSensitivity {
    pub content: bool,
    pub border: bool,
}

impl Default for AlarmSensitivity {
    fn default() -> Self {
        Self {
            content: false,
            border: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PenStyle {
    #[default]
    Solid,
    Dash,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawStyle {
    pub pen_color: Option<Rgba>,
    pub pen_style: Option<PenStyle>,
    pub pen_width: Option<i32>,
    pub brush: Option<Rgba>,
    pub brush_fill: bool,
    /// Widget-local points, polylines only.
    pub points: Vec<(i32, i32)>,
    pub close_polygon: bool,
    pub start_angle: Option<i32>,
    pub span_angle: Option<i32>,
}

/// Settings that only a few classes carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassSettings {
    pub precision: Option<i32>,
    pub show_units: Option<bool>,
    pub auto_size: bool,
    pub press_value: Option<String>,
    pub release_value: Option<String>,
    pub filenames: Vec<String>,
    pub titles: Vec<String>,
    pub macros: Vec<String>,
    pub commands: Vec<String>,
    pub num_bits: Option<i32>,
    pub on_color: Option<Rgba>,
    pub off_color: Option<Rgba>,
    pub embedded_file: Option<String>,
}

// ─── Descriptor ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDescriptor {
    pub class: WidgetClass,
    pub name: String,
    pub geometry: Geometry,
    pub text: TextStyle,
    pub binding: ChannelBinding,
    pub alarm: AlarmSensitivity,
    pub draw: DrawStyle,
    pub settings: ClassSettings,
    /// Frames only.
    pub children: Vec<WidgetDescriptor>,
}

impl WidgetDescriptor {
    pub fn new(class: WidgetClass, naming: &mut NamingContext) -> Self {
        Self {
            class,
            name: naming.next_name(class),
            geometry: Geometry::default(),
            text: TextStyle::default(),
            binding: ChannelBinding::default(),
            alarm: AlarmSensitivity::default(),
            draw: DrawStyle::default(),
            settings: ClassSettings::default(),
            children: Vec::new(),
        }
    }

    /// Every class used at or below this descriptor.
    pub fn collect_classes(&self, out: &mut std::collections::BTreeSet<WidgetClass>) {
        out.insert(self.class);
        for child in &self.children {
            child.collect_classes(out);
        }
    }
}
