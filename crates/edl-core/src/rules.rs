//! Visibility rules.
//!
//! EDM visibility (`visPv`/`visMin`/`visMax`/`visInvert`, symbol state ranges,
//! hide-while-disconnected) becomes one `Visible` rule whose expression ANDs a
//! condition per source. Channels are numbered in order of first use; each
//! condition refers to its channel as `ch[i]`.

use crate::widget::{ChannelBinding, VisibilitySource};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleChannel {
    pub channel: String,
    pub trigger: bool,
    pub use_enum: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub name: String,
    pub property: String,
    pub initial_value: String,
    pub expression: String,
    pub channels: Vec<RuleChannel>,
}

impl Rule {
    /// Same expression and channels driving another property.
    #[must_use]
    pub fn retarget(&self, property: &str) -> Self {
        Self {
            name: property.to_string(),
            property: property.to_string(),
            ..self.clone()
        }
    }
}

/// Condition for one source, with its channel at index `i`.
#[must_use]
pub fn condition(source: &VisibilitySource, i: usize) -> String {
    let ch = format!("ch[{i}]");
    let base = match (source.min.as_deref(), source.max.as_deref()) {
        (Some(min), Some(max)) => format!("float({ch}) >= {min} and float({ch}) < {max}"),
        (Some(min), None) => format!("float({ch}) >= {min}"),
        (None, Some(max)) => format!("float({ch}) < {max}"),
        (None, None) => format!("{ch} == 1"),
    };
    if source.invert {
        format!("not ({base})")
    } else {
        base
    }
}

/// The `Visible` rule for a binding, or `None` when nothing controls visibility.
#[must_use]
pub fn visibility_rule(binding: &ChannelBinding) -> Option<Rule> {
    if binding.visibility.is_empty() && binding.hide_on_disconnect.is_none() {
        return None;
    }

    let mut channels: Vec<String> = Vec::new();
    let mut index_of = |channel: &str| match channels.iter().position(|c| c == channel) {
        Some(i) => i,
        None => {
            channels.push(channel.to_string());
            channels.len() - 1
        }
    };

    let mut terms: Vec<String> = binding
        .visibility
        .iter()
        .map(|source| condition(source, index_of(&source.channel)))
        .collect();
    if let Some(channel) = binding.hide_on_disconnect.as_deref() {
        terms.push(format!("ch[{}] is not None", index_of(channel)));
    }

    let expression = if terms.len() == 1 {
        terms.remove(0)
    } else {
        terms
            .iter()
            .map(|t| format!("({t})"))
            .collect::<Vec<_>>()
            .join(" and ")
    };
    log::trace!("visibility rule: {expression}");

    Some(Rule {
        name: "Visible".to_string(),
        property: "Visible".to_string(),
        initial_value: "False".to_string(),
        expression,
        channels: channels
            .into_iter()
            .map(|channel| RuleChannel {
                channel,
                trigger: true,
                use_enum: false,
            })
            .collect(),
    })
}

/// Text content of the `rules` property.
#[must_use]
pub fn render_rules(rules: &[Rule]) -> String {
    // Only strings and bools: serialization cannot fail.
    serde_json::to_string(rules).unwrap_or_default()
}
