//! The schema a host reads to present and wire a node.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::config::DocstringMode;
use crate::core::error::NodeError;
use crate::core::schema::introspect::InputMap;
use crate::core::schema::signature::SourceLocation;
use crate::core::schema::types::HostTag;
use crate::core::value::Value;

/// Host-side input validation. `Err` carries the message shown to the user.
pub type ValidateInputsHook = Arc<dyn Fn(&HashMap<String, Value>) -> Result<(), String> + Send + Sync>;

/// Host-side change detection. A different value forces re-execution.
pub type IsChangedHook = Arc<dyn Fn(&HashMap<String, Value>) -> Value + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputTypes {
    pub required: InputMap,
    pub optional: InputMap,
    pub hidden: InputMap,
}

/// A node's schema, serialized with the keys hosts expect.
#[derive(Clone, Serialize)]
pub struct NodeDescriptor {
    #[serde(skip)]
    pub workflow_name: String,
    #[serde(skip)]
    pub display_name: String,
    #[serde(rename = "CATEGORY")]
    pub category: String,
    /// Name of the wrapped member the host invokes.
    #[serde(rename = "FUNCTION")]
    pub function: String,
    #[serde(rename = "INPUT_TYPES")]
    pub inputs: InputTypes,
    #[serde(rename = "RETURN_TYPES")]
    pub return_types: Vec<HostTag>,
    #[serde(rename = "RETURN_NAMES", skip_serializing_if = "Option::is_none")]
    pub return_names: Option<Vec<String>>,
    #[serde(rename = "INPUT_IS_LIST")]
    pub input_is_list: bool,
    #[serde(rename = "OUTPUT_IS_LIST")]
    pub output_is_list: Vec<bool>,
    #[serde(rename = "OUTPUT_NODE")]
    pub output_node: bool,
    #[serde(rename = "DESCRIPTION")]
    pub description: String,
    #[serde(skip)]
    pub color: Option<NodeColor>,
    #[serde(skip)]
    pub source: SourceLocation,
    #[serde(skip)]
    pub owner: Option<String>,
    #[serde(skip)]
    pub validate_inputs: Option<ValidateInputsHook>,
    #[serde(skip)]
    pub is_changed: Option<IsChangedHook>,
}

impl NodeDescriptor {
    pub fn to_json(&self) -> Result<serde_json::Value, NodeError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("workflow_name", &self.workflow_name)
            .field("display_name", &self.display_name)
            .field("category", &self.category)
            .field("function", &self.function)
            .field("return_types", &self.return_types)
            .field("output_node", &self.output_node)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// A node's title color and the darker background derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeColor {
    /// Channels scaled to `[0, 1]`.
    pub rgb: [f64; 3],
    pub background: String,
}

impl NodeColor {
    /// Parse `#RRGGBB`.
    pub fn parse(hex: &str) -> Result<Self, NodeError> {
        let invalid = || NodeError::InvalidColor(hex.to_string());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; 3];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        let rgb = bytes.map(|b| f64::from(b) / 255.0);
        let dark = bytes.map(|b| (f64::from(b) * 0.6) as u8);
        let background = format!("#{:02X}{:02X}{:02X}", dark[0], dark[1], dark[2]);
        Ok(Self { rgb, background })
    }

    /// Lines appended to the description for the host's front end.
    pub fn annotation(&self) -> String {
        format!("NodeColor={:?}\nNodeBgColor={}", self.rgb, self.background)
    }
}

/// Assemble a node description: explicit text (or the docstring, as
/// `mode` allows), then color annotations, then the source location.
pub fn compose_description(
    explicit: Option<&str>,
    docstring: Option<&str>,
    mode: DocstringMode,
    color: Option<&NodeColor>,
    source: &SourceLocation,
) -> String {
    let mut description = match explicit {
        Some(text) => text.to_string(),
        None => docstring.map(|doc| mode.apply(doc)).unwrap_or_default(),
    };
    if let Some(color) = color {
        description.push_str("\n\n");
        description.push_str(&color.annotation());
    }
    description.push_str(&format!("\n\nNodeSource={source}"));
    description
}

/// Title-case like the host does: a letter starts a word after any
/// non-letter, and the rest of each word is lowercased.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Display and workflow names derived from a function name:
/// `"blur_image"` becomes `("Blur Image", "BlurImage")`.
pub fn default_names(function_name: &str) -> (String, String) {
    let words: Vec<String> = function_name
        .split('_')
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();
    (words.join(" "), words.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        assert_eq!(
            default_names("blur_image"),
            ("Blur Image".to_string(), "BlurImage".to_string())
        );
        assert_eq!(default_names("to3d_mesh").1, "To3DMesh");
        assert_eq!(title_case("hELLO"), "Hello");
    }

    #[test]
    fn test_color_parsing() {
        let color = NodeColor::parse("#FF8000").unwrap();
        assert_eq!(color.rgb, [1.0, 128.0 / 255.0, 0.0]);
        assert_eq!(color.background, "#994C00");

        let color = NodeColor::parse("#336699").unwrap();
        assert_eq!(color.annotation(), "NodeColor=[0.2, 0.4, 0.6]\nNodeBgColor=#1E3D5B");

        assert!(NodeColor::parse("#ff8000").is_ok());
        for bad in ["FF8000", "#FF80", "#GG8000", "#FF80000"] {
            assert!(matches!(NodeColor::parse(bad), Err(NodeError::InvalidColor(_))), "{bad}");
        }
    }

    #[test]
    fn test_compose_description() {
        let source = SourceLocation::new("nodes.rs", 7);
        let doc = "Blur an image.\n\nUses a box filter.";

        let full = compose_description(None, Some(doc), DocstringMode::Full, None, &source);
        assert_eq!(full, format!("{doc}\n\nNodeSource=nodes.rs:7"));

        let brief = compose_description(None, Some(doc), DocstringMode::Brief, None, &source);
        assert_eq!(brief, "Blur an image.\n\nNodeSource=nodes.rs:7");

        let hidden = compose_description(None, Some(doc), DocstringMode::Hidden, None, &source);
        assert_eq!(hidden, "\n\nNodeSource=nodes.rs:7");

        let color = NodeColor::parse("#000000").unwrap();
        let explicit = compose_description(Some("Custom"), Some(doc), DocstringMode::Full, Some(&color), &source);
        assert!(explicit.starts_with("Custom\n\nNodeColor=[0.0, 0.0, 0.0]"));
        assert!(explicit.ends_with("NodeSource=nodes.rs:7"));
    }
}
