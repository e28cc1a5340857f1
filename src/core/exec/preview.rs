//! UI previews of node results.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::core::error::NodeError;
use crate::core::value::{Tensor, Value};

/// A file the host serves to its front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// UI payload attached to a node result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiPayload {
    Text(Vec<String>),
    Images(Vec<ImageRef>),
}

/// Build a preview of the first leaf of `result`.
///
/// Strings become text previews. A tensor's first batch item is written as a
/// PNG into `temp_dir`. Anything else has no preview.
pub fn build_preview(result: &[Value], temp_dir: &Path) -> Result<Option<UiPayload>, NodeError> {
    let Some(leaf) = result.first().and_then(Value::first_leaf) else {
        log::warn!("Result is empty, not showing preview");
        return Ok(None);
    };

    match leaf {
        Value::Str(text) => Ok(Some(UiPayload::Text(vec![text.clone()]))),
        Value::Tensor(tensor) => {
            let Some(image) = tensor.select_first(0) else {
                log::warn!("Tensor {:?} has no batch item to preview", tensor.shape());
                return Ok(None);
            };
            fs::create_dir_all(temp_dir)?;
            let suffix = Uuid::new_v4().simple().to_string();
            let filename = format!("_temp_{}.png", &suffix[..8]);
            write_png(&image, &temp_dir.join(&filename))?;
            Ok(Some(UiPayload::Images(vec![ImageRef {
                filename,
                subfolder: String::new(),
                kind: "temp".to_string(),
            }])))
        }
        _ => {
            log::warn!("Result is not a string or tensor, not showing preview");
            Ok(None)
        }
    }
}

/// Write `[height, width]` or `[height, width, channels]` data scaled from
/// `[0, 1]` to 8-bit.
fn write_png(image: &Tensor, path: &Path) -> Result<(), NodeError> {
    let (height, width, color) = match *image.shape() {
        [h, w] => (h, w, png::ColorType::Grayscale),
        [h, w, 1] => (h, w, png::ColorType::Grayscale),
        [h, w, 2] => (h, w, png::ColorType::GrayscaleAlpha),
        [h, w, 3] => (h, w, png::ColorType::Rgb),
        [h, w, 4] => (h, w, png::ColorType::Rgba),
        _ => {
            return Err(NodeError::Preview(format!(
                "cannot render tensor of shape {:?} as an image",
                image.shape()
            )));
        }
    };
    let width = u32::try_from(width).map_err(|e| NodeError::Preview(e.to_string()))?;
    let height = u32::try_from(height).map_err(|e| NodeError::Preview(e.to_string()))?;

    let pixels: Vec<u8> = image
        .data()
        .iter()
        .map(|v| (v * 255.0).clamp(0.0, 255.0) as u8)
        .collect();

    let mut encoder = png::Encoder::new(BufWriter::new(File::create(path)?), width, height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast);
    let mut writer = encoder
        .write_header()
        .map_err(|e| NodeError::Preview(e.to_string()))?;
    writer
        .write_image_data(&pixels)
        .map_err(|e| NodeError::Preview(e.to_string()))?;
    writer.finish().map_err(|e| NodeError::Preview(e.to_string()))
}
