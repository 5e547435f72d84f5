use crate::errors::InvalidImage;
use crate::request::ImageBlob;
use common::span_debug;
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use image::RgbImage;

/// Standard alphabet; padding optional and trailing bits tolerated.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Turn an image candidate into an 8-bit RGB pixel grid.
pub fn materialize(blob: ImageBlob) -> Result<RgbImage, InvalidImage> {
    let bytes = match blob {
        ImageBlob::Text(text) => decode_base64(&text)?,
        ImageBlob::Binary(bytes) => binary_as_base64(&bytes).unwrap_or(bytes),
        ImageBlob::NonText(kind) => return Err(InvalidImage::NotText(kind)),
    };

    decode_image(&bytes)
}

/// Decode an encoded image (JPEG, PNG, ...) and force three channels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InvalidImage> {
    let _s = span_debug!("decode_image");

    let image = image::load_from_memory(bytes)?;

    tracing::debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Decoded image"
    );

    Ok(image.to_rgb8())
}

fn decode_base64(text: &str) -> Result<Vec<u8>, InvalidImage> {
    let payload = strip_data_url(text.trim());
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    Ok(BASE64.decode(compact)?)
}

/// `data:image/png;base64,AAAA` -> `AAAA`
fn strip_data_url(text: &str) -> &str {
    if !text.starts_with("data:") {
        return text;
    }
    match text.split_once(',') {
        Some((header, payload)) if header.ends_with(";base64") => payload,
        _ => text,
    }
}

/// Raw bytes that are really base64 text, decoded. `None` for anything
/// carrying an image signature or failing to decode.
fn binary_as_base64(bytes: &[u8]) -> Option<Vec<u8>> {
    if image::guess_format(bytes).is_ok() || !is_base64_text(bytes) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    decode_base64(text).ok()
}

fn is_base64_text(bytes: &[u8]) -> bool {
    let mut saw_symbol = false;
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' => saw_symbol = true,
            b'=' => {}
            b'\r' | b'\n' => {}
            _ => return false,
        }
    }
    saw_symbol
}
