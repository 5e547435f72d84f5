use crate::errors::InvalidRequest;
use serde_json::{Map, Value};

const IMAGE_KEY: &str = "image";

/// Request body as handed over by the hosting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Bytes(Vec<u8>),
    /// Body the runtime already parsed as a JSON object.
    Mapping(Map<String, Value>),
}

impl RawPayload {
    /// Build a payload from an HTTP body.
    ///
    /// A body declared as JSON that parses to an object becomes a
    /// [`RawPayload::Mapping`]; everything else stays raw bytes.
    pub fn from_body(content_type: Option<&str>, body: Vec<u8>) -> Self {
        if content_type.is_some_and(is_json_content_type) {
            if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(&body) {
                return RawPayload::Mapping(map);
            }
        }
        RawPayload::Bytes(body)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawPayload::Bytes(bytes) => bytes.is_empty(),
            RawPayload::Mapping(map) => map.is_empty(),
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Encoded image candidate extracted from a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageBlob {
    /// Base64 text.
    Text(String),
    /// Encoded image bytes, or base64 text that arrived as bytes.
    Binary(Vec<u8>),
    /// A JSON `image` value of the named kind that is not a string.
    NonText(&'static str),
}

impl ImageBlob {
    fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => ImageBlob::Text(text),
            Value::Null => ImageBlob::NonText("null"),
            Value::Bool(_) => ImageBlob::NonText("boolean"),
            Value::Number(_) => ImageBlob::NonText("number"),
            Value::Array(_) => ImageBlob::NonText("array"),
            Value::Object(_) => ImageBlob::NonText("object"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Liveness or browser probe; answer without touching the model.
    Probe,
    Image(ImageBlob),
}

/// Extract the image candidate from whatever encoding the caller used.
pub fn decode_request(method: &str, payload: RawPayload) -> Result<Decoded, InvalidRequest> {
    if is_probe_method(method) || payload.is_empty() {
        return Ok(Decoded::Probe);
    }

    let blob = match payload {
        RawPayload::Mapping(mut map) => {
            let value = map.remove(IMAGE_KEY).ok_or(InvalidRequest::MissingImageKey)?;
            ImageBlob::from_json(value)
        }
        RawPayload::Bytes(bytes) if bytes.starts_with(b"{") => sniff_json(bytes),
        RawPayload::Bytes(bytes) => ImageBlob::Binary(bytes),
    };

    Ok(Decoded::Image(blob))
}

fn is_probe_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}

/// Best effort: pull `image` out of a JSON-looking body, or keep the bytes.
fn sniff_json(bytes: Vec<u8>) -> ImageBlob {
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut map)) => match map.remove(IMAGE_KEY) {
            Some(value) => ImageBlob::from_json(value),
            None => ImageBlob::Binary(bytes),
        },
        Ok(_) => ImageBlob::Binary(bytes),
        Err(e) => {
            tracing::debug!(error = %e, "Body looks like JSON but does not parse, using raw bytes");
            ImageBlob::Binary(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> RawPayload {
        match value {
            Value::Object(map) => RawPayload::Mapping(map),
            _ => panic!("test mapping must be a JSON object"),
        }
    }

    #[test]
    fn get_is_a_probe_regardless_of_body() {
        let payload = mapping(json!({"image": "aGVsbG8="}));
        assert_eq!(decode_request("GET", payload).unwrap(), Decoded::Probe);

        let payload = RawPayload::Bytes(b"anything".to_vec());
        assert_eq!(decode_request("get", payload).unwrap(), Decoded::Probe);
    }

    #[test]
    fn head_is_a_probe() {
        let payload = RawPayload::Bytes(b"x".to_vec());
        assert_eq!(decode_request("HEAD", payload).unwrap(), Decoded::Probe);
    }

    #[test]
    fn empty_bodies_are_probes() {
        assert_eq!(
            decode_request("POST", RawPayload::Bytes(Vec::new())).unwrap(),
            Decoded::Probe
        );
        assert_eq!(
            decode_request("POST", RawPayload::Mapping(Map::new())).unwrap(),
            Decoded::Probe
        );
    }

    #[test]
    fn mapping_with_image_yields_text_blob() {
        let payload = mapping(json!({"image": "aGVsbG8=", "threshold": 0.5}));
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::Text("aGVsbG8=".to_string()))
        );
    }

    #[test]
    fn mapping_without_image_is_invalid_request() {
        let payload = mapping(json!({"picture": "aGVsbG8="}));
        let err = decode_request("POST", payload).unwrap_err();
        assert!(matches!(err, InvalidRequest::MissingImageKey));
        assert!(err.to_string().contains("missing 'image' key"));
    }

    #[test]
    fn mapping_with_non_string_image_is_flagged() {
        let payload = mapping(json!({"image": 42}));
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::NonText("number"))
        );

        let payload = mapping(json!({"image": null}));
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::NonText("null"))
        );
    }

    #[test]
    fn json_bytes_are_sniffed_for_image() {
        let payload = RawPayload::Bytes(br#"{"image": "aGVsbG8="}"#.to_vec());
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::Text("aGVsbG8=".to_string()))
        );
    }

    #[test]
    fn json_bytes_with_non_string_image_are_flagged() {
        let payload = RawPayload::Bytes(br#"{"image": 5}"#.to_vec());
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::NonText("number"))
        );
    }

    #[test]
    fn json_bytes_without_image_fall_back_to_raw_bytes() {
        let body = br#"{"other": 1}"#.to_vec();
        let payload = RawPayload::Bytes(body.clone());
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::Binary(body))
        );
    }

    #[test]
    fn malformed_json_bytes_fall_back_to_raw_bytes() {
        let body = b"{not json at all".to_vec();
        let payload = RawPayload::Bytes(body.clone());
        assert_eq!(
            decode_request("POST", payload).unwrap(),
            Decoded::Image(ImageBlob::Binary(body))
        );
    }

    #[test]
    fn other_bytes_pass_through() {
        let body = vec![0xFF, 0xD8, 0xFF, 0xE0];
        let payload = RawPayload::Bytes(body.clone());
        assert_eq!(
            decode_request("PUT", payload).unwrap(),
            Decoded::Image(ImageBlob::Binary(body))
        );
    }

    #[test]
    fn from_body_parses_declared_json_objects() {
        let payload = RawPayload::from_body(
            Some("Application/JSON; charset=utf-8"),
            br#"{"image": "abc"}"#.to_vec(),
        );
        assert!(matches!(payload, RawPayload::Mapping(ref m) if m.contains_key("image")));
    }

    #[test]
    fn from_body_keeps_bytes_for_other_content_types() {
        let body = br#"{"image": "abc"}"#.to_vec();
        let payload = RawPayload::from_body(Some("application/octet-stream"), body.clone());
        assert_eq!(payload, RawPayload::Bytes(body.clone()));

        let payload = RawPayload::from_body(None, body.clone());
        assert_eq!(payload, RawPayload::Bytes(body));
    }

    #[test]
    fn from_body_keeps_bytes_when_declared_json_is_not_an_object() {
        let body = b"[1, 2, 3]".to_vec();
        let payload = RawPayload::from_body(Some("application/json"), body.clone());
        assert_eq!(payload, RawPayload::Bytes(body));

        let body = b"{broken".to_vec();
        let payload = RawPayload::from_body(Some("application/json"), body.clone());
        assert_eq!(payload, RawPayload::Bytes(body));
    }
}
