//! base64 图片 data URI 的解析。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::storage::StoreError;

/// 解析得到的图片负载：扩展名与解码后的字节。
pub struct ImagePayload {
    pub extension: String,
    pub content: Vec<u8>,
}

/// 解析 `data:image/<subtype>;base64,<payload>` 形式的字符串。
pub fn parse_image(payload: &str) -> Result<ImagePayload, StoreError> {
    let rest = payload
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing data: prefix"))?;
    let rest = rest
        .trim_start()
        .strip_prefix("image/")
        .ok_or_else(|| invalid("not an image media type"))?;
    let (subtype, encoded) = rest
        .split_once(";base64,")
        .ok_or_else(|| invalid("missing ;base64, marker"))?;

    if subtype.is_empty()
        || !subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid("malformed image subtype"));
    }

    let content = STANDARD
        .decode(encoded)
        .map_err(|err| invalid(&format!("bad base64 data: {err}")))?;

    Ok(ImagePayload {
        extension: format!(".{subtype}"),
        content,
    })
}

fn invalid(reason: &str) -> StoreError {
    StoreError::InvalidPayload(format!("illegal image base64 value: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_png_payload() {
        let payload = parse_image("data:image/png;base64,aGVsbG8=").expect("parse");
        assert_eq!(payload.extension, ".png");
        assert_eq!(payload.content, b"hello");
    }

    #[test]
    fn accepts_whitespace_after_data_prefix() {
        let payload = parse_image("data: image/jpeg;base64,aGVsbG8=").expect("parse");
        assert_eq!(payload.extension, ".jpeg");
    }

    #[test]
    fn rejects_plain_text() {
        assert!(matches!(
            parse_image("hello world"),
            Err(StoreError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_non_image_media_type() {
        assert!(matches!(
            parse_image("data:text/plain;base64,aGVsbG8="),
            Err(StoreError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_missing_base64_marker() {
        assert!(matches!(
            parse_image("data:image/png,aGVsbG8="),
            Err(StoreError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_bad_base64_data() {
        assert!(matches!(
            parse_image("data:image/png;base64,@@@@"),
            Err(StoreError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_malformed_subtype() {
        assert!(matches!(
            parse_image("data:image/;base64,aGVsbG8="),
            Err(StoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_image("data:image/png gif;base64,aGVsbG8="),
            Err(StoreError::InvalidPayload(_))
        ));
    }
}
