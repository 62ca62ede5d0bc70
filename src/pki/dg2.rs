//! DG2 / facial-image parsing (spec §4.1 `parse_dg2`). DG2 wraps one or
//! more ISO/IEC 19794-5 biometric data blocks inside a CBEFF biometric
//! information template; this extracts the first instance's raw image
//! payload and identifies its encoding by the same leading-byte sniffing
//! `parser/sniff.rs` uses for uploads, rather than trusting the CBEFF
//! header's own (frequently wrong in the wild) format byte.

use crate::error::{PkdError, PkdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jp2,
    Jpeg,
    Wsq,
}

#[derive(Debug, Clone)]
pub struct Dg2Image {
    pub image_bytes: Vec<u8>,
    pub image_format: ImageFormat,
}

/// Converts a JPEG2000-encoded facial image to JPEG. No implementation
/// ships with this crate (the codec is a deployment-specific choice, the
/// same reasoning [`crate::scheduler::CatalogPoller`] applies to the
/// external-catalog transport); callers that need the conversion supply
/// their own.
pub trait Jp2Converter: Send + Sync {
    fn convert_to_jpeg(&self, jp2_bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Parses a DG2 TLV and returns its first facial image, without
/// attempting any re-encoding (spec §4.1: "otherwise return the raw bytes
/// with format tag").
pub fn parse_dg2(bytes: &[u8]) -> PkdResult<Dg2Image> {
    parse_dg2_with_converter(bytes, None)
}

/// As [`parse_dg2`], but if the extracted image is JP2 and `converter` is
/// supplied, decodes and re-encodes it to JPEG (spec §4.1).
pub fn parse_dg2_with_converter(
    bytes: &[u8],
    converter: Option<&dyn Jp2Converter>,
) -> PkdResult<Dg2Image> {
    let image_bytes = extract_image_payload(bytes)?;
    let image_format = sniff_image_format(&image_bytes)?;

    if image_format == ImageFormat::Jp2 {
        if let Some(converter) = converter {
            if let Some(jpeg_bytes) = converter.convert_to_jpeg(&image_bytes) {
                return Ok(Dg2Image { image_bytes: jpeg_bytes, image_format: ImageFormat::Jpeg });
            }
        }
    }
    Ok(Dg2Image { image_bytes, image_format })
}

/// Walks the buffer for the biometric data block's image payload. DG2's
/// outer tag is `0x75`, wrapping a biometric information template group
/// `0x7F61`; each template (`0x7F60`) carries a header (`0xA1`) and a data
/// block (`0x5F2E` or `0x7F2E`) whose value is a CBEFF facial-record
/// header (ISO/IEC 19794-5, 46 bytes) immediately followed by the image
/// bytes themselves. Rather than modelling every CBEFF field, this finds
/// the data-block tag and the image's own magic bytes within its value.
fn extract_image_payload(bytes: &[u8]) -> PkdResult<Vec<u8>> {
    let mut i = 0;
    while i + 1 < bytes.len() {
        let is_data_block_tag = (bytes[i] == 0x5F || bytes[i] == 0x7F) && bytes[i + 1] == 0x2E;
        if is_data_block_tag {
            let len_pos = i + 2;
            if len_pos >= bytes.len() {
                break;
            }
            let (len_size, value_len) = read_length(&bytes[len_pos..])
                .ok_or_else(|| PkdError::Parse("malformed DG2 biometric data block length".to_string()))?;
            let value_start = len_pos + len_size;
            let value_end = value_start + value_len;
            if value_end > bytes.len() {
                return Err(PkdError::Parse("truncated DG2 biometric data block".to_string()));
            }
            let value = &bytes[value_start..value_end];
            return Ok(locate_image_magic(value).to_vec());
        }
        i += 1;
    }
    Err(PkdError::Parse("DG2 does not contain a biometric data block".to_string()))
}

/// Skips the CBEFF facial-record header by scanning forward for a known
/// image magic rather than trusting the fixed 46-byte header length,
/// which varies across encoders.
fn locate_image_magic(value: &[u8]) -> &[u8] {
    for offset in 0..value.len().saturating_sub(4) {
        let window = &value[offset..];
        if window.starts_with(&[0xFF, 0xD8, 0xFF]) || window.starts_with(JP2_SIGNATURE) {
            return &value[offset..];
        }
    }
    value
}

const JP2_SIGNATURE: &[u8] = &[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20];

fn sniff_image_format(bytes: &[u8]) -> PkdResult<ImageFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Ok(ImageFormat::Jpeg);
    }
    if bytes.starts_with(JP2_SIGNATURE) || bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51]) {
        return Ok(ImageFormat::Jp2);
    }
    // WSQ has no universally fixed magic; the format is only ever used
    // for fingerprint DGs reusing this decoder, signalled by the NIST SOI
    // marker pair.
    if bytes.starts_with(&[0xFF, 0xA0, 0xFF, 0xA8]) {
        return Ok(ImageFormat::Wsq);
    }
    Err(PkdError::Parse("DG2 image payload has no recognised magic bytes".to_string()))
}

fn read_length(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        Some((1, first as usize))
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 4 || bytes.len() < 1 + n {
            return None;
        }
        let mut len = 0usize;
        for &b in &bytes[1..1 + n] {
            len = (len << 8) | b as usize;
        }
        Some((1 + n, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap_data_block(image: &[u8]) -> Vec<u8> {
        // A minimal 46-byte CBEFF facial-record header stand-in, followed
        // by the image bytes, inside a `0x5F2E` data-block TLV.
        let mut value = vec![0u8; 46];
        value.extend_from_slice(image);
        let mut out = vec![0x5F, 0x2E];
        out.push(value.len() as u8);
        out.extend_from_slice(&value);
        out
    }

    #[test]
    fn jpeg_image_is_identified_without_conversion() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        let dg2 = wrap_data_block(&jpeg);
        let parsed = parse_dg2(&dg2).unwrap();
        assert_eq!(parsed.image_format, ImageFormat::Jpeg);
        assert_eq!(parsed.image_bytes, jpeg);
    }

    #[test]
    fn jp2_image_passes_through_raw_when_no_converter_is_available() {
        let mut jp2 = JP2_SIGNATURE.to_vec();
        jp2.extend_from_slice(&[0x01, 0x02, 0x03]);
        let dg2 = wrap_data_block(&jp2);
        let parsed = parse_dg2(&dg2).unwrap();
        assert_eq!(parsed.image_format, ImageFormat::Jp2);
        assert_eq!(parsed.image_bytes, jp2);
    }

    struct StubConverter;
    impl Jp2Converter for StubConverter {
        fn convert_to_jpeg(&self, _jp2_bytes: &[u8]) -> Option<Vec<u8>> {
            Some(vec![0xFF, 0xD8, 0xFF, 0x00])
        }
    }

    #[test]
    fn jp2_image_is_reencoded_to_jpeg_when_a_converter_is_supplied() {
        let mut jp2 = JP2_SIGNATURE.to_vec();
        jp2.extend_from_slice(&[0x01, 0x02, 0x03]);
        let dg2 = wrap_data_block(&jp2);
        let parsed = parse_dg2_with_converter(&dg2, Some(&StubConverter)).unwrap();
        assert_eq!(parsed.image_format, ImageFormat::Jpeg);
        assert_eq!(parsed.image_bytes, vec![0xFF, 0xD8, 0xFF, 0x00]);
    }

    #[test]
    fn missing_data_block_is_a_parse_error_not_a_panic() {
        let result = parse_dg2(&[0x01, 0x02, 0x03]);
        assert!(result.is_err());
    }
}
