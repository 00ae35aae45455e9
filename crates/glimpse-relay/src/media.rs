//! Shallow media inspection.
//!
//! The relay never decodes payloads; the single byte-pattern check
//! here exists so the initialization preamble can be cached for late
//! joiners.

/// fMP4 box types that mark a stream preamble.
const FMP4_INIT_BOXES: [&[u8; 4]; 2] = [b"ftyp", b"moov"];

/// Whether `payload` is a decoder-initializing segment.
///
/// Two heuristics, matching what capture clients actually emit:
/// - fMP4: the box type at byte offset 4 is `ftyp` or `moov`.
/// - H.264 Annex-B: a leading 3- or 4-byte start code
///   (`00 00 [00] 01`) followed by an SPS (type 7) or PPS (type 8)
///   NAL unit.
#[must_use]
pub fn is_init_segment(payload: &[u8]) -> bool {
    is_fmp4_init(payload) || is_annexb_parameter_set(payload)
}

fn is_fmp4_init(payload: &[u8]) -> bool {
    let Some(box_type) = payload.get(4..8) else {
        return false;
    };
    FMP4_INIT_BOXES.iter().any(|b| &box_type == b)
}

fn is_annexb_parameter_set(payload: &[u8]) -> bool {
    let nal_header = if payload.starts_with(&[0, 0, 0, 1]) {
        payload.get(4)
    } else if payload.starts_with(&[0, 0, 1]) {
        payload.get(3)
    } else {
        return false;
    };
    let Some(header) = nal_header else {
        return false;
    };
    matches!(header & 0x1F, 7 | 8)
}
