//! ID3 tag spans. Tags are skipped, never decoded.

/// Fixed ID3v2 header size.
pub const ID3V2_HEADER_LEN: usize = 10;

/// Trailing ID3v1 tag size.
pub const ID3V1_TAG_LEN: u64 = 128;

const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// Total byte length of an ID3v2 tag starting with `header`, or `None` if the
/// bytes are not an ID3v2 header.
pub fn id3v2_tag_length(header: &[u8; ID3V2_HEADER_LEN]) -> Option<u64> {
    if &header[..3] != b"ID3" || header[3] == 0xFF || header[4] == 0xFF {
        return None;
    }

    // Syncsafe: 7 bits per byte.
    let size = header[6..10].iter().try_fold(0u64, |acc, &byte| {
        (byte & 0x80 == 0).then_some((acc << 7) | byte as u64)
    })?;

    let footer = if header[5] & ID3V2_FOOTER_FLAG != 0 {
        ID3V2_HEADER_LEN as u64
    } else {
        0
    };

    Some(ID3V2_HEADER_LEN as u64 + size + footer)
}

/// `true` if `tag` is the start of an ID3v1 tag.
pub fn is_id3v1(tag: &[u8]) -> bool {
    tag.starts_with(b"TAG")
}
