use super::scanner::scan_identifier;

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// If a placeholder `starter + name` begins at `idx`, return the end of its name.
///
/// A placeholder must not follow another starter byte (`@@ROWCOUNT` is a system function, not
/// `@ROWCOUNT`) and its name runs to the end of the identifier, so `@10` never reads as `@1`.
pub(super) fn placeholder_at(bytes: &[u8], idx: usize, starter: &[u8]) -> Option<usize> {
    let first = *starter.first()?;
    if !bytes[idx..].starts_with(starter) {
        return None;
    }
    if idx > 0 && bytes[idx - 1] == first {
        return None;
    }
    scan_identifier(bytes, idx + starter.len())
}
