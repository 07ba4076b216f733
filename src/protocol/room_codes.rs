/// Length of every room code issued by the room-creation API.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Uppercase a URL room code and check the shape the HTTP API guarantees:
/// exactly six ASCII alphanumerics. Returns `None` for anything else so the
/// socket layer can close with a not-found code instead of querying storage.
pub fn normalize_room_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != ROOM_CODE_LENGTH {
        return None;
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code)
}
