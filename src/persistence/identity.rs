//! Folder identity derived from a folder's name and the set of its track names.

/// Prefix of every derived folder id.
const FOLDER_ID_PREFIX: &str = "folder_";

/// Derive the stable id of a folder.
///
/// The id depends on the folder name and on the *set* of track names, so the
/// scan order does not matter but adding, removing or renaming a track yields
/// a new identity. The hash is a 32-bit polynomial string hash; collisions are
/// possible and not detected.
pub fn derive_folder_id<S: AsRef<str>>(folder_name: &str, track_names: &[S]) -> String {
    let mut sorted: Vec<&str> = track_names.iter().map(AsRef::as_ref).collect();
    // Same code-unit order the hash walks.
    sorted.sort_unstable_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

    let key = format!("{}::{}", folder_name, sorted.join("|"));
    let hash = string_hash(&key);

    format!("{}{}", FOLDER_ID_PREFIX, to_base36(hash.unsigned_abs()))
}

/// `h = h * 31 + unit` over UTF-16 code units, wrapping at 32 bits.
fn string_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit))
        })
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();

    String::from_utf8(out).unwrap_or_default()
}
