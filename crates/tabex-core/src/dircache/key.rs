/// Directory identity used as the cache key.
///
/// A path is made absolute (without resolving links), trimmed, lower-cased,
/// and has `\` folded to `/` and trailing separators removed. The
/// normalized text is hashed to 32 bits with FNV-1a.
///
/// Two distinct directories whose normalized paths hash alike share one
/// cache entry; there is no collision chain.
use std::fmt;
use std::path::Path;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryKey(u32);

impl DirectoryKey {
    pub fn for_path(path: &Path) -> Self {
        Self::for_normalized(&normalize(path))
    }

    fn for_normalized(text: &str) -> Self {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in text.bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Self(hash)
    }

    /// The signed form written to snapshot files.
    pub fn to_raw(self) -> i32 {
        self.0 as i32
    }

    pub fn from_raw(raw: i32) -> Self {
        Self(raw as u32)
    }
}

impl fmt::Debug for DirectoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectoryKey({:08x})", self.0)
    }
}

/// Canonical text form of a directory path.
pub fn normalize(path: &Path) -> String {
    let trimmed = path.to_string_lossy();
    let trimmed = Path::new(trimmed.trim());
    let absolute = std::path::absolute(trimmed).unwrap_or_else(|_| trimmed.to_path_buf());

    let mut text = absolute
        .to_string_lossy()
        .trim()
        .to_lowercase()
        .replace('\\', "/");
    while text.ends_with('/') && !is_root(&text) {
        text.pop();
    }
    text
}

/// `/`, or a drive root such as `c:/`.
fn is_root(text: &str) -> bool {
    let bytes = text.as_bytes();
    text == "/" || (bytes.len() == 3 && bytes[1] == b':' && bytes[2] == b'/')
}
