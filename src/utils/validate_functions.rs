use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

pub const MAX_USERNAME_LEN: usize = 250;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,250}$").expect("static regex"));
static PIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}$").expect("static regex"));
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("static regex"));

/// 1 to 250 ASCII letters.
pub fn validate_username(username: &str) -> bool {
    USERNAME.is_match(username)
}

/// Exactly four decimal digits.
pub fn validate_pin(pin: &str) -> bool {
    PIN.is_match(pin)
}

/// Non-negative decimal integer that fits in an `i32`. No sign, no spaces.
pub fn validate_amount(s: &str) -> Option<i32> {
    if !AMOUNT.is_match(s) {
        return None;
    }
    //parse fails past i32::MAX
    s.parse::<i32>().ok()
}

/// `path` names a file ending in `ext` (e.g. ".bank").
pub fn validate_init_file(path: &Path, ext: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.len() > ext.len() && name.ends_with(ext))
        .unwrap_or(false)
}
