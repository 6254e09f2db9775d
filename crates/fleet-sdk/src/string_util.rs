/// String utility functions.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// Valid true values: `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive).
    /// Valid false values: `"0"`, `"false"`, `"no"`, `"off"` (case-insensitive).
    /// Returns `None` for anything else.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Return a prefix of at most `count` characters (not bytes).
    pub fn substring_prefix(value: &str, count: usize) -> &str {
        match value.char_indices().nth(count) {
            Some((idx, _)) => &value[..idx],
            None => value,
        }
    }

    /// Quote `value` for display as a POSIX shell word.
    ///
    /// Plain words are returned unchanged; anything else is wrapped in single
    /// quotes with embedded quotes escaped.
    pub fn shell_quote(value: &str) -> String {
        let plain = !value.is_empty()
            && value.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '*')
            });
        if plain {
            value.to_string()
        } else {
            format!("'{}'", value.replace('\'', r"'\''"))
        }
    }

    /// Strip a leading UTF-8 byte order mark, if present.
    pub fn trim_bom(value: &str) -> &str {
        value.strip_prefix('\u{feff}').unwrap_or(value)
    }

    /// Split a comma separated list, trimming entries and dropping empties.
    pub fn split_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
