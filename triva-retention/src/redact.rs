//! Header redaction applied before anything is stored.

use std::collections::BTreeMap;

pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE: [&str; 4] = ["authorization", "cookie", "set-cookie", "x-api-key"];

pub fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE.contains(&name.as_str()) || name.contains("secret") || name.contains("token")
}

/// Copy of `headers` with sensitive values replaced by [`REDACTED`].
/// Names are lowercased.
pub fn redact_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if is_sensitive(&name) {
            out.insert(name, REDACTED.to_string());
            continue;
        }
        out.entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}
