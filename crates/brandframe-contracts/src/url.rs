/// How to treat input that has no dot in its host, e.g. `acme`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BareNamePolicy {
    /// Leave the host as typed: `acme` -> `https://acme`.
    #[default]
    Keep,
    /// Treat it as a `.com` domain: `acme` -> `https://acme.com`.
    AppendDotCom,
}

/// Turns free-form brand input into a canonical `https://` URL.
///
/// Blank input yields an empty string, which callers treat as "no brand".
/// The result is a fixed point: normalizing it again returns it unchanged.
pub fn normalize_brand_url(input: &str, policy: BareNamePolicy) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if strip_prefix_ignore_case(trimmed, "https://").is_some() {
        return trimmed.to_string();
    }

    let remainder = strip_prefix_ignore_case(trimmed, "http://")
        .or_else(|| trimmed.strip_prefix("//"))
        .unwrap_or(trimmed);

    match policy {
        BareNamePolicy::AppendDotCom if !host_of(remainder).contains('.') => {
            let host = host_of(remainder);
            format!("https://{host}.com{}", &remainder[host.len()..])
        }
        _ => format!("https://{remainder}"),
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn host_of(remainder: &str) -> &str {
    let end = remainder
        .find(|ch| matches!(ch, '/' | '?' | '#'))
        .unwrap_or(remainder.len());
    &remainder[..end]
}
