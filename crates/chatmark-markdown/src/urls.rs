//! Link and image destinations as they come out of model text.
use crate::error::ImageError;
use url::Url;

/// Resolves a link destination against the message's base.
///
/// Destinations with a scheme (`https:`, `mailto:`, `data:`, ...) and in-page `#anchors` are kept.
/// Against a URL base everything else goes through [`Url::join`], so `/api` lands on the base's
/// origin. Against a directory base, `.` and `..` segments are folded. Unresolvable input comes
/// back as written.
pub(crate) fn resolve_url(base_url: Option<&str>, dest: &str) -> String {
    let dest = unwrap_destination(dest);
    if dest.is_empty() || dest.starts_with('#') || has_scheme(dest) {
        return dest.to_string();
    }
    let Some(base) = base_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return dest.to_string();
    };
    match Url::parse(base) {
        Ok(base) => base
            .join(dest)
            .map(String::from)
            .unwrap_or_else(|_| dest.to_string()),
        Err(_) if dest.starts_with('/') => dest.to_string(),
        Err(_) => join_path(base, dest),
    }
}

/// Image sources are stricter than links: they must end up as an `http(s)`, `file` or `data` URL
/// or a path the host can open.
pub(crate) fn resolve_image(base_url: Option<&str>, src: &str) -> Result<String, ImageError> {
    let src = unwrap_destination(src);
    if src.is_empty() {
        return Err(ImageError::EmptySource);
    }
    let resolved = resolve_url(base_url, src);
    if !has_scheme(&resolved) {
        return Ok(resolved);
    }
    match Url::parse(&resolved) {
        Ok(url) => match url.scheme() {
            "http" | "https" | "file" | "data" => Ok(resolved),
            other => Err(ImageError::UnsupportedScheme(other.to_string())),
        },
        Err(source) => Err(ImageError::InvalidUrl {
            src: src.to_string(),
            source,
        }),
    }
}

/// Models sometimes keep the optional `<…>` wrapper or pad the destination with spaces.
fn unwrap_destination(dest: &str) -> &str {
    let dest = dest.trim();
    dest.strip_prefix('<')
        .and_then(|d| d.strip_suffix('>'))
        .unwrap_or(dest)
        .trim()
}

/// `scheme:` prefix. A single letter is a drive name (`C:\notes`), not a scheme.
fn has_scheme(dest: &str) -> bool {
    let Some((scheme, _)) = dest.split_once(':') else {
        return false;
    };
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Joins `dest` onto a directory path. `..` that climbs past the base is kept.
fn join_path(base: &str, dest: &str) -> String {
    let mut parts: Vec<&str> = base.trim_end_matches(['/', '\\']).split(['/', '\\']).collect();
    for seg in dest.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if !last.is_empty() && *last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            seg => parts.push(seg),
        }
    }
    parts.join("/")
}
