//! Container path normalization, relative-reference resolution and
//! mimetype-dependent fragment grammars.
//!
//! Paths inside a publication are `/`-separated and relative to the container
//! root. Every reference found in a resource is resolved against that
//! resource's own path and then normalized; a reference that climbs above the
//! root is an error rather than being clamped.

use crate::error::PathError;
use crate::media;

/// Normalize a container path.
///
/// Drops empty and `.` segments and pops one segment for every `..`.
/// Popping past the container root fails with [`PathError::InvalidPath`].
/// The result never starts or ends with `/`, so normalizing twice is a no-op.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::InvalidPath {
                        path: path.to_string(),
                    });
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// Split a reference into its path part and optional fragment.
///
/// The fragment is returned without the leading `#`. An empty fragment
/// (`chapter.xhtml#`) is reported as `None`.
pub fn split_fragment(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (reference, None),
    }
}

/// Directory part of a container path (`EPUB/text/c1.xhtml` -> `EPUB/text`).
pub fn parent_directory(path: &str) -> &str {
    let path = split_fragment(path).0;
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// URL scheme of a reference, if it has one (`https`, `mailto`, `data`...).
pub fn url_scheme(reference: &str) -> Option<&str> {
    let (scheme, _) = reference.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

/// How a raw reference string addresses its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceForm {
    /// Relative reference into the container.
    Local,
    /// Absolute URL with a network or mail scheme.
    Remote,
    /// `data:` URL carrying its own content.
    Data,
}

/// Classify a raw reference before attempting resolution.
pub fn reference_form(reference: &str) -> ReferenceForm {
    match url_scheme(reference.trim()) {
        Some(scheme) if scheme.eq_ignore_ascii_case("data") => ReferenceForm::Data,
        Some(_) => ReferenceForm::Remote,
        None => ReferenceForm::Local,
    }
}

/// Resolve `reference` against the container path `base`.
///
/// The reference is percent-decoded first. A fragment-only reference is
/// spliced onto `base` (replacing any fragment `base` carries); anything else
/// is resolved against `base`'s directory, with query strings dropped. The
/// path part of the result is normalized; the fragment is preserved.
pub fn resolve_relative_reference(base: &str, reference: &str) -> Result<String, PathError> {
    let decoded = percent_encoding::percent_decode_str(reference.trim())
        .decode_utf8()
        .map_err(|_| PathError::InvalidEncoding {
            reference: reference.to_string(),
        })?;

    let (base_path, _) = split_fragment(base);
    if decoded.is_empty() {
        return normalize_path(base_path);
    }
    if let Some(fragment) = decoded.strip_prefix('#') {
        let path = normalize_path(base_path)?;
        return Ok(join_fragment(path, fragment));
    }

    let (path_part, fragment) = match decoded.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (decoded.as_ref(), None),
    };
    let path_part = path_part.split('?').next().unwrap_or_default();
    if path_part.is_empty() {
        let path = normalize_path(base_path)?;
        return Ok(match fragment {
            Some(fragment) => join_fragment(path, fragment),
            None => path,
        });
    }

    let joined = if path_part.starts_with('/') {
        path_part.to_string()
    } else {
        let dir = parent_directory(base_path);
        if dir.is_empty() {
            path_part.to_string()
        } else {
            format!("{}/{}", dir, path_part)
        }
    };
    let normalized = normalize_path(&joined)?;
    Ok(match fragment {
        Some(fragment) => join_fragment(normalized, fragment),
        None => normalized,
    })
}

fn join_fragment(mut path: String, fragment: &str) -> String {
    if !fragment.is_empty() {
        path.push('#');
        path.push_str(fragment);
    }
    path
}

/// Fragment addressing scheme of a target media type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentGrammar {
    /// XML documents: the fragment is an ID reference that must name a
    /// registered anchor in the target.
    IdRef,
    /// SVG: ID references plus `svgView(...)` view specifications.
    Svg,
    /// Images: spatial media fragments (`xywh=`).
    SpatialMedia,
    /// Audio: temporal media fragments (`t=`).
    TemporalMedia,
    /// Video: spatial, temporal and track media fragments.
    AudioVisualMedia,
    /// The format has no fragment addressing; any fragment is rejected.
    Unaddressable,
}

impl FragmentGrammar {
    /// Grammar for a media type, or `None` when the type is not known well
    /// enough to judge (foreign resources).
    pub fn for_media_type(media_type: &str) -> Option<FragmentGrammar> {
        let media_type = media::essence(media_type);
        if media_type == media::SVG {
            return Some(FragmentGrammar::Svg);
        }
        if media::is_xml_family(media_type) {
            return Some(FragmentGrammar::IdRef);
        }
        if media::is_bitmap_image(media_type) {
            return Some(FragmentGrammar::SpatialMedia);
        }
        if media_type.starts_with("audio/") {
            return Some(FragmentGrammar::TemporalMedia);
        }
        if media_type.starts_with("video/") {
            return Some(FragmentGrammar::AudioVisualMedia);
        }
        if media_type == media::CSS
            || media::is_font(media_type)
            || media::is_script(media_type)
            || media_type == media::EPUB_ZIP
        {
            return Some(FragmentGrammar::Unaddressable);
        }
        None
    }
}

/// Outcome of checking a fragment against a grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentCheck<'a> {
    /// Syntactically valid and must match this registered anchor.
    Anchor(&'a str),
    /// Syntactically valid and needs no anchor lookup.
    Accepted,
    /// Not a valid production of the grammar.
    Invalid,
}

/// Check `fragment` (without `#`) against `grammar`.
pub fn check_fragment(grammar: FragmentGrammar, fragment: &str) -> FragmentCheck<'_> {
    match grammar {
        FragmentGrammar::IdRef => {
            if is_epub_cfi(fragment) {
                FragmentCheck::Accepted
            } else if is_valid_id_ref(fragment) {
                FragmentCheck::Anchor(fragment)
            } else {
                FragmentCheck::Invalid
            }
        }
        FragmentGrammar::Svg => {
            if fragment.starts_with("svgView(") && fragment.ends_with(')') {
                FragmentCheck::Accepted
            } else if is_valid_id_ref(fragment) {
                FragmentCheck::Anchor(fragment)
            } else {
                FragmentCheck::Invalid
            }
        }
        FragmentGrammar::SpatialMedia => media_fragment(fragment, true, false, false),
        FragmentGrammar::TemporalMedia => media_fragment(fragment, false, true, false),
        FragmentGrammar::AudioVisualMedia => media_fragment(fragment, true, true, true),
        FragmentGrammar::Unaddressable => FragmentCheck::Invalid,
    }
}

fn is_epub_cfi(fragment: &str) -> bool {
    fragment.starts_with("epubcfi(") && fragment.ends_with(')')
}

/// Whether `value` is a valid XML NCName, the syntax of ID references.
pub fn is_valid_id_ref(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '\u{B7}'))
}

fn media_fragment(fragment: &str, spatial: bool, temporal: bool, track: bool) -> FragmentCheck<'_> {
    let mut any = false;
    for pair in fragment.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            return FragmentCheck::Invalid;
        };
        let ok = match name {
            "xywh" if spatial => is_spatial_value(value),
            "t" if temporal => is_temporal_value(value),
            "track" if track => !value.is_empty(),
            _ => false,
        };
        if !ok {
            return FragmentCheck::Invalid;
        }
        any = true;
    }
    if any {
        FragmentCheck::Accepted
    } else {
        FragmentCheck::Invalid
    }
}

fn is_spatial_value(value: &str) -> bool {
    let (percent, coords) = if let Some(rest) = value.strip_prefix("percent:") {
        (true, rest)
    } else {
        (false, value.strip_prefix("pixel:").unwrap_or(value))
    };
    let parts: Vec<&str> = coords.split(',').collect();
    if parts.len() != 4 {
        return false;
    }
    let mut numbers = [0f64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        let valid = if percent {
            is_unsigned_decimal(part)
        } else {
            !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !valid {
            return false;
        }
        *slot = part.parse().unwrap_or(0.0);
    }
    numbers[2] > 0.0 && numbers[3] > 0.0
}

fn is_temporal_value(value: &str) -> bool {
    let value = value.strip_prefix("npt:").unwrap_or(value);
    let (start, end) = match value.split_once(',') {
        Some((start, end)) => (start, Some(end)),
        None => (value, None),
    };
    let start = if start.is_empty() {
        Some(0.0)
    } else {
        parse_npt_time(start)
    };
    let Some(start) = start else {
        return false;
    };
    match end {
        None => !value.is_empty(),
        Some(end) => match parse_npt_time(end) {
            Some(end) => end > start,
            None => false,
        },
    }
}

/// Parse a normal-play-time value (`12.5`, `1:02.5`, `01:02:03`) into seconds.
fn parse_npt_time(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts.as_slice() {
        [secs] if is_unsigned_decimal(secs) => secs.parse().ok(),
        [mins, secs] => {
            let m = parse_two_digit(mins)?;
            let s = parse_sexagesimal_seconds(secs)?;
            Some(m * 60.0 + s)
        }
        [hours, mins, secs] => {
            if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let h: f64 = hours.parse().ok()?;
            let m = parse_two_digit(mins)?;
            let s = parse_sexagesimal_seconds(secs)?;
            Some(h * 3600.0 + m * 60.0 + s)
        }
        _ => None,
    }
}

fn parse_two_digit(value: &str) -> Option<f64> {
    if value.len() != 2 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: f64 = value.parse().ok()?;
    (n < 60.0).then_some(n)
}

fn parse_sexagesimal_seconds(value: &str) -> Option<f64> {
    let whole = value.split('.').next().unwrap_or_default();
    if whole.len() != 2 || !is_unsigned_decimal(value) {
        return None;
    }
    let n: f64 = value.parse().ok()?;
    (n < 60.0).then_some(n)
}

fn is_unsigned_decimal(value: &str) -> bool {
    let mut parts = value.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match frac {
        Some(frac) => frac.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}
