//! Media type constants, classification and magic-byte sniffing.

/// `application/epub+zip`, the required content of the `mimetype` entry.
pub const EPUB_ZIP: &str = "application/epub+zip";
/// Package document.
pub const OPF: &str = "application/oebps-package+xml";
/// XHTML content document.
pub const XHTML: &str = "application/xhtml+xml";
/// EPUB 2 OPS legacy content (`text/x-oeb1-document`).
pub const OEB1_DOCUMENT: &str = "text/x-oeb1-document";
/// DTBook document (EPUB 2 core media type).
pub const DTBOOK: &str = "application/x-dtbook+xml";
/// SVG content document or image.
pub const SVG: &str = "image/svg+xml";
/// NCX navigation control file.
pub const NCX: &str = "application/x-dtbncx+xml";
/// SMIL media overlay.
pub const SMIL: &str = "application/smil+xml";
/// CSS stylesheet.
pub const CSS: &str = "text/css";
/// Search key map (EPUB indexes).
pub const SEARCH_KEY_MAP: &str = "application/vnd.epub.search-key-map+xml";
/// Plain XML, used for container sidecars.
pub const XML: &str = "application/xml";

/// Strip parameters and whitespace and lowercase the type/subtype.
pub fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or_default().trim()
}

/// Media types whose fragments are ID references into an XML tree.
pub fn is_xml_family(media_type: &str) -> bool {
    let media_type = essence(media_type);
    matches!(
        media_type,
        XHTML | OPF | NCX | SMIL | SVG | SEARCH_KEY_MAP | DTBOOK | OEB1_DOCUMENT | XML
    ) || media_type == "text/xml"
        || media_type.ends_with("+xml")
}

/// Content documents that may appear in the spine without a fallback.
pub fn is_content_document(media_type: &str, epub3: bool) -> bool {
    match essence(media_type) {
        XHTML => true,
        SVG => epub3,
        DTBOOK | OEB1_DOCUMENT => !epub3,
        _ => false,
    }
}

/// Raster image core media types.
pub fn is_bitmap_image(media_type: &str) -> bool {
    matches!(
        essence(media_type),
        "image/png" | "image/jpeg" | "image/gif" | "image/webp"
    )
}

/// Any image type, raster or vector.
pub fn is_image(media_type: &str) -> bool {
    essence(media_type).starts_with("image/")
}

/// Font media types, including the legacy aliases seen in the wild.
pub fn is_font(media_type: &str) -> bool {
    let media_type = essence(media_type);
    media_type.starts_with("font/")
        || matches!(
            media_type,
            "application/font-woff"
                | "application/font-sfnt"
                | "application/vnd.ms-opentype"
                | "application/x-font-ttf"
                | "application/x-font-otf"
        )
}

/// Script media types.
pub fn is_script(media_type: &str) -> bool {
    matches!(
        essence(media_type),
        "application/javascript" | "text/javascript" | "application/ecmascript"
    )
}

/// Audio media types.
pub fn is_audio(media_type: &str) -> bool {
    essence(media_type).starts_with("audio/")
}

/// Video media types.
pub fn is_video(media_type: &str) -> bool {
    essence(media_type).starts_with("video/")
}

/// Best-effort media type from a file extension, used when a resource has no
/// manifest declaration (container sidecars, single-file mode).
pub fn guess_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "xhtml" | "html" | "htm" => XHTML,
        "opf" => OPF,
        "ncx" => NCX,
        "smil" => SMIL,
        "css" => CSS,
        "svg" => SVG,
        "xml" => XML,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "otf" => "font/otf",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "js" => "application/javascript",
        _ => return None,
    };
    Some(media_type)
}

/// Sniff a raster image type from its leading bytes.
pub fn sniff_bitmap(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}
