use mime_guess::Mime;
use mime_guess::mime::APPLICATION_OCTET_STREAM;
use std::str::FromStr;

const WILDCARD_CHAR: &str = "*";

/// 12 bytes is enough for every image magic
/// number `infer` recognizes, 512 bytes covers everything else.
pub fn sniff_window(allowed: &[Mime]) -> usize {
    if allowed.iter().any(|m| m.type_() == mime_guess::mime::IMAGE) {
        12
    } else {
        512
    }
}

/// Detects the content type of `content` from a bounded prefix, the way
/// `infer::get` is already used in the teacher's upload handler. Falls
/// back to `application/octet-stream` when no magic number matches,
/// since an unrecognized type is still a valid (if unlikely to be
/// allowed) sniff result rather than a hard failure.
pub fn sniff_content_type(content: &[u8], window: usize) -> Mime {
    let prefix = &content[..content.len().min(window)];
    infer::get(prefix)
        .and_then(|kind| Mime::from_str(kind.mime_type()).ok())
        .unwrap_or(APPLICATION_OCTET_STREAM)
}

pub fn is_mime_allowed(mime: &Mime, allowed: &Vec<Mime>) -> bool {
    if allowed.is_empty() {
        return false;
    }

    for allowed_mime in allowed {
        // MIME is '*/*', allow everything.
        if allowed_mime.type_() == WILDCARD_CHAR && allowed_mime.subtype() == WILDCARD_CHAR {
            return true;
        }

        // MIME subtype is *, allow if the type matches.
        if allowed_mime.subtype() == WILDCARD_CHAR && allowed_mime.type_() == mime.type_() {
            return true;
        }

        // Check if the mimes are exactly equal.
        if mime == allowed_mime {
            return true;
        }
    }

    false
}
