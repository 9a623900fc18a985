use crate::SvnError;

use std::borrow::Cow;

fn canonicalize_rel_path(path: &str, allow_empty: bool) -> Result<Cow<'_, str>, SvnError> {
    let raw = path.trim();

    #[cfg(windows)]
    if raw.starts_with("\\\\") {
        return Err(SvnError::InvalidPath(format!("unsafe path: {path}")));
    }

    let trimmed = raw.trim_matches(['/', '\\']);

    if trimmed.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(SvnError::InvalidPath("empty path".into()));
    }

    if trimmed.contains('\0') {
        return Err(SvnError::InvalidPath(format!("unsafe path: {path}")));
    }

    let mut parts: Vec<&str> = Vec::new();
    let mut needs_alloc = trimmed.contains('\\');

    for seg in trimmed.split(['/', '\\']) {
        if seg.is_empty() || seg == "." {
            needs_alloc = true;
            continue;
        }
        if seg == ".." {
            return Err(SvnError::InvalidPath(format!("unsafe path: {path}")));
        }
        parts.push(seg);
    }

    if parts.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(SvnError::InvalidPath("empty path".into()));
    }

    if !needs_alloc {
        return Ok(Cow::Borrowed(trimmed));
    }

    Ok(Cow::Owned(parts.join("/")))
}

/// Validates and canonicalizes a non-empty repository-relative path.
pub(crate) fn validate_rel_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, false)?.into_owned())
}

/// Like [`validate_rel_path`] but accepts the empty path (the root).
pub(crate) fn validate_rel_dir_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, true)?.into_owned())
}

/// Splits a canonical path into `(parent, basename)`. The root has no parent.
pub(crate) fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').unwrap_or(("", path)))
}

/// Returns `true` if `child` names an entry directly inside `parent`.
pub(crate) fn is_direct_child(parent: &str, child: &str) -> bool {
    split_parent(child).is_some_and(|(dir, name)| dir == parent && !name.is_empty())
}
