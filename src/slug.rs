use crate::error::{AppError, AppResult};

/// URL slug from a display name: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug from an explicit value when given, else from `fallback`. Explicit
/// slugs are normalized too, so `"LED Lights"` and `"led-lights"` collide.
pub fn resolve_slug(explicit: Option<&str>, fallback: &str) -> AppResult<String> {
    let source = explicit.filter(|s| !s.trim().is_empty()).unwrap_or(fallback);
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(AppError::BadRequest("slug must contain letters or digits".into()));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::{resolve_slug, slugify};

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("  LED Bulb -- 9W (Pack of 2) "), "led-bulb-9w-pack-of-2");
        assert_eq!(slugify("Électrique"), "lectrique");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn explicit_slug_wins_over_fallback() {
        assert_eq!(resolve_slug(Some("Custom Slug"), "Name").unwrap(), "custom-slug");
        assert_eq!(resolve_slug(Some("  "), "Smart Plug").unwrap(), "smart-plug");
        assert!(resolve_slug(None, "!!!").is_err());
    }
}
