//! URL slugs for documents.

/// Lowercase ASCII words joined by `-`. Falls back to `document`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
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
    slug.truncate(80);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

/// `base`, or `base-2`, `base-3`, ... whichever `taken` rejects first.
pub fn unique_slug<E>(base: &str, mut taken: impl FnMut(&str) -> Result<bool, E>) -> Result<String, E> {
    if !taken(base)? {
        return Ok(base.to_string());
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Universal Basic Income: A Primer!"), "universal-basic-income-a-primer");
        assert_eq!(slugify("  --  "), "document");
        assert_eq!(slugify("Ça va"), "a-va");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let existing = ["charter", "charter-2"];
        let slug = unique_slug::<()>("charter", |s| Ok(existing.contains(&s))).unwrap();
        assert_eq!(slug, "charter-3");
        let slug = unique_slug::<()>("fresh", |s| Ok(existing.contains(&s))).unwrap();
        assert_eq!(slug, "fresh");
    }
}
