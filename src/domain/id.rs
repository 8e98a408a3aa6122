//! Task id generation.
//!
//! Ids are opaque and stable for the lifetime of a task; the format embeds
//! the task kind only to make log lines and history dumps easier to scan by
//! eye, never parsed back out by any code path.

/// Generate a task id from its kind and a short random suffix.
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.to_string()[..6];
    let slug = slugify(title);
    format!("{}-{}-{}", hex_prefix, domain_type, slug)
}

/// Slugify a title for use in ids.
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None // Strip apostrophes (straight and curly)
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("plan", "Add OAuth Authentication");
        assert!(id.len() > 10);
        assert!(id.contains("-plan-"));
        assert!(id.contains("add-oauth-authentication"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Add OAuth!"), "add-oauth");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("CamelCase"), "camelcase");
        // Apostrophes should be stripped, not converted to hyphens
        assert_eq!(slugify("here's a test"), "heres-a-test");
        assert_eq!(slugify("don't stop"), "dont-stop");
        assert_eq!(slugify("it's working"), "its-working");
    }
}
