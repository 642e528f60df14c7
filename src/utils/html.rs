// src/utils/html.rs

/// Whitelist sanitization for author-supplied rich text (course descriptions,
/// module bodies). Safe tags like <b> and <p> survive; <script> is removed
/// along with its content, as are event-handler attributes.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes an optional field in place.
pub fn clean_opt(input: Option<String>) -> Option<String> {
    input.map(|s| clean_html(&s))
}
