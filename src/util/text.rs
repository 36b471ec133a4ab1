use std::borrow::Cow;

/// Ellipsis appended when text is cut
const ELLIPSIS: &str = "...";

/// Truncates a string to at most `max_chars` characters, appending "..." when cut.
///
/// Counts `char`s rather than bytes so the cut never lands inside a multi-byte
/// sequence. The ellipsis is not counted against `max_chars`.
///
/// # Examples
///
/// ```
/// use infobroker::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// assert_eq!(truncate_chars("你好世界", 2), "你好...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
        None => Cow::Borrowed(s),
    }
}

/// Single-line preview of `s` for debug logs: newlines collapsed, at most `max_chars`.
pub fn preview(s: &str, max_chars: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    truncate_chars(&flat, max_chars).into_owned()
}
