//! Cosmetic cleanup of streamed fragments.
//!
//! Models tend to emit `** bold **` or `__ underline __` with padding inside
//! the markers, which markdown renderers then refuse to style. The padding
//! is dropped; the text between the markers is left alone.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*[ \t]*(.*?)[ \t]*\*\*").expect("bold pattern is valid")
});

static UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__[ \t]*(.*?)[ \t]*__").expect("underline pattern is valid"));

/// Strips spaces and tabs hugging the inside of `**…**` and `__…__` spans.
///
/// Trimming can glue a stray marker character onto a closing marker
/// (`** a * **` becomes `**a ***`), so the passes repeat until nothing
/// changes. Every change shortens the text, so this terminates, and
/// applying it twice gives the same result as applying it once.
///
/// # Examples
///
/// ```
/// use twinchat::sse::normalize_markup;
///
/// assert_eq!(normalize_markup("a ** bold ** word"), "a **bold** word");
/// assert_eq!(normalize_markup("__ under __"), "__under__");
/// ```
pub fn normalize_markup(text: &str) -> String {
    let mut current = text.to_owned();
    loop {
        let bold = BOLD.replace_all(&current, "**${1}**");
        let next = UNDERLINE.replace_all(&bold, "__${1}__").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
