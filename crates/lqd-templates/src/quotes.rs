/// Call `cb` with the byte index of every `delimiter` outside single- or
/// double-quoted regions. Returning `true` from the callback stops the scan.
///
/// Markup quotes have no escape sequences; a quote only closes on the same
/// character that opened it.
pub(crate) fn for_each_unquoted(
    s: &str,
    delimiter: impl Fn(char) -> bool,
    mut cb: impl FnMut(usize) -> bool,
) {
    let mut quote: Option<char> = None;

    for (idx, ch) in s.char_indices() {
        match ch {
            '"' | '\'' if quote == Some(ch) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            _ if quote.is_some() => {}
            _ if delimiter(ch) => {
                if cb(idx) {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Split `s` on an unquoted delimiter character.
pub(crate) fn split_unquoted(s: &str, delimiter: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for_each_unquoted(
        s,
        |ch| ch == delimiter,
        |idx| {
            pieces.push(&s[start..idx]);
            start = idx + delimiter.len_utf8();
            false
        },
    );
    pieces.push(&s[start..]);
    pieces
}
