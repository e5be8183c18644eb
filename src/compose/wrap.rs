//! Greedy word wrap against a measured pixel width

/// Split `text` into lines no wider than `max_width`
///
/// Words are whitespace separated. A word is appended to the current line
/// unless the joined line would measure wider than `max_width`, in which
/// case the current line is flushed and the word starts the next one. A
/// single word wider than `max_width` gets a line of its own and is never
/// broken.
pub fn wrap_words<F>(text: &str, max_width: u32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> u32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate = format!("{current} {word}");
        if measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10px per char
    fn mono(s: &str) -> u32 {
        s.chars().count() as u32 * 10
    }

    #[test]
    fn test_empty_text_has_no_lines() {
        assert!(wrap_words("", 100, mono).is_empty());
        assert!(wrap_words("   \n\t ", 100, mono).is_empty());
    }

    #[test]
    fn test_fits_on_one_line() {
        assert_eq!(wrap_words("THE VACUUM IS OUT", 200, mono), vec!["THE VACUUM IS OUT"]);
    }

    #[test]
    fn test_greedy_split() {
        // "aaa bbb" = 70px fits in 80, "aaa bbb ccc" = 110px does not
        let lines = wrap_words("aaa bbb ccc ddd", 80, mono);
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn test_exact_fit_is_kept() {
        assert_eq!(wrap_words("aaaa bbbbb", 100, mono), vec!["aaaa bbbbb"]);
    }

    #[test]
    fn test_overwide_word_alone() {
        let lines = wrap_words("hi SUPERCALIFRAGILISTIC yo", 100, mono);
        assert_eq!(lines, vec!["hi", "SUPERCALIFRAGILISTIC", "yo"]);
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(wrap_words("  a   b  ", 100, mono), vec!["a b"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "i have seen things you wouldn't believe";
        let first = wrap_words(text, 120, mono);
        for _ in 0..10 {
            assert_eq!(wrap_words(text, 120, mono), first);
        }
    }

    #[test]
    fn test_no_line_exceeds_width_unless_single_word() {
        let text = "DID YOU JUST OPEN A CAN?? because I definitely heard the can opener";
        for line in wrap_words(text, 90, mono) {
            assert!(mono(&line) <= 90 || !line.contains(' '), "line too wide: {line}");
        }
    }
}
