/// Punctuation and symbols that ordinary academic prose is made of.
/// A character that is neither alphanumeric, whitespace, nor in this set
/// counts as special when scoring a page.
pub fn is_standard_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '!'
            | '?'
            | '\''
            | '"'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '-'
            | '/'
            | '\\'
            | '+'
            | '='
            | '%'
            | '#'
            | '@'
            | '&'
            | '*'
            | '_'
            | '<'
            | '>'
            | '~'
            | '`'
            | '|'
            | '^'
            | '$'
            | '°'
            | '²'
            | '³'
            | 'µ'
            | '«'
            | '»'
            | '€'
            | '£'
            | '\u{2013}' // En-dash –
            | '\u{2014}' // Em-dash —
            | '\u{2018}' // Left single quotation mark
            | '\u{2019}' // Right single quotation mark
            | '\u{201C}' // Left double quotation mark
            | '\u{201D}' // Right double quotation mark
            | '\u{2026}' // Ellipsis …
            | '\u{2022}' // Bullet •
            | '\u{00B7}' // Middle dot ·
    )
}

/// Letters, digits, whitespace or standard punctuation.
pub fn is_standard_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || is_standard_punctuation(c)
}

/// Clean text returned by a recovery tier before it is re-scored.
///
/// Removes Markdown code fences and control characters, trims lines and
/// collapses runs of blank lines. Unusual symbols are kept so that garbage
/// output is still caught by the analyzer.
pub fn sanitize_recovered_text(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = true;

    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    for line in cleaned.lines() {
        let line = line.trim();
        if line.starts_with("```") {
            continue;
        }
        if line.is_empty() {
            if !previous_blank {
                out.push("");
            }
            previous_blank = true;
            continue;
        }
        out.push(line);
        previous_blank = false;
    }

    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prose_characters_are_standard() {
        let text = "Results (n = 42) were significant: p < 0.05 \u{2014} see Fig. 3.";
        assert!(text.chars().all(is_standard_char));
    }

    #[test]
    fn accented_letters_are_standard() {
        assert!("Éléments de théorie «spectrale»".chars().all(is_standard_char));
    }

    #[test]
    fn glyph_garbage_is_not_standard() {
        for c in ['§', '†', '‡', '\u{FFFD}', '\u{E001}', '\u{25A1}'] {
            assert!(!is_standard_char(c), "{c:?} should be special");
        }
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```markdown\n# Introduction\nBody text.\n```";
        assert_eq!(sanitize_recovered_text(raw), "# Introduction\nBody text.");
    }

    #[test]
    fn strips_control_characters() {
        let raw = "Abstract\x00\x07 text\x1b here";
        let clean = sanitize_recovered_text(raw);
        assert_eq!(clean, "Abstract text here");
    }

    #[test]
    fn collapses_blank_runs() {
        let raw = "\n\nFirst paragraph.\n\n\n\nSecond paragraph.\n\n";
        assert_eq!(
            sanitize_recovered_text(raw),
            "First paragraph.\n\nSecond paragraph."
        );
    }

    #[test]
    fn keeps_special_symbols() {
        let clean = sanitize_recovered_text("§†‡ \u{FFFD}");
        assert!(clean.contains('§'));
        assert!(clean.contains('\u{FFFD}'));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(sanitize_recovered_text("").is_empty());
        assert!(sanitize_recovered_text("```\n```").is_empty());
    }
}
