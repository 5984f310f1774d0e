//! In-game text formatting.
//!
//! Messages sent with `say` or `sv cprint` may carry formatting control
//! characters. Callers write them as templates:
//!
//! | Template | Wire char | Meaning |
//! |---|---|---|
//! | `{C}` | `0x88` | colour (the next character selects the colour) |
//! | `{U}` | `0x86` | underline toggle |
//! | `{I}` | `0x87` | italic toggle |
//! | `{{` / `}}` | `{` / `}` | literal braces |
//!
//! [`render`] turns a template into wire text and [`decode`] is its exact
//! inverse, so `decode(&render(t)) == t` for every template in which each
//! brace is either doubled or part of a marker. The log parser runs every
//! captured nick and message through [`decode`], which means values coming
//! out of events can be fed back into [`render`] unchanged.

/// Colour control character.
pub const COLOR: char = '\u{88}';
/// Underline control character.
pub const UNDERLINE: char = '\u{86}';
/// Italic control character.
pub const ITALIC: char = '\u{87}';

/// Renders a formatting template into wire text.
///
/// Unrecognized or unbalanced braces are passed through literally.
pub fn render(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut lookahead = chars.clone();
                match (lookahead.next(), lookahead.next()) {
                    (Some('{'), _) => {
                        chars.next();
                        out.push('{');
                    }
                    (Some(marker @ ('C' | 'U' | 'I')), Some('}')) => {
                        chars.next();
                        chars.next();
                        out.push(match marker {
                            'C' => COLOR,
                            'U' => UNDERLINE,
                            _ => ITALIC,
                        });
                    }
                    _ => out.push('{'),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }

    out
}

/// Converts wire text back into template form.
pub fn decode(wire: &str) -> String {
    let mut out = String::with_capacity(wire.len());
    for c in wire.chars() {
        match c {
            COLOR => out.push_str("{C}"),
            UNDERLINE => out.push_str("{U}"),
            ITALIC => out.push_str("{I}"),
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            other => out.push(other),
        }
    }
    out
}

/// Escapes braces in user input so it renders literally.
pub fn escape_braces(input: &str) -> String {
    input.replace('{', "{{").replace('}', "}}")
}

/// Removes all formatting from wire text.
///
/// A colour character consumes the code character that follows it.
pub fn strip_formatting(wire: &str) -> String {
    let mut out = String::with_capacity(wire.len());
    let mut chars = wire.chars();
    while let Some(c) = chars.next() {
        match c {
            COLOR => {
                chars.next();
            }
            UNDERLINE | ITALIC => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_markers() {
        assert_eq!(render("{C}ARed"), "\u{88}ARed");
        assert_eq!(render("{U}u{U}"), "\u{86}u\u{86}");
        assert_eq!(render("{I}i"), "\u{87}i");
    }

    #[test]
    fn test_render_escaped_braces() {
        assert_eq!(render("{{x}}"), "{x}");
    }

    #[test]
    fn test_render_passes_unknown_braces_through() {
        assert_eq!(render("{X} {"), "{X} {");
    }

    #[test]
    fn test_decode_inverts_render() {
        let templates = [
            "plain",
            "{C}AHi {U}there{U}",
            "{{braces}} and {I}italic{I}",
            "",
            "ünïcödé-latin1 ÿ",
        ];
        for t in templates {
            assert_eq!(decode(&render(t)), t, "round trip of {t:?}");
        }
    }

    #[test]
    fn test_escape_braces_renders_literally() {
        let user = "{C}not a colour";
        assert_eq!(render(&escape_braces(user)), user);
    }

    #[test]
    fn test_strip_formatting_drops_colour_code() {
        assert_eq!(strip_formatting(&render("{C}9hel{U}lo{U}")), "hello");
    }
}
