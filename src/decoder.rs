use serde::Serialize;

use crate::config::DEFAULT_PAYLOAD_WIDTH;

const ESCAPE: char = '\x1b';
const TAB: char = '\t';
const ATTRIBUTE_TOKEN: (usize, &str) = (2, "Attribute");
const VALUE_TOKEN: (usize, &str) = (4, "Value:");
const ATTRIBUTE_PATH_INDEX: usize = 3;

/// Removes escape and tab characters, keeping everything else in order.
///
/// What survives of an ANSI sequence (`[0;94m`) is left in place; the structured
/// parsers only rely on the escape byte being gone.
#[must_use]
pub fn clean(raw: &str) -> String {
    raw.chars().filter(|c| *c != ESCAPE && *c != TAB).collect()
}

/// One validated notification frame.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DataFrame {
    attribute: String,
    payload: String,
}

impl DataFrame {
    /// Object path of the attribute that produced the notification.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Hex payload, opaque beyond its fixed width.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Result of one notification poll.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PollOutcome {
    Frame(DataFrame),
    /// The response was not a notification frame; skip it.
    Invalid,
}

/// Extracts payloads from cleaned notification responses.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamDecoder {
    payload_width: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_WIDTH)
    }
}

impl StreamDecoder {
    /// Creates a decoder keeping the last `payload_width` hex digits of a frame.
    #[must_use]
    pub fn new(payload_width: usize) -> Self {
        Self { payload_width }
    }

    /// Drops spaces from a payload line and keeps its trailing window.
    ///
    /// Lines shorter than the window are returned whole.
    #[must_use]
    pub fn extract_payload(&self, line: &str) -> String {
        let compact: Vec<char> = line.chars().filter(|c| *c != ' ').collect();
        let start = compact.len().saturating_sub(self.payload_width);
        compact[start..].iter().collect()
    }

    /// Validates a cleaned response and decodes it into a frame.
    ///
    /// A frame is exactly three lines whose first line carries `Attribute` and
    /// `Value:` at fixed whitespace-token offsets.
    #[must_use]
    pub fn decode(&self, lines: &[String]) -> PollOutcome {
        let [header, payload_line, _prompt] = lines else {
            return PollOutcome::Invalid;
        };

        let tokens: Vec<&str> = header.split_whitespace().collect();
        let token_matches = |(index, expected): (usize, &str)| {
            tokens.get(index).is_some_and(|token| *token == expected)
        };
        if !token_matches(ATTRIBUTE_TOKEN) || !token_matches(VALUE_TOKEN) {
            return PollOutcome::Invalid;
        }

        PollOutcome::Frame(DataFrame {
            attribute: tokens
                .get(ATTRIBUTE_PATH_INDEX)
                .map(|path| (*path).to_string())
                .unwrap_or_default(),
            payload: self.extract_payload(payload_line),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|line| (*line).to_string()).collect()
    }

    #[test]
    fn clean_drops_escape_and_tab_only() {
        let raw = "\x1b[0;94m[WaWiCo]\x1b[0m#\tValue:";

        let cleaned = clean(raw);

        assert_eq!("[0;94m[WaWiCo][0m#Value:", cleaned);
        assert_eq!(raw.chars().count() - 3, cleaned.chars().count());
    }

    #[test]
    fn extract_payload_keeps_sixteen_hex_digits() {
        let decoder = StreamDecoder::default();

        let payload = decoder.extract_payload("   value: 0a 1b 2c 3d 4e 5f 60 71");

        assert_eq!("0a1b2c3d4e5f6071", payload);
        assert_eq!(16, payload.len());
    }

    #[rstest]
    #[case::narrow(4, "  0a 1b 2c", "1b2c")]
    #[case::short_line(16, " 0a 1b", "0a1b")]
    fn extract_payload_honours_width(#[case] width: usize, #[case] line: &str, #[case] expected: &str) {
        assert_eq!(expected, StreamDecoder::new(width).extract_payload(line));
    }

    #[test]
    fn decode_accepts_attribute_value_frame() {
        let response = lines(&[
            "]# [CHG] Attribute /org/bluez/hci0/dev_AA/service000c/char000d Value:",
            "  0a 1b 2c 3d 4e 5f 60 71",
            "[",
        ]);

        let outcome = StreamDecoder::default().decode(&response);

        assert_matches!(outcome, PollOutcome::Frame(frame) => {
            assert_eq!("0a1b2c3d4e5f6071", frame.payload());
            assert_eq!("/org/bluez/hci0/dev_AA/service000c/char000d", frame.attribute());
        });
    }

    #[rstest]
    #[case::two_lines(&["]# ", "["])]
    #[case::four_lines(&["]# ", "[CHG] Attribute /a Value:", "  0a 1b", "["])]
    #[case::wrong_tokens(&["]# [CHG] Device AA:BB Connected: no", "  0a 1b", "["])]
    #[case::short_header(&["]# [CHG] Attribute", "  0a 1b", "["])]
    fn decode_rejects_other_shapes(#[case] response: &[&str]) {
        assert_eq!(PollOutcome::Invalid, StreamDecoder::default().decode(&lines(response)));
    }
}
