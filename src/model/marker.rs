//! Processing Marker embedded in the container comment tag.
//!
//! Layout inside the comment:
//!
//! ```text
//! <existing comment lines>
//! Automatic media compression processed
//! amcp_ver=0.1.0
//! amcp_input_filesize=52428800
//! amcp_input_file_md5=...
//! amcp_encoded_date=1700000000
//! AMCP_END
//! ```
//!
//! Older files may carry only the start line, with no fields and no end line.

/// Start sentinel (a line starting with this opens the marker)
pub const PROCESSOR_NAME: &str = "Automatic media compression processed";
/// End sentinel
pub const MARKER_END: &str = "AMCP_END";
/// Written into `amcp_ver`
pub const MARKER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const KEY_VERSION: &str = "amcp_ver";
pub const KEY_INPUT_SIZE: &str = "amcp_input_filesize";
pub const KEY_INPUT_MD5: &str = "amcp_input_file_md5";
pub const KEY_ENCODED_DATE: &str = "amcp_encoded_date";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingMarker {
    fields: Vec<(String, String)>,
}

impl ProcessingMarker {
    /// Marker describing the input about to be encoded
    pub fn fresh(input_size: u64, input_md5: &str, encoded_at: u64) -> Self {
        Self {
            fields: vec![
                (KEY_VERSION.to_string(), MARKER_VERSION.to_string()),
                (KEY_INPUT_SIZE.to_string(), input_size.to_string()),
                (KEY_INPUT_MD5.to_string(), input_md5.to_string()),
                (KEY_ENCODED_DATE.to_string(), encoded_at.to_string()),
            ],
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Marker block without surrounding comment text
    pub fn render(&self) -> String {
        if self.fields.is_empty() {
            return PROCESSOR_NAME.to_string();
        }

        let mut block = String::from(PROCESSOR_NAME);
        for (key, value) in &self.fields {
            block.push('\n');
            block.push_str(key);
            block.push('=');
            block.push_str(value);
        }
        block.push('\n');
        block.push_str(MARKER_END);
        block
    }

    fn parse_fields<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<(String, String)> {
        lines
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect()
    }
}

/// A comment split into user text and (optionally) the marker
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedComment {
    /// Non-marker lines, verbatim and in order
    pub lines: Vec<String>,
    pub marker: Option<ProcessingMarker>,
}

impl ParsedComment {
    /// Comment text with `marker` appended after the preserved lines
    pub fn render_with(&self, marker: &ProcessingMarker) -> String {
        let text = self.lines.join("\n");
        if text.trim().is_empty() {
            marker.render()
        } else {
            format!("{}\n{}", text, marker.render())
        }
    }
}

/// Split a comment tag into user lines and the processing marker
pub fn parse_comment(comment: &str) -> ParsedComment {
    let lines: Vec<&str> = comment.lines().collect();

    let Some(start) = lines.iter().position(|l| l.starts_with(PROCESSOR_NAME)) else {
        return ParsedComment {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            marker: None,
        };
    };

    let end = lines[start + 1..]
        .iter()
        .position(|l| l.starts_with(MARKER_END))
        .map(|offset| start + 1 + offset);

    match end {
        Some(end) => {
            let fields = ProcessingMarker::parse_fields(lines[start + 1..end].iter().copied());
            let kept = lines[..start].iter().chain(lines[end + 1..].iter());
            ParsedComment {
                lines: kept.map(|l| l.to_string()).collect(),
                marker: Some(ProcessingMarker { fields }),
            }
        }
        None => ParsedComment {
            lines: lines[..start].iter().map(|l| l.to_string()).collect(),
            marker: Some(ProcessingMarker::default()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_into_empty_comment() {
        let marker = ProcessingMarker::fresh(1024, "abc123", 1_700_000_000);
        let rendered = ParsedComment::default().render_with(&marker);
        assert!(rendered.starts_with(PROCESSOR_NAME));
        assert!(rendered.ends_with(MARKER_END));

        let parsed = parse_comment(&rendered);
        assert!(parsed.lines.is_empty());
        assert_eq!(parsed.marker.as_ref(), Some(&marker));
        assert_eq!(parsed.marker.unwrap().get(KEY_INPUT_SIZE), Some("1024"));
    }

    #[test]
    fn test_user_text_preserved_around_marker() {
        let comment = format!(
            "first line\n{} v1\nAMCP_VER = 0.0.9 \namcp_input_filesize=10\n{}\ntrailing note",
            PROCESSOR_NAME, MARKER_END
        );
        let parsed = parse_comment(&comment);
        assert_eq!(parsed.lines, vec!["first line", "trailing note"]);

        let marker = parsed.marker.clone().unwrap();
        assert_eq!(marker.get("amcp_ver"), Some("0.0.9"));
        assert_eq!(marker.get("amcp_input_filesize"), Some("10"));

        let rendered = parsed.render_with(&marker);
        assert!(rendered.starts_with("first line\ntrailing note\n"));
    }

    #[test]
    fn test_legacy_marker_without_end() {
        let comment = format!("keep me\n{}", PROCESSOR_NAME);
        let parsed = parse_comment(&comment);
        assert_eq!(parsed.lines, vec!["keep me"]);
        assert_eq!(parsed.marker, Some(ProcessingMarker::default()));
        assert_eq!(ProcessingMarker::default().render(), PROCESSOR_NAME);
    }

    #[test]
    fn test_no_marker() {
        let parsed = parse_comment("just a comment\nover two lines");
        assert_eq!(parsed.marker, None);
        assert_eq!(parsed.lines.len(), 2);
    }

    #[test]
    fn test_windows_line_endings() {
        let comment = format!("{}\r\namcp_ver=1\r\n{}\r\n", PROCESSOR_NAME, MARKER_END);
        let parsed = parse_comment(&comment);
        assert_eq!(parsed.marker.unwrap().get("amcp_ver"), Some("1"));
    }
}
