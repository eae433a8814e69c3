//! Parsers for `pactl` listing output.

use regex::Regex;
use std::sync::OnceLock;

/// One playback stream attached to a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkInput {
    pub index: u32,
    /// Index of the sink currently carrying this stream.
    pub sink: Option<u32>,
    pub application_name: String,
    pub process_binary: String,
    pub media_name: String,
    pub media_role: String,
}

/// Application identifiers that mark a stream as meeting-browser output.
const BROWSER_MARKERS: &[&str] = &["chrome", "chromium", "firefox", "webrtc"];

impl SinkInput {
    /// Whether this stream looks like the meeting browser: a known browser
    /// binary or name, or a call-media role tag.
    pub fn is_browser_stream(&self) -> bool {
        let name = self.application_name.to_lowercase();
        let binary = self.process_binary.to_lowercase();
        if BROWSER_MARKERS
            .iter()
            .any(|marker| name.contains(marker) || binary.contains(marker))
        {
            return true;
        }
        self.media_role.eq_ignore_ascii_case("phone")
    }
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Sink Input #(\d+)").unwrap())
}

fn sink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*Sink:\s*(\d+)").unwrap())
}

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*([A-Za-z0-9._-]+)\s*=\s*"(.*)""#).unwrap())
}

/// Parse the long-form `pactl list sink-inputs` listing into stream records.
/// Unknown properties are skipped; a malformed block yields a record with
/// whatever fields did parse.
pub fn parse_sink_inputs(output: &str) -> Vec<SinkInput> {
    let mut inputs = Vec::new();
    let mut current: Option<SinkInput> = None;

    for line in output.lines() {
        if let Some(caps) = header_re().captures(line) {
            if let Some(done) = current.take() {
                inputs.push(done);
            }
            current = Some(SinkInput {
                index: caps[1].parse().unwrap_or(0),
                ..Default::default()
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = sink_re().captures(line) {
            entry.sink = caps[1].parse().ok();
            continue;
        }

        if let Some(caps) = property_re().captures(line) {
            let value = caps[2].to_string();
            match &caps[1] {
                "application.name" => entry.application_name = value,
                "application.process.binary" => entry.process_binary = value,
                "media.name" => entry.media_name = value,
                "media.role" => entry.media_role = value,
                _ => {}
            }
        }
    }

    if let Some(done) = current.take() {
        inputs.push(done);
    }
    inputs
}

/// Whether a `pactl list short ...` listing names `name` in its name column.
pub fn short_list_contains(output: &str, name: &str) -> bool {
    short_list_index(output, name).is_some()
}

/// Index column of the short-listing row whose name column equals `name`.
pub fn short_list_index(output: &str, name: &str) -> Option<u32> {
    for line in output.lines() {
        let mut columns = line.split('\t');
        let index = columns.next()?.trim();
        if columns.next() == Some(name) {
            return index.parse().ok();
        }
    }
    None
}
