//! Output-format specific muxer options.

/// Format name of the segmented adaptive-streaming muxer.
pub const DASH: &str = "dash";
pub const FLV: &str = "flv";
pub const MP4: &str = "mp4";

/// Ordered option dictionary handed to the muxer when the header is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxOptions {
    entries: Vec<(String, String)>,
}

impl MuxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, keeping the position of an existing entry.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MuxOptions {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut options = MuxOptions::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

/// Live DASH tuning: chunked PUT upload, 5s segments, a 5 segment window.
const DASH_OPTIONS: &[(&str, &str)] = &[
    ("method", "PUT"),
    ("streaming", "1"),
    ("seg_duration", "5"),
    ("http_persistent", "1"),
    ("utc_timing_url", "https://time.akamai.com/?iso"),
    ("index_correction", "1"),
    ("use_timeline", "0"),
    (
        "media_seg_name",
        "chunk-stream$RepresentationID$-$Number%05d$.m4s",
    ),
    ("init_seg_name", "init-stream$RepresentationID$.m4s"),
    ("window_size", "5"),
    ("extra_window_size", "10"),
    ("remove_at_exit", "1"),
    ("adaptation_sets", "id=0,streams=v id=1,streams=a"),
];

/// Returns the options `format` needs. Only DASH has any.
pub fn resolve(format: &str) -> MuxOptions {
    match format {
        DASH => DASH_OPTIONS.iter().copied().collect(),
        _ => MuxOptions::new(),
    }
}

/// Picks the output format from the shape of the destination locator.
/// `http` anywhere in the locator wins over `rtmp`.
pub fn format_for_destination(destination: &str) -> &'static str {
    if destination.contains("http") {
        DASH
    } else if destination.contains("rtmp") {
        FLV
    } else {
        MP4
    }
}
