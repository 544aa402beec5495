use serde::Deserialize;

/// One newline-delimited JSON record from the inference backend.
///
/// Only the text delta and the completion flag matter here; the backend's
/// other fields (model, timestamps, context, timing counters) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

impl Fragment {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn words(&self) -> std::str::SplitWhitespace<'_> {
        self.response.split_whitespace()
    }
}

/// Splits decoded text into lines, carrying a trailing partial line over to
/// the next push.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every complete, non-blank line the buffered text now holds.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The unterminated final line, if the stream ended without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.partial);
        let line = line.trim_end_matches('\r');
        (!line.trim().is_empty()).then(|| line.to_owned())
    }
}
