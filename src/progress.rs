//! Generation progress reporting.
//!
//! Reports observable progress during `lpress generate` so users see which
//! stage of the pipeline is running and how many products were found.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for one generation request.
#[derive(Clone, Debug)]
pub enum GenerateProgressEvent {
    /// Deriving search parameters from the prompt.
    Extracting,
    /// Product search in flight.
    Fetching { query: String },
    /// Product search returned `count` products.
    Fetched { count: u64 },
    /// Waiting for the completion call.
    Generating { model: String },
    /// Normalizing and placing product cards.
    Assembling,
    /// Finished; `cards` product cards are in the output.
    Done { cards: u64 },
}

impl GenerateProgressEvent {
    fn phase(&self) -> &'static str {
        match self {
            GenerateProgressEvent::Extracting => "extracting",
            GenerateProgressEvent::Fetching { .. } => "fetching",
            GenerateProgressEvent::Fetched { .. } => "fetched",
            GenerateProgressEvent::Generating { .. } => "generating",
            GenerateProgressEvent::Assembling => "assembling",
            GenerateProgressEvent::Done { .. } => "done",
        }
    }
}

/// Reports generation progress. Implementations write to stderr (human or JSON).
pub trait GenerateProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline.
    fn report(&self, event: GenerateProgressEvent);
}

/// Human-friendly progress on stderr: "generate  fetched  12 products".
pub struct StderrProgress;

impl GenerateProgressReporter for StderrProgress {
    fn report(&self, event: GenerateProgressEvent) {
        let line = match &event {
            GenerateProgressEvent::Fetching { query } => {
                format!("generate  fetching  \"{}\"\n", query)
            }
            GenerateProgressEvent::Fetched { count } => {
                format!("generate  fetched  {} products\n", format_number(*count))
            }
            GenerateProgressEvent::Generating { model } => {
                format!("generate  generating  ({})\n", model)
            }
            GenerateProgressEvent::Done { cards } => {
                format!("generate  done  {} product cards\n", format_number(*cards))
            }
            other => format!("generate  {}...\n", other.phase()),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl GenerateProgressReporter for JsonProgress {
    fn report(&self, event: GenerateProgressEvent) {
        let mut obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase(),
        });
        match &event {
            GenerateProgressEvent::Fetching { query } => obj["query"] = query.as_str().into(),
            GenerateProgressEvent::Fetched { count } => obj["count"] = (*count).into(),
            GenerateProgressEvent::Generating { model } => obj["model"] = model.as_str().into(),
            GenerateProgressEvent::Done { cards } => obj["cards"] = (*cards).into(),
            _ => {}
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl GenerateProgressReporter for NoProgress {
    fn report(&self, _event: GenerateProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value; `None` means "pick for the TTY".
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") | Some("none") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => anyhow::bail!(
                "unknown progress mode '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    /// Build a reporter for this mode. Caller passes it to the pipeline.
    pub fn reporter(&self) -> Box<dyn GenerateProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_flag_values() {
        assert_eq!(ProgressMode::from_flag(Some("json")).unwrap(), ProgressMode::Json);
        assert_eq!(ProgressMode::from_flag(Some("off")).unwrap(), ProgressMode::Off);
        assert!(ProgressMode::from_flag(Some("loud")).is_err());
    }

    #[test]
    fn phases_are_stable() {
        assert_eq!(GenerateProgressEvent::Fetched { count: 3 }.phase(), "fetched");
        assert_eq!(GenerateProgressEvent::Done { cards: 10 }.phase(), "done");
    }
}
