use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};

use serde_json::Value;
use tracing::debug;

/// Measures the playable length of a media file in seconds.
///
/// Implementations must not fail loudly: any corrupt, unsupported or
/// unreadable file yields `None`.
pub(crate) trait DurationProbe: Sync {
    fn probe(&self, path: &Path) -> Option<f64>;
}

/// Shells out to `ffprobe` and reads the container duration from its JSON.
pub(crate) struct FfprobeProbe {
    binary: PathBuf,
}

impl FfprobeProbe {
    pub(crate) fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl DurationProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Option<f64> {
        let output = ProcessCommand::new(&self.binary)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "failed to launch ffprobe");
                return None;
            }
        };
        if !output.status.success() {
            debug!(path = %path.display(), status = %output.status, "ffprobe exited unsuccessfully");
            return None;
        }

        let raw = String::from_utf8(output.stdout).ok()?;
        parse_ffprobe_duration(&raw)
    }
}

pub(crate) fn parse_ffprobe_duration(raw: &str) -> Option<f64> {
    let parsed: Value = serde_json::from_str(raw).ok()?;

    if let Some(seconds) = parsed.pointer("/format/duration").and_then(duration_value) {
        return Some(seconds);
    }

    parsed
        .get("streams")?
        .as_array()?
        .iter()
        .filter(|stream| stream.get("codec_type").and_then(Value::as_str) == Some("video"))
        .find_map(|stream| stream.get("duration").and_then(duration_value))
}

fn duration_value(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}
