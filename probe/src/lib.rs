use std::num::ParseFloatError;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{instrument, trace};

const DEFAULT_PROGRAM: &str = "ffprobe";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),
    #[error("probe exited with status code: {0:?}")]
    Status(Option<i32>),
    #[error("no {0} found")]
    None(&'static str),
    #[error("invalid duration: {0}")]
    InvalidDuration(f64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<Format>,
}

#[derive(Debug, Deserialize)]
struct Format {
    duration: Option<String>,
}

/// Reads container metadata through an external `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct Prober {
    program: PathBuf,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
        }
    }
}

impl Prober {
    pub fn new<P>(program: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            program: program.into(),
        }
    }

    /// Returns the duration of the media file at `path` in whole seconds.
    #[instrument(skip(self), err)]
    pub async fn duration(&self, path: &Path) -> Result<u32> {
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::Status(output.status.code()));
        }
        trace!("probe returned {} bytes", output.stdout.len());
        parse_duration(&output.stdout)
    }
}

fn parse_duration(stdout: &[u8]) -> Result<u32> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let raw = output
        .format
        .and_then(|f| f.duration)
        .ok_or(Error::None("format duration"))?;
    let seconds: f64 = raw.trim().parse()?;
    if !seconds.is_finite() || seconds < 0.0 || seconds > f64::from(u32::MAX) {
        return Err(Error::InvalidDuration(seconds));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(seconds.trunc() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_truncates_fraction() {
        let input = br#"{"format": {"filename": "a.mp4", "duration": "5423.876000"}}"#;
        assert_eq!(parse_duration(input).unwrap(), 5423);
    }

    #[test]
    fn test_parse_duration_missing_format() {
        let input = br#"{"streams": []}"#;
        assert!(matches!(parse_duration(input), Err(Error::None(_))));
    }

    #[test]
    fn test_parse_duration_not_a_number() {
        let input = br#"{"format": {"duration": "N/A"}}"#;
        assert!(matches!(parse_duration(input), Err(Error::ParseFloat(_))));
    }

    #[test]
    fn test_parse_duration_negative() {
        let input = br#"{"format": {"duration": "-1.0"}}"#;
        assert!(matches!(
            parse_duration(input),
            Err(Error::InvalidDuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let prober = Prober::new("/nonexistent/ffprobe-binary");
        let result = prober.duration(Path::new("/tmp/none.mp4")).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
