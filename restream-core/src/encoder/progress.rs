use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Point-in-time decode of one encoder status line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub frame: u64,
    pub fps: f64,
    pub time: String,
    pub bitrate: String,
    pub speed: f64,
}

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static FPS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"fps=\s*([\d.]+)").unwrap());
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"time=\s*([\d:.]+)").unwrap());
static BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate=\s*([\d.kM]+bits/s)").unwrap());
static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"speed=\s*([\d.]+)x").unwrap());

/// Returns `None` unless the line carries both a `frame=` and a `time=`
/// marker. Fields that fail to match individually stay at their zero value.
pub fn parse_progress(line: &str) -> Option<Progress> {
    if !line.contains("frame=") || !line.contains("time=") {
        return None;
    }

    Some(Progress {
        frame: capture(&FRAME_RE, line)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        fps: capture(&FPS_RE, line)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        time: capture(&TIME_RE, line).unwrap_or_default().to_string(),
        bitrate: capture(&BITRATE_RE, line).unwrap_or_default().to_string(),
        speed: capture(&SPEED_RE, line)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
    })
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}
