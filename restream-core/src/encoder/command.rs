use std::path::{Path, PathBuf};

use crate::error::CommandError;

pub const DEFAULT_BITRATE_KBPS: u32 = 2500;
pub const DEFAULT_RESOLUTION: &str = "1280x720";
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_PRESET: &str = "veryfast";

const AUDIO_BITRATE: &str = "128k";
const AUDIO_SAMPLE_RATE: &str = "44100";
const AUDIO_CHANNELS: &str = "2";

/// Frame size, bitrate and frame rate bundled under a preset label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    pub resolution: &'static str,
    pub bitrate: u32,
    pub fps: u32,
}

const PRESETS: &[(&str, StreamSettings)] = &[
    (
        "360p",
        StreamSettings {
            resolution: "640x360",
            bitrate: 800,
            fps: 30,
        },
    ),
    (
        "480p",
        StreamSettings {
            resolution: "854x480",
            bitrate: 1500,
            fps: 30,
        },
    ),
    (
        "720p",
        StreamSettings {
            resolution: "1280x720",
            bitrate: 2500,
            fps: 30,
        },
    ),
    (
        "1080p",
        StreamSettings {
            resolution: "1920x1080",
            bitrate: 4500,
            fps: 30,
        },
    ),
    (
        "1080p60",
        StreamSettings {
            resolution: "1920x1080",
            bitrate: 6000,
            fps: 60,
        },
    ),
];

/// Look up a resolution preset by label ("720p", "1080p60", ...).
pub fn resolution_preset(label: &str) -> Option<StreamSettings> {
    let label = label.trim().to_ascii_lowercase();
    PRESETS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, settings)| *settings)
}

/// Builds the encoder argument vector for one input fanned out to every
/// destination through the tee muxer.
///
/// Pure: nothing is spawned here.
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    input: Option<PathBuf>,
    bitrate: u32,
    resolution: String,
    fps: u32,
    loop_input: bool,
    destinations: Vec<String>,
    preset: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self {
            input: None,
            bitrate: DEFAULT_BITRATE_KBPS,
            resolution: DEFAULT_RESOLUTION.to_string(),
            fps: DEFAULT_FPS,
            loop_input: true,
            destinations: Vec::new(),
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.input = Some(path.as_ref().to_path_buf());
        self
    }

    /// Target video bitrate in kbps; 0 keeps the default.
    pub fn bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = kbps;
        self
    }

    /// Either `WxH` or a preset label such as `720p`.
    pub fn resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn loop_input(mut self, enabled: bool) -> Self {
        self.loop_input = enabled;
        self
    }

    pub fn destinations<I, S>(mut self, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destinations = destinations.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_destination(mut self, url: impl Into<String>) -> Self {
        self.destinations.push(url.into());
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn build(&self) -> Result<Vec<String>, CommandError> {
        let input = match &self.input {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => return Err(CommandError::MissingInput),
        };
        if self.destinations.is_empty() {
            return Err(CommandError::MissingDestinations);
        }

        let bitrate = if self.bitrate == 0 {
            DEFAULT_BITRATE_KBPS
        } else {
            self.bitrate
        };
        let fps = if self.fps == 0 { DEFAULT_FPS } else { self.fps };
        let preset = match self.preset.trim() {
            "" => DEFAULT_PRESET,
            p => p,
        };

        let mut args: Vec<String> = vec!["-re".into()];
        if self.loop_input {
            args.extend(["-stream_loop".into(), "-1".into()]);
        }
        args.extend([
            "-thread_queue_size".into(),
            "1024".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
        ]);

        let rate = format!("{}k", bitrate);
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            preset.to_string(),
            "-tune".into(),
            "zerolatency".into(),
            "-profile:v".into(),
            "high".into(),
            "-b:v".into(),
            rate.clone(),
            "-maxrate".into(),
            rate.clone(),
            "-minrate".into(),
            rate,
            "-bufsize".into(),
            format!("{}k", bitrate * 2),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-g".into(),
            (fps * 2).to_string(),
            "-r".into(),
            fps.to_string(),
            "-vf".into(),
            format!("scale={}", self.frame_size()),
        ]);

        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-ac".into(),
            AUDIO_CHANNELS.into(),
            "-ar".into(),
            AUDIO_SAMPLE_RATE.into(),
            "-b:a".into(),
            AUDIO_BITRATE.into(),
        ]);

        args.extend([
            "-f".into(),
            "tee".into(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "0:a".into(),
            tee_target(&self.destinations),
        ]);

        Ok(args)
    }

    fn frame_size(&self) -> String {
        let resolution = self.resolution.trim();
        if resolution.is_empty() {
            return DEFAULT_RESOLUTION.to_string();
        }
        match resolution_preset(resolution) {
            Some(settings) => settings.resolution.to_string(),
            None => resolution.to_string(),
        }
    }
}

/// One `[f=flv:onfail=ignore]<url>` slot per destination, so a failing
/// destination is dropped without tearing down the others.
fn tee_target(destinations: &[String]) -> String {
    destinations
        .iter()
        .map(|url| format!("[f=flv:onfail=ignore]{}", url))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
#[path = "command_test.rs"]
mod command_test;
