use serde::{Deserialize, Serialize};
use uuid::Uuid;

const YOUTUBE_BASE: &str = "rtmp://a.rtmp.youtube.com/live2";
const TWITCH_BASE: &str = "rtmp://live.twitch.tv/app";
const FACEBOOK_BASE: &str = "rtmps://live-api-s.facebook.com:443/rtmp";

/// A configured streaming platform account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: Uuid,
    pub name: String,
    pub platform_type: String,
    pub stream_key: String,
    #[serde(default)]
    pub custom_url: String,
    pub enabled: bool,
}

impl Platform {
    pub fn destination(&self) -> Option<String> {
        resolve_destination(&self.platform_type, &self.custom_url, &self.stream_key)
    }
}

/// Well-known ingest base for a platform type.
pub fn default_base(platform_type: &str) -> Option<&'static str> {
    match platform_type.trim().to_ascii_lowercase().as_str() {
        "youtube" => Some(YOUTUBE_BASE),
        "twitch" => Some(TWITCH_BASE),
        "facebook" => Some(FACEBOOK_BASE),
        _ => None,
    }
}

/// Fully qualified RTMP(S) URL for a platform record, or `None` when
/// neither a custom base nor a default base is available.
pub fn resolve_destination(platform_type: &str, base_url: &str, stream_key: &str) -> Option<String> {
    let base = match base_url.trim() {
        "" => default_base(platform_type)?,
        custom => custom,
    };
    let key = stream_key.trim();

    if key.is_empty() {
        Some(base.to_string())
    } else if base.ends_with('/') {
        Some(format!("{}{}", base, key))
    } else {
        Some(format!("{}/{}", base, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bases() {
        assert_eq!(
            resolve_destination("YouTube", "", "abcd").as_deref(),
            Some("rtmp://a.rtmp.youtube.com/live2/abcd")
        );
        assert_eq!(
            resolve_destination("twitch", "", " live_1 ").as_deref(),
            Some("rtmp://live.twitch.tv/app/live_1")
        );
        assert_eq!(
            resolve_destination("facebook", "", "FB-1").as_deref(),
            Some("rtmps://live-api-s.facebook.com:443/rtmp/FB-1")
        );
    }

    #[test]
    fn test_custom_base_wins() {
        assert_eq!(
            resolve_destination("youtube", "rtmp://ingest.example.com/live/", "key").as_deref(),
            Some("rtmp://ingest.example.com/live/key")
        );
        assert_eq!(
            resolve_destination("custom", "rtmp://ingest.example.com/live", "").as_deref(),
            Some("rtmp://ingest.example.com/live")
        );
    }

    #[test]
    fn test_unknown_platform_without_base() {
        assert_eq!(resolve_destination("custom", "", "key"), None);
        let platform = Platform {
            id: Uuid::new_v4(),
            name: "mine".into(),
            platform_type: "kick".into(),
            stream_key: "k".into(),
            custom_url: String::new(),
            enabled: true,
        };
        assert_eq!(platform.destination(), None);
    }
}
