use super::{CommandBuilder, resolution_preset};
use crate::error::CommandError;

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[test]
fn test_build_requires_input() {
    let err = CommandBuilder::new()
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap_err();
    assert_eq!(err, CommandError::MissingInput);

    let err = CommandBuilder::new()
        .input("")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap_err();
    assert_eq!(err, CommandError::MissingInput);
}

#[test]
fn test_build_requires_destinations() {
    let err = CommandBuilder::new().input("video.mp4").build().unwrap_err();
    assert_eq!(err, CommandError::MissingDestinations);
}

#[test]
fn test_build_defaults() {
    let args = CommandBuilder::new()
        .input("video.mp4")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap();

    assert_eq!(args[0], "-re");
    assert_eq!(value_after(&args, "-stream_loop"), Some("-1"));
    assert_eq!(value_after(&args, "-i"), Some("video.mp4"));
    assert_eq!(value_after(&args, "-preset"), Some("veryfast"));
    assert_eq!(value_after(&args, "-b:v"), Some("2500k"));
    assert_eq!(value_after(&args, "-maxrate"), Some("2500k"));
    assert_eq!(value_after(&args, "-minrate"), Some("2500k"));
    assert_eq!(value_after(&args, "-bufsize"), Some("5000k"));
    assert_eq!(value_after(&args, "-g"), Some("60"));
    assert_eq!(value_after(&args, "-r"), Some("30"));
    assert_eq!(value_after(&args, "-vf"), Some("scale=1280x720"));
    assert_eq!(value_after(&args, "-b:a"), Some("128k"));
    assert_eq!(value_after(&args, "-ar"), Some("44100"));
    assert_eq!(value_after(&args, "-ac"), Some("2"));
    assert_eq!(value_after(&args, "-f"), Some("tee"));
}

#[test]
fn test_build_custom_settings() {
    let args = CommandBuilder::new()
        .input("/data/uploads/clip.mp4")
        .bitrate(4000)
        .fps(60)
        .resolution("1920x1080")
        .loop_input(false)
        .preset("fast")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap();

    assert!(!args.iter().any(|a| a == "-stream_loop"));
    assert_eq!(value_after(&args, "-b:v"), Some("4000k"));
    assert_eq!(value_after(&args, "-bufsize"), Some("8000k"));
    assert_eq!(value_after(&args, "-g"), Some("120"));
    assert_eq!(value_after(&args, "-r"), Some("60"));
    assert_eq!(value_after(&args, "-vf"), Some("scale=1920x1080"));
    assert_eq!(value_after(&args, "-preset"), Some("fast"));
}

#[test]
fn test_build_zero_values_fall_back() {
    let args = CommandBuilder::new()
        .input("video.mp4")
        .bitrate(0)
        .fps(0)
        .resolution("")
        .preset(" ")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap();

    assert_eq!(value_after(&args, "-b:v"), Some("2500k"));
    assert_eq!(value_after(&args, "-g"), Some("60"));
    assert_eq!(value_after(&args, "-vf"), Some("scale=1280x720"));
    assert_eq!(value_after(&args, "-preset"), Some("veryfast"));
}

#[test]
fn test_build_preset_label_resolution() {
    let args = CommandBuilder::new()
        .input("video.mp4")
        .resolution("1080p")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap();
    assert_eq!(value_after(&args, "-vf"), Some("scale=1920x1080"));
}

#[test]
fn test_build_tee_fan_out_preserves_order() {
    let destinations = [
        "rtmp://a.rtmp.youtube.com/live2/key1",
        "rtmp://live.twitch.tv/app/key2",
        "rtmps://live-api-s.facebook.com:443/rtmp/key3",
    ];
    let args = CommandBuilder::new()
        .input("video.mp4")
        .destinations(destinations)
        .build()
        .unwrap();

    let tee = args.last().unwrap();
    let slots: Vec<&str> = tee.split('|').collect();
    assert_eq!(slots.len(), destinations.len());
    for (slot, url) in slots.iter().zip(destinations.iter()) {
        assert_eq!(*slot, format!("[f=flv:onfail=ignore]{}", url));
    }
}

#[test]
fn test_build_maps_video_and_audio() {
    let args = CommandBuilder::new()
        .input("video.mp4")
        .add_destination("rtmp://localhost/live/a")
        .build()
        .unwrap();
    let maps: Vec<&str> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "-map")
        .map(|(i, _)| args[i + 1].as_str())
        .collect();
    assert_eq!(maps, vec!["0:v", "0:a"]);
}

#[test]
fn test_resolution_preset_lookup() {
    let p = resolution_preset("1080P60").unwrap();
    assert_eq!(p.resolution, "1920x1080");
    assert_eq!(p.bitrate, 6000);
    assert_eq!(p.fps, 60);
    assert!(resolution_preset("4k").is_none());
}
