//! Application constants

use crate::models::PlatformSpec;

/// Maximum upload size for source videos (200 MB)
pub const MAX_VIDEO_UPLOAD_SIZE: usize = 200 * 1024 * 1024;

/// Maximum number of hashtags kept per generated caption
pub const MAX_HASHTAGS: usize = 5;

/// Dimensions used for platforms without an entry in the size table
pub const FALLBACK_SPEC: PlatformSpec = PlatformSpec {
    width: 720,
    height: 720,
};

/// Resolve a platform id to its target output dimensions.
///
/// Unknown ids get the square fallback spec rather than an error, so a job
/// requesting a platform we have no preset for still renders something usable.
pub fn platform_spec(platform: &str) -> PlatformSpec {
    match platform {
        // 9:16 vertical
        "instagram" => PlatformSpec {
            width: 720,
            height: 1280,
        },
        // 16:9 horizontal
        "youtube" => PlatformSpec {
            width: 1280,
            height: 720,
        },
        // 4:5 portrait
        "twitter" | "linkedin" => PlatformSpec {
            width: 720,
            height: 900,
        },
        // 16:9 horizontal, same as youtube
        "facebook" => PlatformSpec {
            width: 1280,
            height: 720,
        },
        _ => FALLBACK_SPEC,
    }
}
