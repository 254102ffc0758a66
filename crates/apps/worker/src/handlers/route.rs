use app_state::MediaSettings;
use common_types::{EventKind, MediaKind};

/// Where an object event is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Image,
    Video,
    Transcribe,
    Cleanup,
    Skip(&'static str),
}

/// Decides the handler for an object event by extension and event kind only.
///
/// Keys under `derived_prefix` were written by the pipeline itself and are never routed.
#[must_use]
pub fn route(
    media: &MediaSettings,
    derived_prefix: &str,
    object_key: &str,
    event_kind: EventKind,
) -> Route {
    if !derived_prefix.is_empty() && object_key.starts_with(derived_prefix) {
        return Route::Skip("object was derived by this pipeline");
    }
    if event_kind == EventKind::Removed {
        return Route::Cleanup;
    }
    match media.classify(object_key) {
        MediaKind::Image => Route::Image,
        MediaKind::Video => Route::Video,
        MediaKind::Audio => Route::Transcribe,
        MediaKind::Page => Route::Skip("pages are handled by the text pipeline"),
        MediaKind::Unknown => Route::Skip("unsupported file type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_default(key: &str, event_kind: EventKind) -> Route {
        route(&MediaSettings::default(), "_derived/", key, event_kind)
    }

    #[test]
    fn creation_routes_by_extension() {
        assert_eq!(route_default("page42.png", EventKind::Created), Route::Image);
        assert_eq!(route_default("CLIP.MP4", EventKind::Created), Route::Video);
        assert_eq!(
            route_default("podcast/ep1.mp3", EventKind::Created),
            Route::Transcribe
        );
    }

    #[test]
    fn removal_is_cleanup_regardless_of_type() {
        assert_eq!(route_default("clip.mp4", EventKind::Removed), Route::Cleanup);
        assert_eq!(route_default("doc.pdf", EventKind::Removed), Route::Cleanup);
        assert_eq!(route_default("no_extension", EventKind::Removed), Route::Cleanup);
    }

    #[test]
    fn unknown_and_pages_are_skipped() {
        assert!(matches!(
            route_default("doc.pdf", EventKind::Created),
            Route::Skip(_)
        ));
        assert!(matches!(
            route_default("site/index.html", EventKind::Created),
            Route::Skip(_)
        ));
    }

    #[test]
    fn derived_objects_are_never_routed() {
        assert!(matches!(
            route_default("_derived/clip.mp4.wav", EventKind::Created),
            Route::Skip(_)
        ));
        assert!(matches!(
            route_default("_derived/clip.mp4.wav", EventKind::Removed),
            Route::Skip(_)
        ));
        assert_eq!(
            route(&MediaSettings::default(), "", "_derived/a.png", EventKind::Created),
            Route::Image
        );
    }
}
