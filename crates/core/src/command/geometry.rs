//! Output frame geometry: one-sided sizes, crop and pad corrections.

use crate::options::{AspectMode, FrameSize};

/// Frame size to request from the encoder plus any filter needed to reach
/// the final requested size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub size: Option<FrameSize>,
    pub filter: Option<String>,
}

fn truncate(value: f64) -> u32 {
    value as u32
}

fn even(value: u32, needs_even: bool) -> u32 {
    if needs_even {
        value & !1
    } else {
        value
    }
}

/// Computes the encoder frame size for the requested `width`/`height`.
///
/// Without source geometry the request is used as is (both dimensions are
/// needed for a size). With source geometry a single dimension is completed
/// from the source aspect ratio, and `Crop`/`Pad` produce the intermediate
/// size together with the `crop=`/`pad=` filter that yields the request.
pub fn correct(
    source: Option<FrameSize>,
    width: Option<u32>,
    height: Option<u32>,
    mode: AspectMode,
    needs_even: bool,
) -> Geometry {
    let plain = |w: Option<u32>, h: Option<u32>| Geometry {
        size: match (w, h) {
            (Some(w), Some(h)) => Some(FrameSize::new(w, h)),
            _ => None,
        },
        filter: None,
    };

    let Some(source) = source else {
        return plain(width, height);
    };
    let aspect = source.aspect();

    let (w, h) = match (width, height) {
        (None, None) => return plain(None, None),
        (Some(w), None) => {
            let h = even(truncate(w as f64 / aspect), needs_even);
            return plain(Some(w), Some(h));
        }
        (None, Some(h)) => {
            let w = even(truncate(aspect * h as f64), needs_even);
            return plain(Some(w), Some(h));
        }
        (Some(w), Some(h)) => (w, h),
    };

    if truncate(aspect * h as f64) == w || mode == AspectMode::Stretch {
        return plain(Some(w), Some(h));
    }

    let target_aspect = w as f64 / h as f64;

    match mode {
        AspectMode::Crop if target_aspect > aspect => {
            // Source is taller than the target: scale to width, crop top/bottom.
            let h0 = even(truncate(w as f64 / aspect), needs_even).max(h);
            let dh = (h0 - h) / 2;
            Geometry {
                size: Some(FrameSize::new(w, h0)),
                filter: Some(format!("crop={}:{}:0:{}", w, h, dh)),
            }
        }
        AspectMode::Crop => {
            let w0 = even(truncate(h as f64 * aspect), needs_even).max(w);
            let dw = (w0 - w) / 2;
            Geometry {
                size: Some(FrameSize::new(w0, h)),
                filter: Some(format!("crop={}:{}:{}:0", w, h, dw)),
            }
        }
        AspectMode::Pad if target_aspect < aspect => {
            // Source is wider than the target: scale to width, pad top/bottom.
            let h1 = even(truncate(w as f64 / aspect), needs_even).min(h);
            let dh = (h - h1) / 2;
            Geometry {
                size: Some(FrameSize::new(w, h1)),
                filter: Some(format!("pad={}:{}:0:{}", w, h, dh)),
            }
        }
        AspectMode::Pad => {
            let w1 = even(truncate(h as f64 * aspect), needs_even).min(w);
            let dw = (w - w1) / 2;
            Geometry {
                size: Some(FrameSize::new(w1, h)),
                filter: Some(format!("pad={}:{}:{}:0", w, h, dw)),
            }
        }
        AspectMode::Stretch => plain(Some(w), Some(h)),
    }
}

/// Filter bounding the output by `max_width`/`max_height` while keeping the
/// source aspect ratio. Never upscales.
pub fn bound_filter(max_width: Option<u32>, max_height: Option<u32>, needs_even: bool) -> Option<String> {
    if max_width.is_none() && max_height.is_none() {
        return None;
    }
    let w = max_width
        .map(|w| format!("'min({},iw)'", w))
        .unwrap_or_else(|| "iw".to_string());
    let h = max_height
        .map(|h| format!("'min({},ih)'", h))
        .unwrap_or_else(|| "ih".to_string());
    let mut filter = format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h);
    if needs_even {
        filter.push_str(":force_divisible_by=2");
    }
    Some(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(w: u32, h: u32) -> Option<FrameSize> {
        Some(FrameSize::new(w, h))
    }

    #[test]
    fn test_no_source_keeps_request() {
        let g = correct(None, Some(320), Some(240), AspectMode::Crop, false);
        assert_eq!(g.size, Some(FrameSize::new(320, 240)));
        assert_eq!(g.filter, None);

        let g = correct(None, Some(320), None, AspectMode::Stretch, false);
        assert_eq!(g.size, None);
    }

    #[test]
    fn test_one_sided_sizes() {
        let g = correct(src(640, 480), Some(320), None, AspectMode::Stretch, false);
        assert_eq!(g.size, Some(FrameSize::new(320, 240)));

        let g = correct(src(640, 480), None, Some(240), AspectMode::Stretch, false);
        assert_eq!(g.size, Some(FrameSize::new(320, 240)));
    }

    #[test]
    fn test_crop_left_right() {
        let g = correct(src(640, 400), Some(320), Some(240), AspectMode::Crop, false);
        assert_eq!(g.size, Some(FrameSize::new(384, 240)));
        assert_eq!(g.filter.as_deref(), Some("crop=320:240:32:0"));
    }

    #[test]
    fn test_crop_top_bottom() {
        let g = correct(src(640, 480), Some(320), Some(200), AspectMode::Crop, false);
        assert_eq!(g.size, Some(FrameSize::new(320, 240)));
        assert_eq!(g.filter.as_deref(), Some("crop=320:200:0:20"));
    }

    #[test]
    fn test_pad_top_bottom() {
        let g = correct(src(640, 400), Some(320), Some(240), AspectMode::Pad, false);
        assert_eq!(g.size, Some(FrameSize::new(320, 200)));
        assert_eq!(g.filter.as_deref(), Some("pad=320:240:0:20"));
    }

    #[test]
    fn test_pad_left_right() {
        let g = correct(src(640, 480), Some(320), Some(200), AspectMode::Pad, false);
        assert_eq!(g.size, Some(FrameSize::new(266, 200)));
        assert_eq!(g.filter.as_deref(), Some("pad=320:200:27:0"));
    }

    #[test]
    fn test_pad_rounds_to_even() {
        let g = correct(src(640, 480), Some(320), Some(200), AspectMode::Pad, true);
        assert_eq!(g.size, Some(FrameSize::new(266, 200)));

        let g = correct(src(1000, 750), Some(322), Some(200), AspectMode::Pad, true);
        // 200 * 4/3 = 266.67 -> 266
        assert_eq!(g.size, Some(FrameSize::new(266, 200)));
        assert_eq!(g.filter.as_deref(), Some("pad=322:200:28:0"));
    }

    #[test]
    fn test_matching_aspect_needs_no_filter() {
        let g = correct(src(1920, 1080), Some(1280), Some(720), AspectMode::Crop, false);
        assert_eq!(g.size, Some(FrameSize::new(1280, 720)));
        assert_eq!(g.filter, None);
    }

    #[test]
    fn test_bound_filter() {
        assert_eq!(bound_filter(None, None, false), None);
        assert_eq!(
            bound_filter(Some(1920), Some(1080), false).as_deref(),
            Some("scale='min(1920,iw)':'min(1080,ih)':force_original_aspect_ratio=decrease")
        );
        assert_eq!(
            bound_filter(Some(1280), None, true).as_deref(),
            Some("scale='min(1280,iw)':ih:force_original_aspect_ratio=decrease:force_divisible_by=2")
        );
    }
}
