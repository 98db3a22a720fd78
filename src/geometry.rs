//! Screen-space geometry shared by the simulation, the shader and the DOM
//! tracker.
//!
//! Everything here works in device pixels with the origin at the bottom-left
//! corner, matching `gl_FragCoord`. The document uses logical pixels with the
//! origin at the top-left, so rects coming from the page go through
//! [`Rect::from_client`] first.

/// Upper bound on obstacle rects per list. Matches the fixed-size uniform
/// arrays in the mask shader.
pub const MAX_RECTS: usize = 16;

/// Viewport area (logical px²) per metaball for the default count.
const AREA_PER_BALL: f64 = 50_000.0;
const MIN_DEFAULT_COUNT: u32 = 6;
const MAX_DEFAULT_COUNT: u32 = 150;

/// Axis-aligned rectangle in device pixels, y growing upward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Convert a client rect (logical px, y down) into device pixels with y
    /// flipped against the viewport height.
    pub fn from_client(
        left: f64,
        bottom: f64,
        width: f64,
        height: f64,
        inner_height: f64,
        device_pixel_ratio: f64,
    ) -> Self {
        let dpr = normalize_dpr(device_pixel_ratio);
        Self {
            x: (left * dpr) as f32,
            y: ((inner_height - bottom) * dpr) as f32,
            width: (width * dpr) as f32,
            height: (height * dpr) as f32,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Closest point of the rect (boundary or interior) to `(x, y)`.
    pub fn closest_point(&self, x: f32, y: f32) -> (f32, f32) {
        (x.clamp(self.x, self.right()), y.clamp(self.y, self.top()))
    }

    /// Distance from `(x, y)` to the rect's boundary. Zero when inside.
    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        let (cx, cy) = self.closest_point(x, y);
        ((x - cx).powi(2) + (y - cy).powi(2)).sqrt()
    }
}

/// Take at most [`MAX_RECTS`] rects, dropping the rest.
pub fn cap_rects<I>(rects: I) -> Vec<Rect>
where
    I: IntoIterator<Item = Rect>,
{
    rects.into_iter().take(MAX_RECTS).collect()
}

/// Default particle count for a logical viewport.
pub fn default_count(inner_width: f64, inner_height: f64) -> u32 {
    let estimated = (inner_width * inner_height / AREA_PER_BALL).round();
    if !estimated.is_finite() || estimated < MIN_DEFAULT_COUNT as f64 {
        return MIN_DEFAULT_COUNT;
    }
    (estimated as u32).min(MAX_DEFAULT_COUNT)
}

/// Backing-store size of a full-viewport canvas in device pixels.
pub fn canvas_size(inner_width: f64, inner_height: f64, device_pixel_ratio: f64) -> (u32, u32) {
    let dpr = normalize_dpr(device_pixel_ratio);
    let w = (inner_width * dpr).floor().max(0.0);
    let h = (inner_height * dpr).floor().max(0.0);
    (w as u32, h as u32)
}

/// Background opacity for a scroll offset: fully visible at the top and gone
/// once the first viewport height has been scrolled past.
pub fn scroll_fade(scroll_y: f64, inner_height: f64) -> f64 {
    let h = if inner_height > 0.0 { inner_height } else { 1.0 };
    1.0 - (scroll_y / h).clamp(0.0, 1.0)
}

fn normalize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_rect_is_flipped_and_scaled() {
        // 100x50 box whose bottom edge sits 200px below the top of a 600px viewport.
        let r = Rect::from_client(10.0, 200.0, 100.0, 50.0, 600.0, 2.0);
        assert_eq!(r, Rect::new(20.0, 800.0, 200.0, 100.0));
    }

    #[test]
    fn zero_dpr_falls_back_to_one() {
        let r = Rect::from_client(10.0, 100.0, 5.0, 5.0, 100.0, 0.0);
        assert_eq!(r, Rect::new(10.0, 0.0, 5.0, 5.0));
        assert_eq!(canvas_size(800.0, 600.0, f64::NAN), (800, 600));
    }

    #[test]
    fn cap_drops_extra_matches() {
        let many = (0..40).map(|i| Rect::new(i as f32, 0.0, 1.0, 1.0));
        let capped = cap_rects(many);
        assert_eq!(capped.len(), MAX_RECTS);
        assert_eq!(capped[MAX_RECTS - 1].x, (MAX_RECTS - 1) as f32);
        assert!(cap_rects(Vec::new()).is_empty());
    }

    #[test]
    fn default_count_is_clamped() {
        assert_eq!(default_count(100.0, 100.0), 6);
        assert_eq!(default_count(1000.0, 1000.0), 20);
        assert_eq!(default_count(10_000.0, 10_000.0), 150);
        assert_eq!(default_count(0.0, 0.0), 6);
    }

    #[test]
    fn canvas_size_floors_device_pixels() {
        assert_eq!(canvas_size(1001.0, 501.0, 1.5), (1501, 751));
    }

    #[test]
    fn distance_is_zero_inside() {
        let r = Rect::new(100.0, 100.0, 50.0, 50.0);
        assert_eq!(r.distance_to(120.0, 130.0), 0.0);
        assert!((r.distance_to(90.0, 125.0) - 10.0).abs() < 1e-6);
        assert!((r.distance_to(153.0, 154.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn scroll_fade_curve() {
        assert_eq!(scroll_fade(0.0, 800.0), 1.0);
        assert_eq!(scroll_fade(400.0, 800.0), 0.5);
        assert_eq!(scroll_fade(2000.0, 800.0), 0.0);
        assert_eq!(scroll_fade(-50.0, 800.0), 1.0);
        assert_eq!(scroll_fade(0.5, 0.0), 0.5);
    }
}
