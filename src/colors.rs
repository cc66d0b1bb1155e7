use serde::Serialize;

/// Hue step between consecutive colors, in degrees (the golden angle).
pub const GOLDEN_ANGLE: f64 = 137.50776;

/// Background and border color for one chart element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColorPair {
    /// `hsla(h, 70%, 60%, 0.6)`
    pub background: String,

    /// `hsla(h, 70%, 50%, 1)`
    pub border: String,
}

/// Hue in degrees for the color at `index`.
pub fn hue(index: usize) -> f64 {
    (index as f64 * GOLDEN_ANGLE) % 360.0
}

/// Generates `count` visually distinct color pairs.
///
/// Consecutive hues are a golden angle apart, so neighbouring series never
/// share a hue and repeats stay rare for large counts. Pure: the same
/// count always yields the same sequence.
///
/// # Examples
/// ```
/// use sheetchart::colors::generate_colors;
///
/// let colors = generate_colors(2);
/// assert_eq!(colors[0].background, "hsla(0, 70%, 60%, 0.6)");
/// assert_eq!(colors[1].border, "hsla(137.50776, 70%, 50%, 1)");
/// assert!(generate_colors(0).is_empty());
/// ```
pub fn generate_colors(count: usize) -> Vec<ColorPair> {
    (0..count)
        .map(|i| {
            let h = hue(i);
            ColorPair {
                background: format!("hsla({}, 70%, 60%, 0.6)", h),
                border: format!("hsla({}, 70%, 50%, 1)", h),
            }
        })
        .collect()
}
