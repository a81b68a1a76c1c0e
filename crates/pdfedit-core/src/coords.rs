//! Coordinate transformation between rendered page images and PDF point space
//!
//! Rendered pages have a top-left origin measured in pixels at a known DPI.
//! PDF pages have a bottom-left origin measured in points (72 per inch).

/// Points per inch in PDF user space
pub const POINTS_PER_INCH: f64 = 72.0;

/// Convert image pixel coordinates (top-left origin) to PDF points (bottom-left origin)
pub fn pixels_to_points(x_px: f64, y_px_from_top: f64, image_height_px: f64, dpi: f64) -> (f64, f64) {
    let pt_per_px = POINTS_PER_INCH / dpi;

    let x_pt = x_px * pt_per_px;
    // Flip Y axis
    let y_pt = (image_height_px - y_px_from_top) * pt_per_px;

    (x_pt, y_pt)
}

/// Convert PDF points back to image pixel coordinates
pub fn points_to_pixels(x_pt: f64, y_pt: f64, image_height_px: f64, dpi: f64) -> (f64, f64) {
    let px_per_pt = dpi / POINTS_PER_INCH;

    let x_px = x_pt * px_per_pt;
    let y_px_from_top = image_height_px - y_pt * px_per_pt;

    (x_px, y_px_from_top)
}

/// Round to the two decimals used when coordinates cross the wire
pub fn round_for_transport(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_left_maps_to_page_top() {
        // Letter page rendered at 150 DPI is 1650px tall
        let (x, y) = pixels_to_points(0.0, 0.0, 1650.0, 150.0);
        assert!((x - 0.0).abs() < 0.001);
        assert!((y - 792.0).abs() < 0.001);
    }

    #[test]
    fn test_bottom_left_maps_to_origin() {
        let (x, y) = pixels_to_points(0.0, 1650.0, 1650.0, 150.0);
        assert!((x - 0.0).abs() < 0.001);
        assert!((y - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_72_dpi_is_identity_scale() {
        let (x, y) = pixels_to_points(100.0, 92.0, 792.0, 72.0);
        assert_eq!(x, 100.0);
        assert_eq!(y, 700.0);
    }

    #[test]
    fn test_y_axis_flip() {
        let (_, y_px) = points_to_pixels(0.0, 100.0, 792.0, 72.0);
        assert_eq!(y_px, 692.0);
    }

    #[test]
    fn test_round_for_transport() {
        assert_eq!(round_for_transport(12.3456), 12.35);
        assert_eq!(round_for_transport(-0.004), 0.0);
    }
}
