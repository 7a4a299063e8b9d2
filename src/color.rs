use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Trace colours
// ---------------------------------------------------------------------------

/// `n` distinct trace colours. Hues step by the golden angle so that the
/// first few files stay far apart however many are selected.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    const GOLDEN_ANGLE: f32 = 137.507_77;
    (0..n)
        .map(|i| {
            let hsl = Hsl::new((i as f32 * GOLDEN_ANGLE) % 360.0, 0.7, 0.5);
            let rgb: Srgb = hsl.into_color();
            let [r, g, b] = [rgb.red, rgb.green, rgb.blue].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            Color32::from_rgb(r, g, b)
        })
        .collect()
}

/// Colour of the `i`-th selected file, cycling if the palette is short.
pub fn trace_color(palette: &[Color32], i: usize) -> Color32 {
    if palette.is_empty() {
        Color32::LIGHT_BLUE
    } else {
        palette[i % palette.len()]
    }
}

/// Translucent variant for filled regions (FWHM band).
pub fn fill_color(color: Color32) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), 48)
}
