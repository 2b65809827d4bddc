//! Alignment marker overlay.
//!
//! Markers are named pixel coordinates rendered as half-transparent
//! white circles over the captured frame before submission. The set is
//! read-only while a capture loop runs.

use std::collections::BTreeMap;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::api::MarkerCoordinates;

/// Ordered set of named alignment markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerSet {
    coordinates: BTreeMap<String, [f32; 2]>,
}

impl MarkerSet {
    /// Empty marker set (nothing is drawn).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a marker.
    pub fn insert(&mut self, name: impl Into<String>, x: f32, y: f32) {
        self.coordinates.insert(name.into(), [x, y]);
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Iterate markers in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, [f32; 2])> {
        self.coordinates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Composite the markers onto a frame as 50% white filled circles.
    pub fn draw(&self, canvas: &mut RgbaImage, radius: u32) {
        let (width, height) = canvas.dimensions();
        let r = radius as i64;

        for &[cx, cy] in self.coordinates.values() {
            let cx = cx.round() as i64;
            let cy = cy.round() as i64;

            for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let x = cx + dx;
                    let y = cy + dy;
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                    // 50% blend towards white, alpha untouched.
                    for channel in 0..3 {
                        pixel.0[channel] = ((pixel.0[channel] as u16 + 255) / 2) as u8;
                    }
                }
            }
        }
    }
}

impl From<MarkerCoordinates> for MarkerSet {
    fn from(coords: MarkerCoordinates) -> Self {
        Self {
            coordinates: coords.coordinates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn black_canvas(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn empty_set_draws_nothing() {
        let mut canvas = black_canvas(32, 32);
        let untouched = canvas.clone();
        MarkerSet::empty().draw(&mut canvas, 20);
        assert_eq!(canvas, untouched);
    }

    #[test]
    fn marker_blends_towards_white() {
        let mut canvas = black_canvas(32, 32);
        let mut markers = MarkerSet::empty();
        markers.insert("center", 16.0, 16.0);
        markers.draw(&mut canvas, 4);

        // Center is blended halfway to white, corners are untouched.
        assert_eq!(canvas.get_pixel(16, 16), &Rgba([127, 127, 127, 255]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        // Just outside the radius along one axis.
        assert_eq!(canvas.get_pixel(16 + 5, 16), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn marker_clipped_at_image_edge() {
        let mut canvas = black_canvas(16, 16);
        let mut markers = MarkerSet::empty();
        markers.insert("corner", 0.0, 0.0);
        markers.draw(&mut canvas, 8);

        assert_eq!(canvas.get_pixel(0, 0), &Rgba([127, 127, 127, 255]));
        assert_eq!(canvas.get_pixel(15, 15), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn from_backend_coordinates() {
        let coords: MarkerCoordinates = serde_json::from_str(
            r#"{"coordinates": {"Left Shoulder": [120.0, 80.0], "Right Hip": [60.0, 200.0]}}"#,
        )
        .unwrap();
        let markers = MarkerSet::from(coords);
        assert_eq!(markers.len(), 2);
        let names: Vec<&str> = markers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Left Shoulder", "Right Hip"]);
    }
}
