use crate::alloc::Allocator;
use crate::models::*;

pub(crate) fn set_bit(bitmap: &mut [u8], index: usize, value: bool) {
    let mask = 0x80 >> (index % 8);
    if let Some(byte) = bitmap.get_mut(index / 8) {
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

pub(crate) fn get_bit(bitmap: &[u8], index: usize) -> bool {
    let mask = 0x80 >> (index % 8);
    bitmap.get(index / 8).is_some_and(|byte| byte & mask != 0)
}

/// Calculate the ascent of a font from its glyph bounding boxes
pub fn calculate_ascent<A: Allocator>(font: &Font<A>) -> i32 {
    font.glyphs()
        .iter()
        .map(|glyph| glyph.bounding_box.height as i32 + glyph.bounding_box.y_offset)
        .max()
        .unwrap_or(0)
}

/// Calculate the descent of a font (as a positive value) from its glyph bounding boxes
pub fn calculate_descent<A: Allocator>(font: &Font<A>) -> i32 {
    font.glyphs()
        .iter()
        .map(|glyph| -glyph.bounding_box.y_offset)
        .max()
        .unwrap_or(0)
        .max(0)
}

impl<A: Allocator> Font<A> {
    /// `FONT_ASCENT` if present, otherwise derived from the glyphs.
    pub fn ascent(&self) -> i32 {
        self.num_property("FONT_ASCENT")
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or_else(|| calculate_ascent(self))
    }

    /// `FONT_DESCENT` if present, otherwise derived from the glyphs.
    pub fn descent(&self) -> i32 {
        self.num_property("FONT_DESCENT")
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or_else(|| calculate_descent(self))
    }
}

impl Glyph {
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < self.width() && y < self.height() && get_bit(&self.bitmap, y * self.width() + x)
    }

    /// Expands the packed bitmap into one boolean per pixel, row-major.
    pub fn pixels(&self) -> Vec<bool> {
        (0..self.width() * self.height())
            .map(|i| get_bit(&self.bitmap, i))
            .collect()
    }

    pub fn to_bitmap(&self) -> Bitmap {
        let width = self.width();
        let height = self.height();
        let pixels = (0..height)
            .map(|y| (0..width).map(|x| get_bit(&self.bitmap, y * width + x)).collect())
            .collect();
        Bitmap {
            pixels,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(width: u32, height: u32, y_offset: i32, bitmap: &[u8]) -> Glyph {
        Glyph {
            bounding_box: BoundingBox {
                width,
                height,
                x_offset: 0,
                y_offset,
            },
            bitmap: bitmap.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_and_get_bit() {
        let mut bitmap = [0u8; 2];
        set_bit(&mut bitmap, 0, true);
        set_bit(&mut bitmap, 9, true);
        assert_eq!(bitmap, [0b1000_0000, 0b0100_0000]);
        assert!(get_bit(&bitmap, 9));
        set_bit(&mut bitmap, 0, false);
        assert!(!get_bit(&bitmap, 0));
        assert!(!get_bit(&bitmap, 100));
    }

    #[test]
    fn test_pixels_exact_length() {
        let g = glyph(8, 2, 0, &[0xFF, 0x00, 0x00]);
        let pixels = g.pixels();
        assert_eq!(pixels.len(), 16);
        assert!(pixels[..8].iter().all(|&p| p));
        assert!(pixels[8..].iter().all(|&p| !p));
    }

    #[test]
    fn test_pixels_unaligned_rows() {
        // 3x2: rows 101 and 010 packed as 1010_10xx
        let g = glyph(3, 2, 0, &[0b1010_1000, 0]);
        assert_eq!(g.pixels(), vec![true, false, true, false, true, false]);
        assert!(g.pixel(0, 0));
        assert!(g.pixel(1, 1));
        assert!(!g.pixel(3, 0));
    }

    #[test]
    fn test_bitmap_display() {
        let g = glyph(3, 2, 0, &[0b1010_1000, 0]);
        assert_eq!(g.to_bitmap().to_string(), "*.*\n.*.\n");
        assert_eq!(Bitmap::default().to_string(), "(empty bitmap)\n");
    }

    #[test]
    fn test_calculate_ascent_and_descent() {
        let mut font = Font::default();
        font.push_glyph(glyph(4, 10, -2, &[0; 6]));
        font.push_glyph(glyph(4, 6, 0, &[0; 4]));
        assert_eq!(calculate_ascent(&font), 8);
        assert_eq!(calculate_descent(&font), 2);
        assert_eq!(font.ascent(), 8);
    }
}
