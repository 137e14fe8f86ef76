//! # LibBDF: Glyph Bitmap Distribution Format Library
//!
//! A Rust library for reading bitmap fonts in the BDF format.
//!
//! ## Features
//!
//! - **Incremental parsing**: feed lines one at a time, in bunches of any size, or from a reader
//! - **Bit-exact bitmaps**: glyph rows are kept packed, one bit per pixel
//! - **Glyph filtering**: skip unwanted character codes while parsing
//! - **Pluggable memory**: glyph bitmaps and retained source lines go through an [`Allocator`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use libbdf::Font;
//!
//! let font = Font::from_path("my_font.bdf")?;
//! println!("Loaded font: {}", font.name().unwrap_or_default());
//!
//! if let Some(glyph) = font.find_glyph('A' as u16) {
//!     print!("{}", glyph.to_bitmap());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Incremental Parsing
//!
//! ```rust
//! # fn main() -> Result<(), libbdf::ParseError> {
//! use libbdf::Font;
//!
//! let mut font = Font::new();
//! let mut session = font.begin_with_filter(|code| code < 128);
//! session.feed_bunch(&["STARTFONT 2.1", "FONT fixed", "SIZE 8 75 75"])?;
//! session.feed_bunch(&["FONTBOUNDINGBOX 8 8 0 0", "CHARS 0", "ENDFONT"])?;
//! session.end()?;
//!
//! assert_eq!(font.name(), Some("fixed"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Unknown directives, bad bitmap rows and truncated blocks are fatal and reported as
//! [`ParseError`] with the offending line number. Malformed numbers in known directives
//! are tolerated: the field keeps its previous value and a warning goes to the `log` facade.

pub mod alloc;
mod models;
mod parser;
mod session;
mod utils;
#[cfg(feature = "xlfd")]
pub mod xlfd;

pub use crate::alloc::{AllocError, Allocator, CountingAllocator, Heap};
pub use crate::models::*;
pub use crate::parser::LineDisposition;
pub use crate::session::ParseSession;
pub use crate::utils::{calculate_ascent, calculate_descent};
#[cfg(feature = "xlfd")]
pub use crate::xlfd::Xlfd;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

impl Font {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut font = Self::new();
        font.read_from(bytes)?;
        Ok(font)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Font, ParseError> {
        let mut font = Self::new();
        font.read_from(BufReader::new(reader))?;
        Ok(font)
    }

    /// Reads a font keeping only the glyphs `want_glyph` accepts.
    pub fn from_reader_with_filter<R: Read, F: FnMut(u16) -> bool>(
        reader: R,
        want_glyph: F,
    ) -> Result<Font, ParseError> {
        let mut font = Self::new();
        let mut session = font.begin_with_filter(want_glyph);
        session.feed_reader(BufReader::new(reader))?;
        session.end()?;
        Ok(font)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl FromStr for Font {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_creation_and_defaults() {
        let font = Font::new();
        assert!(font.name().is_none());
        assert!(font.glyphs().is_empty());
        assert_eq!(font.version, FormatVersion::default());
        assert_eq!(font.property_count(), 0);
    }

    #[test]
    fn test_property_value_accessors() {
        assert_eq!(PropertyValue::Number(3).as_number(), Some(3));
        assert_eq!(PropertyValue::Number(3).as_str(), None);
        assert_eq!(PropertyValue::String("x").as_str(), Some("x"));
        assert!(PropertyValue::None.is_none());
    }

    #[test]
    fn test_glyph_bitmap_size_has_guard_byte() {
        assert_eq!(Glyph::bitmap_size(8, 2), 3);
        assert_eq!(Glyph::bitmap_size(5, 3), 3);
        assert_eq!(Glyph::bitmap_size(0, 0), 1);
    }

    #[test]
    fn test_from_str() {
        let font: Font = "STARTFONT 2.1\nFONT x\nENDFONT\n".parse().unwrap();
        assert_eq!(font.version, FormatVersion { major: 2, minor: 1 });
        assert_eq!(font.name(), Some("x"));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = Font::from_path("/definitely/not/here.bdf").unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
