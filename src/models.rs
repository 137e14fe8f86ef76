use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;

use crate::alloc::{AllocError, Allocator, Heap, LineBuf};

/// A parsed BDF font.
///
/// The font owns every glyph bitmap and every source line a record still
/// refers to (the font name and the property lines). All of it goes back to
/// the allocator in one sweep, either through [`Font::free`] or on drop.
pub struct Font<A: Allocator = Heap> {
    pub version: FormatVersion,
    pub size: FontSize,
    pub bounding_box: BoundingBox,
    /// Glyph count announced by `CHARS`, if any. Informational only.
    pub declared_glyph_count: Option<u32>,
    /// Property count announced by `STARTPROPERTIES`, if any.
    pub declared_property_count: Option<u32>,
    pub(crate) name: Option<TextSpan>,
    pub(crate) properties: Vec<Property>,
    pub(crate) glyphs: Vec<Glyph>,
    pub(crate) retained_lines: Vec<LineBuf>,
    pub(crate) allocator: A,
    index: OnceLock<HashMap<u16, usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

/// `SIZE` directive: nominal point size and device resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FontSize {
    pub point_size: u32,
    pub x_resolution: u32,
    pub y_resolution: u32,
}

/// Pixel extent plus the offset of the lower left corner from the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    pub width: u32,
    pub height: u32,
    pub x_offset: i32,
    pub y_offset: i32,
}

/// One character's metrics and packed bitmap.
///
/// The bitmap is row-major, most significant bit first, and rows follow each
/// other without byte alignment: pixel `(x, y)` is bit `y * width + x`.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Glyph {
    pub encoding: u16,
    pub scalable_width: (i32, i32),
    pub device_width: (i32, i32),
    pub bounding_box: BoundingBox,
    pub(crate) bitmap: Box<[u8]>,
}

impl Glyph {
    /// Size of the bitmap block for a bounding box, including one guard byte.
    pub fn bitmap_size(width: u32, height: u32) -> usize {
        (width as usize * height as usize).div_ceil(8) + 1
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn width(&self) -> usize {
        self.bounding_box.width as usize
    }

    pub fn height(&self) -> usize {
        self.bounding_box.height as usize
    }
}

/// Location of a string inside one of the font's retained lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextSpan {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Property {
    pub name: TextSpan,
    pub value: RawValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawValue {
    None,
    Number(i64),
    String(TextSpan),
}

/// Value of a font property as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue<'a> {
    None,
    Number(i64),
    String(&'a str),
}

impl<'a> PropertyValue<'a> {
    pub fn is_none(&self) -> bool {
        matches!(self, PropertyValue::None)
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Glyph bitmap expanded to one boolean per pixel.
///
/// Pixels are stored row-by-row, with `true` representing foreground pixels
/// and `false` representing background pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bitmap {
    pub pixels: Vec<Vec<bool>>,
    pub width: usize,
    pub height: usize,
}

impl Bitmap {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(f, "(empty bitmap)");
        }

        for row in &self.pixels {
            for &pixel in row {
                write!(f, "{}", if pixel { "*" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown directive '{directive}' at line {line}")]
    UnknownDirective { line: usize, directive: String },

    #[error("Directive '{directive}' at line {line} is not allowed {context}")]
    UnexpectedDirective {
        line: usize,
        directive: String,
        context: &'static str,
    },

    #[error("Invalid hex digit '{digit}' in bitmap row at line {line}")]
    InvalidHexDigit { line: usize, digit: char },

    #[error("Bitmap row at line {line} runs past the glyph bounding box")]
    TooManyBitmapRows { line: usize },

    #[error("Unexpected end of input")]
    UnexpectedEndOfInput,

    #[error("Parse already failed at line {line}")]
    AlreadyFailed { line: usize },

    #[error(transparent)]
    Alloc(#[from] AllocError),
}

impl Default for Font<Heap> {
    fn default() -> Self {
        Self::with_allocator(Heap)
    }
}

impl<A: Allocator> Font<A> {
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            version: FormatVersion::default(),
            size: FontSize::default(),
            bounding_box: BoundingBox::default(),
            declared_glyph_count: None,
            declared_property_count: None,
            name: None,
            properties: Vec::new(),
            glyphs: Vec::new(),
            retained_lines: Vec::new(),
            allocator,
            index: OnceLock::new(),
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The `FONT` identifier, usually an XLFD name.
    pub fn name(&self) -> Option<&str> {
        self.name.map(|span| self.text(span))
    }

    /// Glyphs in source order.
    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, PropertyValue<'_>)> + '_ {
        self.properties
            .iter()
            .map(|prop| (self.text(prop.name), self.resolve(prop.value)))
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Number of source lines kept alive because a record points into them.
    pub fn retained_line_count(&self) -> usize {
        self.retained_lines.len()
    }

    /// First property called `name`.
    pub fn property(&self, name: &str) -> Option<PropertyValue<'_>> {
        self.properties
            .iter()
            .find(|prop| self.text(prop.name) == name)
            .map(|prop| self.resolve(prop.value))
    }

    pub fn str_property(&self, name: &str) -> Option<&str> {
        self.property(name)?.as_str()
    }

    pub fn num_property(&self, name: &str) -> Option<i64> {
        self.property(name)?.as_number()
    }

    /// Looks up a glyph by character code.
    ///
    /// The code to position map is built on first use. For duplicate codes the
    /// glyph appearing first in the source wins.
    pub fn find_glyph(&self, code: u16) -> Option<&Glyph> {
        let index = self.index.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.glyphs.len());
            for (i, glyph) in self.glyphs.iter().enumerate() {
                index.entry(glyph.encoding).or_insert(i);
            }
            index
        });
        index.get(&code).map(|&i| &self.glyphs[i])
    }

    /// Releases every glyph bitmap and retained line and empties the font.
    pub fn free(&mut self) {
        let glyphs = std::mem::take(&mut self.glyphs);
        let glyph_count = glyphs.len();
        for mut glyph in glyphs {
            self.release_bitmap(&mut glyph);
        }
        self.properties = Vec::new();
        let lines = std::mem::take(&mut self.retained_lines);
        let line_count = lines.len();
        for line in lines {
            line.release(&self.allocator);
        }
        self.name = None;
        self.index.take();
        if glyph_count > 0 || line_count > 0 {
            log::debug!("released {glyph_count} glyph bitmaps and {line_count} retained lines");
        }
    }

    /// Clears everything, including the header fields, ahead of a new parse.
    pub(crate) fn reset(&mut self) {
        self.free();
        self.version = FormatVersion::default();
        self.size = FontSize::default();
        self.bounding_box = BoundingBox::default();
        self.declared_glyph_count = None;
        self.declared_property_count = None;
    }

    pub(crate) fn text(&self, span: TextSpan) -> &str {
        self.retained_lines
            .get(span.line)
            .and_then(|line| line.as_str().get(span.start..span.end))
            .unwrap_or_default()
    }

    fn resolve(&self, value: RawValue) -> PropertyValue<'_> {
        match value {
            RawValue::None => PropertyValue::None,
            RawValue::Number(n) => PropertyValue::Number(n),
            RawValue::String(span) => PropertyValue::String(self.text(span)),
        }
    }

    /// Index the next retained line will get.
    pub(crate) fn next_line_index(&self) -> usize {
        self.retained_lines.len()
    }

    pub(crate) fn retain_line(&mut self, line: LineBuf) {
        self.retained_lines.push(line);
    }

    pub(crate) fn push_glyph(&mut self, glyph: Glyph) {
        self.glyphs.push(glyph);
        self.index.take();
    }

    pub(crate) fn allocate_bitmap(&self, width: u32, height: u32) -> Result<Box<[u8]>, AllocError> {
        self.allocator.allocate(Glyph::bitmap_size(width, height))
    }

    /// Hands a glyph's bitmap back to the allocator. Empty means never allocated.
    pub(crate) fn release_bitmap(&self, glyph: &mut Glyph) {
        let bitmap = std::mem::take(&mut glyph.bitmap);
        if !bitmap.is_empty() {
            self.allocator.free(bitmap);
        }
    }
}

impl<A: Allocator> Drop for Font<A> {
    fn drop(&mut self) {
        self.free();
    }
}

impl<A: Allocator> PartialEq for Font<A> {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.size == other.size
            && self.bounding_box == other.bounding_box
            && self.declared_glyph_count == other.declared_glyph_count
            && self.declared_property_count == other.declared_property_count
            && self.name() == other.name()
            && self.properties().eq(other.properties())
            && self.glyphs == other.glyphs
    }
}

impl<A: Allocator> std::fmt::Debug for Font<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("version", &self.version)
            .field("name", &self.name())
            .field("size", &self.size)
            .field("bounding_box", &self.bounding_box)
            .field("properties", &self.properties().collect::<Vec<_>>())
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}
