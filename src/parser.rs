use std::str::FromStr;

use crate::alloc::Allocator;
use crate::models::*;
use crate::utils::set_bit;

/// Caller-supplied predicate deciding which character codes are kept.
pub type GlyphFilter<'a> = Box<dyn FnMut(u16) -> bool + 'a>;

/// What the caller has to do with a line after it was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDisposition {
    /// Nothing refers to the line, its buffer can go.
    Release,
    /// A record points into the line; the font must keep it.
    Retain,
    /// `ENDFONT` was seen. The line itself can go.
    EndOfFont,
}

// --- Parser State Machine ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    TopLevel,
    InProperties,
    InGlyphHeader { skipped: bool },
    InGlyphBitmap { skipped: bool },
}

// Transitions:
//
// TopLevel --STARTPROPERTIES--> InProperties --ENDPROPERTIES--> TopLevel
// TopLevel --STARTCHAR--> InGlyphHeader --BITMAP--> InGlyphBitmap --ENDCHAR--> TopLevel
//
// `ENCODING` rejected by the filter flips `skipped` for the rest of the glyph.
// A skipped glyph never allocates a bitmap and is never appended.

pub(crate) struct LineParser<'a> {
    mode: Mode,
    bit_cursor: usize,
    glyph: Glyph,
    filter: Option<GlyphFilter<'a>>,
    line_number: usize,
}

/// A line split at its first space.
struct Directive<'l> {
    keyword: &'l str,
    argument: Option<&'l str>,
    /// Byte offset of `argument` within the line.
    argument_start: usize,
}

fn split_directive(line: &str) -> Directive<'_> {
    match line.find(' ') {
        Some(pos) => {
            let argument = &line[pos + 1..];
            Directive {
                keyword: &line[..pos],
                argument: if argument.trim().is_empty() {
                    None
                } else {
                    Some(argument)
                },
                argument_start: pos + 1,
            }
        }
        None => Directive {
            keyword: line,
            argument: None,
            argument_start: line.len(),
        },
    }
}

/// A numeric field that can be filled from text.
trait ScanSlot {
    fn assign(&mut self, field: &str) -> bool;
}

impl<T: FromStr> ScanSlot for T {
    fn assign(&mut self, field: &str) -> bool {
        match field.parse() {
            Ok(value) => {
                *self = value;
                true
            }
            Err(_) => false,
        }
    }
}

/// Fills `slots` from `fields` in order, stopping at the first field that is
/// missing or malformed. Slots after that keep their previous value.
fn scan_fields<'f>(
    line_num: usize,
    directive: &str,
    mut fields: impl Iterator<Item = &'f str>,
    slots: &mut [&mut dyn ScanSlot],
) {
    let expected = slots.len();
    for (i, slot) in slots.iter_mut().enumerate() {
        let assigned = fields.next().is_some_and(|field| slot.assign(field));
        if !assigned {
            log::warn!(
                "Line {line_num}: {directive} expects {expected} numeric fields, only {i} could be read."
            );
            return;
        }
    }
}

fn fields(argument: Option<&str>) -> std::str::SplitAsciiWhitespace<'_> {
    argument.unwrap_or_default().split_ascii_whitespace()
}

/// Parses a property number: optional sign, decimal or `0x` hex, first token only.
fn parse_long(s: &str) -> Option<i64> {
    let token = s.split_ascii_whitespace().next()?;
    let (negative, digits) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Decodes one hex row of a glyph bitmap, starting at bit `cursor`.
///
/// Each digit yields four bits, most significant first. Bits beyond the glyph
/// width are dropped, so a row never spills into the next one. Returns the
/// cursor for the next row, which is always `cursor + width`.
pub(crate) fn decode_row(
    glyph: &mut Glyph,
    cursor: usize,
    row: &str,
    line_num: usize,
) -> Result<usize, ParseError> {
    let width = glyph.width();
    let next_row = cursor + width;
    if next_row > width * glyph.height() {
        return Err(ParseError::TooManyBitmapRows { line: line_num });
    }

    let mut row_bit = 0;
    for digit in row.chars() {
        let nibble = digit.to_digit(16).ok_or(ParseError::InvalidHexDigit {
            line: line_num,
            digit,
        })?;
        for i in 0..4 {
            if row_bit >= width {
                break;
            }
            set_bit(&mut glyph.bitmap, cursor + row_bit, nibble & (0b1000 >> i) != 0);
            row_bit += 1;
        }
    }
    Ok(next_row)
}

impl<'a> LineParser<'a> {
    pub(crate) fn new(filter: Option<GlyphFilter<'a>>) -> Self {
        Self {
            mode: Mode::TopLevel,
            bit_cursor: 0,
            glyph: Glyph::default(),
            filter,
            line_number: 0,
        }
    }

    /// Accounts for a line the caller dropped without feeding (blank lines).
    pub(crate) fn skip_line(&mut self) {
        self.line_number += 1;
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    /// Parses one non-empty line without its line terminator.
    ///
    /// When `Retain` is returned the caller must hand the line to the font
    /// (`Font::retain_line`) before feeding the next one: spans recorded for
    /// this line refer to the font's next retained-line slot.
    pub(crate) fn feed<A: Allocator>(
        &mut self,
        font: &mut Font<A>,
        line: &str,
    ) -> Result<LineDisposition, ParseError> {
        self.line_number += 1;
        let directive = split_directive(line);
        match self.mode {
            Mode::InProperties => Ok(self.property_line(font, line, &directive)),
            Mode::InGlyphBitmap { skipped } => self.bitmap_line(font, &directive, skipped),
            Mode::InGlyphHeader { skipped } => self.glyph_header_line(font, &directive, skipped),
            Mode::TopLevel => self.top_level_line(font, line, &directive),
        }
    }

    /// Ends the parse. Fails if the input stopped inside a block.
    pub(crate) fn finish<A: Allocator>(&mut self, font: &mut Font<A>) -> Result<(), ParseError> {
        let mode = self.mode;
        self.abandon(font);
        match mode {
            Mode::TopLevel => Ok(()),
            Mode::InProperties | Mode::InGlyphHeader { .. } | Mode::InGlyphBitmap { .. } => {
                log::warn!("Input ended at line {} inside {mode:?}.", self.line_number);
                Err(ParseError::UnexpectedEndOfInput)
            }
        }
    }

    /// Drops the glyph under construction and returns its bitmap, if any.
    pub(crate) fn abandon<A: Allocator>(&mut self, font: &mut Font<A>) {
        font.release_bitmap(&mut self.glyph);
        self.glyph = Glyph::default();
        self.mode = Mode::TopLevel;
    }

    fn property_line<A: Allocator>(
        &mut self,
        font: &mut Font<A>,
        line: &str,
        directive: &Directive<'_>,
    ) -> LineDisposition {
        if directive.keyword == "ENDPROPERTIES" {
            self.mode = Mode::TopLevel;
            if let Some(declared) = font.declared_property_count {
                if declared as usize != font.properties.len() {
                    log::warn!(
                        "Line {}: STARTPROPERTIES announced {declared} properties, found {}.",
                        self.line_number,
                        font.properties.len()
                    );
                }
            }
            return LineDisposition::Release;
        }

        let line_index = font.next_line_index();
        let name = TextSpan {
            line: line_index,
            start: 0,
            end: directive.keyword.len(),
        };
        let value = match directive.argument {
            None => RawValue::None,
            Some(argument) if argument.starts_with('"') => {
                let start = directive.argument_start + 1;
                let end = match argument[1..].rfind('"') {
                    Some(pos) => start + pos,
                    None => {
                        log::warn!(
                            "Line {}: Unterminated string value for property '{}'.",
                            self.line_number,
                            directive.keyword
                        );
                        line.len()
                    }
                };
                RawValue::String(TextSpan {
                    line: line_index,
                    start,
                    end,
                })
            }
            Some(argument) => RawValue::Number(parse_long(argument).unwrap_or_else(|| {
                log::warn!(
                    "Line {}: Property '{}' has non-numeric value '{argument}', using 0.",
                    self.line_number,
                    directive.keyword
                );
                0
            })),
        };
        font.properties.push(Property { name, value });
        LineDisposition::Retain
    }

    fn bitmap_line<A: Allocator>(
        &mut self,
        font: &mut Font<A>,
        directive: &Directive<'_>,
        skipped: bool,
    ) -> Result<LineDisposition, ParseError> {
        if directive.keyword == "ENDCHAR" {
            self.mode = Mode::TopLevel;
            let glyph = std::mem::take(&mut self.glyph);
            if skipped {
                let mut glyph = glyph;
                font.release_bitmap(&mut glyph);
            } else {
                font.push_glyph(glyph);
            }
            return Ok(LineDisposition::Release);
        }
        if !skipped {
            self.bit_cursor =
                decode_row(&mut self.glyph, self.bit_cursor, directive.keyword, self.line_number)?;
        }
        Ok(LineDisposition::Release)
    }

    fn glyph_header_line<A: Allocator>(
        &mut self,
        font: &mut Font<A>,
        directive: &Directive<'_>,
        skipped: bool,
    ) -> Result<LineDisposition, ParseError> {
        let line_num = self.line_number;
        let argument = directive.argument;

        if skipped {
            match directive.keyword {
                "ENDCHAR" => self.mode = Mode::TopLevel,
                "BITMAP" => self.mode = Mode::InGlyphBitmap { skipped: true },
                _ => {}
            }
            return Ok(LineDisposition::Release);
        }

        match directive.keyword {
            "ENCODING" => {
                let mut code = i32::from(self.glyph.encoding);
                scan_fields(line_num, "ENCODING", fields(argument), &mut [&mut code]);
                if code < -1 || code > i32::from(u16::MAX) {
                    log::warn!("Line {line_num}: Encoding {code} does not fit 16 bits, truncating.");
                }
                // -1 (unencoded) lands on 0xFFFF.
                self.glyph.encoding = code as u16;
                if let Some(filter) = self.filter.as_mut() {
                    if !filter(self.glyph.encoding) {
                        self.mode = Mode::InGlyphHeader { skipped: true };
                    }
                }
            }
            "SWIDTH" => {
                let (x, y) = &mut self.glyph.scalable_width;
                scan_fields(line_num, "SWIDTH", fields(argument), &mut [x, y]);
            }
            "DWIDTH" => {
                let (x, y) = &mut self.glyph.device_width;
                scan_fields(line_num, "DWIDTH", fields(argument), &mut [x, y]);
            }
            "BBX" => {
                let bbx = &mut self.glyph.bounding_box;
                scan_fields(
                    line_num,
                    "BBX",
                    fields(argument),
                    &mut [
                        &mut bbx.width,
                        &mut bbx.height,
                        &mut bbx.x_offset,
                        &mut bbx.y_offset,
                    ],
                );
            }
            "BITMAP" => {
                let bbx = self.glyph.bounding_box;
                self.glyph.bitmap = font.allocate_bitmap(bbx.width, bbx.height)?;
                self.bit_cursor = 0;
                self.mode = Mode::InGlyphBitmap { skipped: false };
            }
            "ENDCHAR" => {
                return Err(ParseError::UnexpectedDirective {
                    line: line_num,
                    directive: directive.keyword.to_string(),
                    context: "before BITMAP",
                });
            }
            unknown => {
                return Err(ParseError::UnknownDirective {
                    line: line_num,
                    directive: unknown.to_string(),
                });
            }
        }
        Ok(LineDisposition::Release)
    }

    fn top_level_line<A: Allocator>(
        &mut self,
        font: &mut Font<A>,
        line: &str,
        directive: &Directive<'_>,
    ) -> Result<LineDisposition, ParseError> {
        let line_num = self.line_number;
        let argument = directive.argument;

        match directive.keyword {
            "COMMENT" => {}
            "STARTFONT" => {
                let version = &mut font.version;
                scan_fields(
                    line_num,
                    "STARTFONT",
                    argument.unwrap_or_default().trim().splitn(2, '.'),
                    &mut [&mut version.major, &mut version.minor],
                );
            }
            "FONT" => {
                return Ok(match argument {
                    Some(_) => {
                        font.name = Some(TextSpan {
                            line: font.next_line_index(),
                            start: directive.argument_start,
                            end: line.len(),
                        });
                        LineDisposition::Retain
                    }
                    None => {
                        log::warn!("Line {line_num}: FONT without an identifier.");
                        font.name = None;
                        LineDisposition::Release
                    }
                });
            }
            "SIZE" => {
                let size = &mut font.size;
                scan_fields(
                    line_num,
                    "SIZE",
                    fields(argument),
                    &mut [
                        &mut size.point_size,
                        &mut size.x_resolution,
                        &mut size.y_resolution,
                    ],
                );
            }
            "FONTBOUNDINGBOX" => {
                let bbx = &mut font.bounding_box;
                scan_fields(
                    line_num,
                    "FONTBOUNDINGBOX",
                    fields(argument),
                    &mut [
                        &mut bbx.width,
                        &mut bbx.height,
                        &mut bbx.x_offset,
                        &mut bbx.y_offset,
                    ],
                );
            }
            "STARTPROPERTIES" => {
                font.declared_property_count = argument.and_then(parse_declared_count);
                self.mode = Mode::InProperties;
            }
            "STARTCHAR" => {
                font.release_bitmap(&mut self.glyph);
                self.glyph = Glyph::default();
                self.bit_cursor = 0;
                self.mode = Mode::InGlyphHeader { skipped: false };
            }
            "ENDFONT" => return Ok(LineDisposition::EndOfFont),
            "CHARS" => {
                font.declared_glyph_count = argument.and_then(parse_declared_count);
            }
            unknown => {
                return Err(ParseError::UnknownDirective {
                    line: line_num,
                    directive: unknown.to_string(),
                });
            }
        }
        Ok(LineDisposition::Release)
    }
}

fn parse_declared_count(argument: &str) -> Option<u32> {
    fields(Some(argument)).next()?.parse().ok()
}
