use std::borrow::Cow;
use std::io::BufRead;

use crate::alloc::{Allocator, Heap, LineBuf};
use crate::models::{Font, ParseError};
use crate::parser::{LineDisposition, LineParser};

/// An in-flight parse into a [`Font`].
///
/// Lines can be pushed in bunches of any size, or pulled from a reader; both
/// produce the same font. Every line is copied into allocator-owned storage
/// first, so callers may reuse their buffers as soon as a call returns.
///
/// Ending the session (or dropping it) leaves the font and everything parsed
/// so far intact. A glyph that was still being built is discarded.
///
/// The first error ends the parse: every later feed and `end` report
/// [`ParseError::AlreadyFailed`].
pub struct ParseSession<'f, A: Allocator = Heap> {
    font: &'f mut Font<A>,
    parser: LineParser<'f>,
    finished: bool,
    failed_at: Option<usize>,
}

impl<A: Allocator> Font<A> {
    /// Empties the font and starts a new parse into it.
    pub fn begin(&mut self) -> ParseSession<'_, A> {
        ParseSession::new(self, None)
    }

    /// Like [`Font::begin`], but glyphs whose code `want_glyph` rejects are
    /// parsed and then dropped.
    pub fn begin_with_filter<'f, F>(&'f mut self, want_glyph: F) -> ParseSession<'f, A>
    where
        F: FnMut(u16) -> bool + 'f,
    {
        ParseSession::new(self, Some(Box::new(want_glyph)))
    }

    /// Replaces the contents of this font with the font read from `reader`.
    /// On error the font is left empty.
    pub fn read_from<R: BufRead>(&mut self, reader: R) -> Result<(), ParseError> {
        let result = {
            let mut session = self.begin();
            match session.feed_reader(reader) {
                Ok(()) => session.end(),
                Err(err) => Err(err),
            }
        };
        if result.is_err() {
            self.reset();
        }
        result
    }
}

impl<'f, A: Allocator> ParseSession<'f, A> {
    fn new(font: &'f mut Font<A>, filter: Option<crate::parser::GlyphFilter<'f>>) -> Self {
        font.reset();
        log::debug!("starting BDF parse");
        Self {
            font,
            parser: LineParser::new(filter),
            finished: false,
            failed_at: None,
        }
    }

    /// `true` once `ENDFONT` was seen. Later lines are ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of lines consumed so far, blank lines included.
    pub fn line_number(&self) -> usize {
        self.parser.line_number()
    }

    /// `true` once a line was rejected. The session accepts nothing after that.
    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    fn check_failed(&self) -> Result<(), ParseError> {
        match self.failed_at {
            Some(line) => Err(ParseError::AlreadyFailed { line }),
            None => Ok(()),
        }
    }

    /// Feeds a single line. A trailing line terminator is stripped and blank
    /// lines are skipped.
    pub fn feed_line(&mut self, line: &str) -> Result<LineDisposition, ParseError> {
        self.check_failed()?;
        let result = self.apply_line(line);
        if result.is_err() {
            self.failed_at = Some(self.parser.line_number());
        }
        result
    }

    fn apply_line(&mut self, line: &str) -> Result<LineDisposition, ParseError> {
        let mut line = line.trim_end_matches(['\n', '\r']);
        if self.parser.line_number() == 0 {
            line = line.strip_prefix('\u{FEFF}').unwrap_or(line);
        }
        if line.is_empty() {
            self.parser.skip_line();
            return Ok(LineDisposition::Release);
        }
        if self.finished {
            self.parser.skip_line();
            log::debug!("ignoring line {} after ENDFONT", self.parser.line_number());
            return Ok(LineDisposition::Release);
        }

        let buf = LineBuf::copy_from(&self.font.allocator, line)?;
        match self.parser.feed(&mut *self.font, buf.as_str()) {
            Ok(LineDisposition::Retain) => {
                self.font.retain_line(buf);
                Ok(LineDisposition::Retain)
            }
            Ok(disposition) => {
                buf.release(&self.font.allocator);
                if disposition == LineDisposition::EndOfFont {
                    self.finished = true;
                }
                Ok(disposition)
            }
            Err(err) => {
                buf.release(&self.font.allocator);
                Err(err)
            }
        }
    }

    /// Feeds a batch of already split lines, in order.
    pub fn feed_bunch<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<(), ParseError> {
        for line in lines {
            self.feed_line(line.as_ref())?;
        }
        Ok(())
    }

    /// Reads lines until end of input or `ENDFONT`.
    ///
    /// Bytes that are not valid UTF-8 are replaced; BDF files in the wild
    /// often carry Latin-1 copyright notices.
    pub fn feed_reader<R: BufRead>(&mut self, mut reader: R) -> Result<(), ParseError> {
        self.check_failed()?;
        let mut raw = Vec::new();
        while !self.finished {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw);
            if read.is_err() {
                self.failed_at = Some(self.parser.line_number());
            }
            if read? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&raw);
            if let Cow::Owned(_) = text {
                log::warn!(
                    "Line {}: Invalid UTF-8, offending bytes replaced.",
                    self.parser.line_number() + 1
                );
            }
            self.feed_line(&text)?;
        }
        Ok(())
    }

    /// Ends the session. Fails if an earlier line was rejected, or if the
    /// input stopped inside a property block or a glyph; the font keeps what
    /// was completed before that point.
    pub fn end(mut self) -> Result<(), ParseError> {
        self.check_failed()?;
        if !self.finished {
            log::debug!("input ended without ENDFONT");
        }
        self.parser.finish(&mut *self.font)
    }
}

impl<A: Allocator> Drop for ParseSession<'_, A> {
    fn drop(&mut self) {
        self.parser.abandon(&mut *self.font);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::CountingAllocator;

    const SMALL_FONT: &[&str] = &[
        "STARTFONT 2.1",
        "FONT -misc-test-medium-r-normal--8-80-75-75-c-80-iso10646-1",
        "SIZE 8 75 75",
        "FONTBOUNDINGBOX 8 8 0 -1",
        "STARTPROPERTIES 2",
        "FONT_ASCENT 7",
        "FAMILY_NAME \"Test\"",
        "ENDPROPERTIES",
        "CHARS 1",
        "STARTCHAR A",
        "ENCODING 65",
        "SWIDTH 500 0",
        "DWIDTH 8 0",
        "BBX 8 2 0 0",
        "BITMAP",
        "FF",
        "81",
        "ENDCHAR",
        "ENDFONT",
    ];

    #[test]
    fn test_session_bunch() {
        let mut font = Font::default();
        let mut session = font.begin();
        session.feed_bunch(SMALL_FONT).unwrap();
        assert!(session.is_finished());
        session.end().unwrap();

        assert_eq!(font.glyphs().len(), 1);
        assert_eq!(font.str_property("FAMILY_NAME"), Some("Test"));
        // FONT line plus two property lines
        assert_eq!(font.retained_line_count(), 3);
    }

    #[test]
    fn test_lines_after_endfont_are_ignored() {
        let mut font = Font::default();
        let mut session = font.begin();
        session.feed_bunch(SMALL_FONT).unwrap();
        assert_eq!(
            session.feed_line("GARBAGE").unwrap(),
            LineDisposition::Release
        );
        session.end().unwrap();
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let mut font = Font::default();
        let mut session = font.begin();
        session.feed_line("\u{FEFF}STARTFONT 2.1\r\n").unwrap();
        session.feed_line("").unwrap();
        session.feed_line("\r\n").unwrap();
        let err = session.feed_line("NOPE\r\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownDirective { line: 4, .. }));
        drop(session);
        assert_eq!(font.version.major, 2);
        assert_eq!(font.version.minor, 1);
    }

    #[test]
    fn test_begin_resets_previous_contents() {
        let alloc = CountingAllocator::new();
        let mut font = Font::with_allocator(alloc.clone());
        let mut session = font.begin();
        session.feed_bunch(SMALL_FONT).unwrap();
        session.end().unwrap();
        assert!(alloc.outstanding_blocks() > 0);

        let session = font.begin();
        session.end().unwrap();
        assert!(font.glyphs().is_empty());
        assert_eq!(font.name(), None);
        assert_eq!(alloc.outstanding_blocks(), 0);
    }

    #[test]
    fn test_dropping_session_mid_glyph_frees_bitmap() {
        let alloc = CountingAllocator::new();
        let mut font = Font::with_allocator(alloc.clone());
        {
            let mut session = font.begin();
            session.feed_bunch(&SMALL_FONT[..15]).unwrap();
        }
        assert!(font.glyphs().is_empty());
        // only the FONT line and the two property lines remain
        assert_eq!(alloc.outstanding_blocks(), 3);
        font.free();
        assert_eq!(alloc.outstanding_blocks(), 0);
    }

    #[test]
    fn test_session_stops_after_error() {
        let mut font = Font::default();
        let mut session = font.begin();
        session.feed_line("STARTFONT 2.1").unwrap();
        assert!(matches!(
            session.feed_line("BOGUS 1"),
            Err(ParseError::UnknownDirective { line: 2, .. })
        ));
        assert!(session.is_failed());

        let err = session.feed_bunch(&SMALL_FONT[1..]).unwrap_err();
        assert!(matches!(err, ParseError::AlreadyFailed { line: 2 }));
        assert!(matches!(
            session.feed_reader("FONT x\n".as_bytes()),
            Err(ParseError::AlreadyFailed { line: 2 })
        ));
        assert!(matches!(session.end(), Err(ParseError::AlreadyFailed { line: 2 })));

        assert!(font.glyphs().is_empty());
        assert_eq!(font.name(), None);
    }

    #[test]
    fn test_read_from_error_leaves_font_empty() {
        let alloc = CountingAllocator::new();
        let mut font = Font::with_allocator(alloc.clone());
        let mut source = SMALL_FONT[..18].join("\n");
        source.push_str("\nBOGUS\n");
        let err = font.read_from(source.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::UnknownDirective { line: 19, .. }));

        assert!(font.glyphs().is_empty());
        assert_eq!(font.name(), None);
        assert_eq!(font.property_count(), 0);
        assert_eq!(alloc.outstanding_blocks(), 0);
    }

    #[test]
    fn test_end_inside_properties() {
        let mut font = Font::default();
        let mut session = font.begin();
        session.feed_bunch(&SMALL_FONT[..6]).unwrap();
        assert!(matches!(session.end(), Err(ParseError::UnexpectedEndOfInput)));
        assert_eq!(font.num_property("FONT_ASCENT"), Some(7));
    }
}
