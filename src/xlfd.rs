//! X Logical Font Description names, the conventional value of `FONT`.
//!
//! `-Adobe-Helvetica-Medium-R-Normal--12-120-75-75-P-67-ISO8859-1` has 14
//! dash-separated fields; numeric fields may be empty or a `*` wildcard.

use std::sync::OnceLock;

use regex::Regex;

use crate::alloc::Allocator;
use crate::models::Font;

static RE_XLFD_LOCK: OnceLock<Regex> = OnceLock::new();
fn get_re_xlfd() -> &'static Regex {
    RE_XLFD_LOCK.get_or_init(|| {
        let field = "-([^-]*)";
        Regex::new(&format!("^{}$", field.repeat(14))).unwrap()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xlfd<'a> {
    pub foundry: &'a str,
    pub family: &'a str,
    pub weight: &'a str,
    pub slant: &'a str,
    pub setwidth: &'a str,
    pub add_style: &'a str,
    pub pixel_size: Option<u32>,
    /// In decipoints.
    pub point_size: Option<u32>,
    pub resolution_x: Option<u32>,
    pub resolution_y: Option<u32>,
    pub spacing: &'a str,
    /// In tenths of a pixel.
    pub average_width: Option<u32>,
    pub charset_registry: &'a str,
    pub charset_encoding: &'a str,
}

impl<'a> Xlfd<'a> {
    /// Splits an XLFD name. Returns `None` for anything without exactly 14 fields.
    pub fn parse(name: &'a str) -> Option<Self> {
        let caps = get_re_xlfd().captures(name.trim())?;
        let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());
        let number = |i: usize| field(i).parse::<u32>().ok();
        Some(Xlfd {
            foundry: field(1),
            family: field(2),
            weight: field(3),
            slant: field(4),
            setwidth: field(5),
            add_style: field(6),
            pixel_size: number(7),
            point_size: number(8),
            resolution_x: number(9),
            resolution_y: number(10),
            spacing: field(11),
            average_width: number(12),
            charset_registry: field(13),
            charset_encoding: field(14),
        })
    }

    /// `true` for monospaced (`M`) and character cell (`C`) fonts.
    pub fn is_monospace(&self) -> bool {
        self.spacing.eq_ignore_ascii_case("m") || self.spacing.eq_ignore_ascii_case("c")
    }
}

impl<A: Allocator> Font<A> {
    /// The `FONT` identifier split into its XLFD fields.
    pub fn xlfd(&self) -> Option<Xlfd<'_>> {
        Xlfd::parse(self.name()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_name() {
        let xlfd = Xlfd::parse("-Adobe-Helvetica-Medium-R-Normal--12-120-75-75-P-67-ISO8859-1")
            .unwrap();
        assert_eq!(xlfd.foundry, "Adobe");
        assert_eq!(xlfd.family, "Helvetica");
        assert_eq!(xlfd.weight, "Medium");
        assert_eq!(xlfd.slant, "R");
        assert_eq!(xlfd.setwidth, "Normal");
        assert_eq!(xlfd.add_style, "");
        assert_eq!(xlfd.pixel_size, Some(12));
        assert_eq!(xlfd.point_size, Some(120));
        assert_eq!(xlfd.resolution_x, Some(75));
        assert_eq!(xlfd.resolution_y, Some(75));
        assert_eq!(xlfd.spacing, "P");
        assert_eq!(xlfd.average_width, Some(67));
        assert_eq!(xlfd.charset_registry, "ISO8859");
        assert_eq!(xlfd.charset_encoding, "1");
        assert!(!xlfd.is_monospace());
    }

    #[test]
    fn test_wildcards_are_not_numbers() {
        let xlfd = Xlfd::parse("-misc-fixed-*-*-*--*-*-*-*-c-*-iso10646-1").unwrap();
        assert_eq!(xlfd.pixel_size, None);
        assert!(xlfd.is_monospace());
    }

    #[test]
    fn test_rejects_other_names() {
        assert!(Xlfd::parse("fixed").is_none());
        assert!(Xlfd::parse("-a-b-c").is_none());
    }
}
