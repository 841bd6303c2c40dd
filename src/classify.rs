//! Line classification for the ld64 linker map format.
//!
//! A map is a handful of `#` header lines followed by three tables. Headers
//! are recognized by literal prefix; table rows are picked apart with one
//! fixed-format pattern per table. None of this keeps state -- deciding which
//! pattern applies to a row is the scanner's job.

use crate::model::{ObjectRecord, SectionRecord, SymbolRecord};
use once_cell::sync::Lazy;
use regex::Regex;

const PATH_PREFIX: &str = "# Path: ";
const ARCH_PREFIX: &str = "# Arch: ";
const OBJECTS_PREFIX: &str = "# Object files:";
const SECTIONS_PREFIX: &str = "# Sections:";
const SYMBOLS_PREFIX: &str = "# Symbols:";

/// Address column value for symbols the linker dead-stripped.
pub const DEAD_ADDRESS: &str = "<<dead>>";

/// What a single line of a map turned out to be.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineOutcome<'a> {
    PathMeta(&'a str),
    ArchMeta(&'a str),
    BeginObjects,
    BeginSections,
    BeginSymbols,
    /// Any other `#` line, e.g. column headings or `# Dead Stripped Symbols:`.
    Comment,
    /// Not a header; means whatever the current table says it means.
    DataLine(&'a str),
}

pub fn classify(line: &str) -> LineOutcome<'_> {
    if let Some(path) = line.strip_prefix(PATH_PREFIX) {
        LineOutcome::PathMeta(path)
    } else if let Some(arch) = line.strip_prefix(ARCH_PREFIX) {
        LineOutcome::ArchMeta(arch)
    } else if line.starts_with(OBJECTS_PREFIX) {
        LineOutcome::BeginObjects
    } else if line.starts_with(SECTIONS_PREFIX) {
        LineOutcome::BeginSections
    } else if line.starts_with(SYMBOLS_PREFIX) {
        LineOutcome::BeginSymbols
    } else if line.starts_with('#') {
        LineOutcome::Comment
    } else {
        LineOutcome::DataLine(line)
    }
}

macro_rules! static_regex {
    ($name:ident, $str:expr) => {
        static $name: Lazy<Regex> =
            Lazy::new(|| Regex::new($str).expect(concat!("bad pattern ", stringify!($name))));
    };
}

static_regex!(OBJECT_LINE, r"^\[[ \t]*(\d+)[ \t]*\][ \t]+(.*)$");
static_regex!(
    SECTION_LINE,
    r"^(0x[0-9A-F]+)[ \t]+(0x[0-9A-F]+)[ \t]+([^ \t]+)[ \t]+([^ \t]+)$"
);
static_regex!(
    SYMBOL_LINE,
    r"^(0x[0-9A-F]+|<<dead>>)[ \t]+(0x[0-9A-F]+)[ \t]+\[[ \t+]*(\d+)\][ \t]+(.*)$"
);

/// `[  3] /path/to/file.o`
pub fn parse_object_line(line: &str) -> Option<ObjectRecord> {
    let caps = OBJECT_LINE.captures(line)?;
    let index = parse_index(&caps[1])?;
    Some(ObjectRecord::new(index, &caps[2]))
}

/// `0x100001000	0x000002A0	__TEXT	__text`
pub fn parse_section_line(line: &str) -> Option<SectionRecord> {
    let caps = SECTION_LINE.captures(line)?;
    Some(SectionRecord {
        address: parse_hex(&caps[1])?,
        size: parse_hex(&caps[2])?,
        segment: caps[3].to_string(),
        section: caps[4].to_string(),
    })
}

/// `0x100001000	0x00000040	[  1] -[AppDelegate application:]`, or the same
/// with `<<dead>>` in the address column.
pub fn parse_symbol_line(line: &str) -> Option<SymbolRecord> {
    let caps = SYMBOL_LINE.captures(line)?;
    let dead = &caps[1] == DEAD_ADDRESS;
    let address = if dead { 0 } else { parse_hex(&caps[1])? };
    Some(SymbolRecord {
        address,
        size: parse_hex(&caps[2])?,
        object_index: parse_index(&caps[3])?,
        name: caps[4].to_string(),
        dead,
    })
}

fn parse_hex(field: &str) -> Option<u64> {
    parse_int::parse::<u64>(field).ok()
}

/// Object indices go through the hex parser, same as every other numeric
/// column. Real linkers print them in decimal; the two agree below 10.
fn parse_index(digits: &str) -> Option<u32> {
    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers() {
        assert_eq!(
            classify("# Path: /Build/Demo.app/Contents/MacOS/Demo"),
            LineOutcome::PathMeta("/Build/Demo.app/Contents/MacOS/Demo")
        );
        assert_eq!(classify("# Arch: arm64"), LineOutcome::ArchMeta("arm64"));
        assert_eq!(classify("# Object files:"), LineOutcome::BeginObjects);
        assert_eq!(classify("# Sections:"), LineOutcome::BeginSections);
        assert_eq!(classify("# Symbols:"), LineOutcome::BeginSymbols);
        assert_eq!(classify("# Address\tSize    \tFile  Name"), LineOutcome::Comment);
        assert_eq!(classify("# Dead Stripped Symbols:"), LineOutcome::Comment);
        assert_eq!(classify("[  1] /a.o"), LineOutcome::DataLine("[  1] /a.o"));
    }

    #[test]
    fn header_prefixes_are_case_sensitive() {
        assert_eq!(classify("# path: /x"), LineOutcome::Comment);
        assert_eq!(classify("# symbols:"), LineOutcome::Comment);
    }

    #[test]
    fn object_line() {
        let line = "[  1] /Users/dev/DerivedData/Demo/Build/Intermediates.noindex/Demo.build/Debug/Demo.build/Objects-normal/x86_64/LinkMap.o";
        let o = parse_object_line(line).unwrap();
        assert_eq!(o.index, 1);
        assert_eq!(&o.path, &line[6..]);
        assert_eq!(o.name, "LinkMap.o");
        assert_eq!(o.library, None);
    }

    #[test]
    fn framework_member_object_line() {
        let o = parse_object_line("[  4] /a/b/ff.framework/ff(ff.o)").unwrap();
        assert_eq!(o.index, 4);
        assert_eq!(o.path, "/a/b/ff.framework/ff(ff.o)");
        assert_eq!(o.name, "ff.o");
        assert_eq!(o.library.as_deref(), Some("ff.framework"));
    }

    #[test]
    fn object_index_is_read_as_hex() {
        assert_eq!(parse_object_line("[ 10] /x.o").unwrap().index, 0x10);
        assert_eq!(parse_object_line("[9] /x.o").unwrap().index, 9);
        assert!(parse_object_line("[99999999999] /x.o").is_none());
    }

    #[test]
    fn symbol_line() {
        let s = parse_symbol_line(
            "0x100004000    0x0000006C    [  1] -[UIView(MASConstraints) mas_installedConstraints]",
        )
        .unwrap();
        assert_eq!(s.address, 0x100004000);
        assert_eq!(s.size, 0x6C);
        assert_eq!(s.object_index, 1);
        assert_eq!(s.name, "-[UIView(MASConstraints) mas_installedConstraints]");
        assert!(!s.dead);
    }

    #[test]
    fn dead_symbol_line() {
        let s = parse_symbol_line("<<dead>> \t0x00000018\t[  2] literal string: unused").unwrap();
        assert!(s.dead);
        assert_eq!(s.address, 0);
        assert_eq!(s.size, 0x18);
        assert_eq!(s.object_index, 2);
        assert_eq!(s.name, "literal string: unused");
    }

    #[test]
    fn section_line() {
        let s = parse_section_line("0x10000F0AA    0x000001B0    __TEXT    __swift5_typeref").unwrap();
        assert_eq!(s.address, 0x10000F0AA);
        assert_eq!(s.size, 0x1B0);
        assert_eq!(s.segment, "__TEXT");
        assert_eq!(s.section, "__swift5_typeref");
    }

    #[test]
    fn rows_from_other_tables_do_not_match() {
        let section = "0x100001000\t0x000002A0\t__TEXT\t__text";
        let symbol = "0x100001000\t0x00000040\t[  1] _main";
        assert!(parse_symbol_line(section).is_none());
        assert!(parse_object_line(section).is_none());
        assert!(parse_section_line(symbol).is_none());
        assert!(parse_object_line(symbol).is_none());
    }

    #[test]
    fn malformed_rows() {
        assert!(parse_symbol_line("0x100003050\t0xZZ\t[  1] _bad").is_none());
        assert!(parse_symbol_line("0x100003060\t0x0000").is_none());
        assert!(parse_section_line("0x1000 0x10 __TEXT").is_none());
        assert!(parse_section_line("0x1000 0x10 __TEXT __text extra").is_none());
        // lowercase hex digits are not what ld64 prints
        assert!(parse_section_line("0x1000 0x1b0 __TEXT __text").is_none());
        assert!(parse_object_line("[ x] /a.o").is_none());
        assert!(parse_object_line("").is_none());
    }

    #[test]
    fn oversized_hex_drops_the_row() {
        assert!(parse_section_line("0x1FFFFFFFFFFFFFFFFF 0x10 __TEXT __text").is_none());
    }
}
