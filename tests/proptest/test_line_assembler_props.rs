//! Property-based tests for console line assembly

use proptest::prelude::*;
use sketchcc::terminal::LineAssembler;

fn console_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            4 => any::<u8>(),
            2 => Just(b'\n'),
            2 => Just(b'\r'),
            1 => Just(0x1b),
            1 => Just(b'['),
            1 => Just(b';'),
            1 => Just(b'm'),
        ],
        0..600,
    )
}

fn colored_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z0-9 #/.~-]{1,12}",
            "\x1b\\[[0-9]{1,2}(;[0-9]{1,2}){0,2}m",
            Just("\x1b[0m".to_string()),
        ],
        0..20,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn test_one_line_per_newline(data in console_bytes()) {
        let mut assembler = LineAssembler::new();
        assembler.push_all(&data);

        let newlines = data.iter().filter(|b| **b == b'\n').count();
        prop_assert_eq!(assembler.completed_count(), newlines);
        prop_assert_eq!(assembler.lines().len(), newlines + 1);
    }

    #[test]
    fn test_no_line_keeps_separators(data in console_bytes()) {
        let mut assembler = LineAssembler::new();
        assembler.push_all(&data);

        for line in assembler.lines() {
            prop_assert!(!line.contains('\r'));
            prop_assert!(!line.contains('\n'));
        }
    }

    #[test]
    fn test_colour_sequences_are_removed(text in colored_text()) {
        let mut assembler = LineAssembler::new();
        assembler.push_all(text.as_bytes());

        let plain = regex::Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap().replace_all(&text, "");
        prop_assert_eq!(assembler.current_line(), plain.as_ref());
        prop_assert!(!assembler.current_line().contains('\x1b'));
    }

    #[test]
    fn test_chunking_does_not_matter(data in console_bytes(), split in any::<prop::sample::Index>()) {
        let mut whole = LineAssembler::new();
        whole.push_all(&data);

        let at = if data.is_empty() { 0 } else { split.index(data.len()) };
        let mut pieces = LineAssembler::new();
        pieces.push_all(&data[..at]);
        pieces.push_all(&data[at..]);

        prop_assert_eq!(whole.lines(), pieces.lines());
    }

    #[test]
    fn test_clear_resets_to_single_empty_line(data in console_bytes()) {
        let mut assembler = LineAssembler::new();
        assembler.push_all(&data);
        assembler.clear();

        prop_assert_eq!(assembler.lines(), &[String::new()][..]);
    }
}
