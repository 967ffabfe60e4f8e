//! Radix-50 packs three characters of a 40-symbol alphabet into one 16-bit
//! word: `c1 * 1600 + c2 * 40 + c3`.

/// The Radix-50 alphabet, indexed by symbol value.
pub const ALPHABET: &[u8; 40] = b" ABCDEFGHIJKLMNOPQRSTUVWXYZ$.%0123456789";

/// Largest valid word plus one.
const WORD_LIMIT: u32 = 40 * 40 * 40;

fn symbol(c: u8) -> Option<u16> {
    ALPHABET
        .iter()
        .position(|a| *a == c.to_ascii_uppercase())
        .and_then(|p| u16::try_from(p).ok())
}

/// True if `c` has a Radix-50 symbol (letters are accepted in either case).
#[must_use]
pub fn is_valid(c: char) -> bool {
    c.is_ascii() && symbol(c as u8).is_some()
}

/// Encode up to three characters into one word. Missing characters are
/// blanks; characters outside the alphabet also encode as blanks.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // three symbols below 40 stay below WORD_LIMIT
pub fn encode_word(text: &str) -> u16 {
    let bytes = text.as_bytes();
    (0..3).fold(0u16, |word, i| {
        let value = bytes.get(i).and_then(|c| symbol(*c)).unwrap_or(0);
        word * 40 + value
    })
}

/// Decode one word into three characters. Words beyond the valid range
/// decode as `???`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // constant non-zero divisors
pub fn decode_word(word: u16) -> String {
    if u32::from(word) >= WORD_LIMIT {
        return "???".to_owned();
    }
    let w = usize::from(word);
    [w / 1600, (w / 40) % 40, w % 40]
        .iter()
        .map(|i| char::from(ALPHABET[*i]))
        .collect()
}

/// Encode a string into consecutive words, three characters per word,
/// padding with blanks to `words` words.
#[must_use]
pub fn encode(text: &str, words: usize) -> Vec<u16> {
    let padded = format!("{text:<width$}", width = words.saturating_mul(3));
    padded
        .as_bytes()
        .chunks(3)
        .take(words)
        .map(|chunk| encode_word(std::str::from_utf8(chunk).unwrap_or("")))
        .collect()
}

/// Decode consecutive words and strip trailing blanks.
#[must_use]
pub fn decode(words: &[u16]) -> String {
    let text: String = words.iter().map(|w| decode_word(*w)).collect();
    text.trim_end().to_owned()
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn test_known_words() {
        // "ABC" = 1*1600 + 2*40 + 3
        assert_eq!(encode_word("ABC"), 1683);
        assert_eq!(encode_word("   "), 0);
        assert_eq!(encode_word("A"), 1600);
        assert_eq!(decode_word(1683), "ABC");
        assert_eq!(decode_word(0), "   ");
    }

    #[test]
    fn test_file_name_words() {
        let words = encode("SWAP", 2);
        assert_eq!(words.len(), 2);
        assert_eq!(decode(&words), "SWAP");
        assert_eq!(decode(&encode("SYS", 1)), "SYS");
    }

    #[test]
    fn test_lowercase_and_invalid() {
        assert_eq!(encode_word("abc"), encode_word("ABC"));
        assert!(is_valid('$'));
        assert!(is_valid('9'));
        assert!(!is_valid('_'));
        assert!(!is_valid('é'));
        assert_eq!(decode_word(u16::MAX), "???");
    }

    #[test]
    fn test_version_word() {
        assert_eq!(decode_word(encode_word("V3A")), "V3A");
    }
}
