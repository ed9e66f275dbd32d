//! Base-level helpers for primers, spacers and template strands.

/// Complement of one IUPAC letter, keeping its case. `U` pairs like `T`;
/// anything unknown becomes `N`.
#[inline(always)]
pub fn complement_base(letter: u8) -> u8 {
    let ret = match letter.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'S' => b'S',
        b'W' => b'W',
        _ => b'N',
    };
    if letter.is_ascii_lowercase() {
        ret.to_ascii_lowercase()
    } else {
        ret
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|c| complement_base(*c)).collect()
}

/// Spacers and primer tails only accept unambiguous bases.
pub fn is_dna(text: &str) -> bool {
    text.bytes()
        .all(|c| matches!(c.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complement() {
        assert_eq!(complement_base(b'A'), b'T');
        assert_eq!(complement_base(b'U'), b'A');
        assert_eq!(complement_base(b'a'), b't');
        assert_eq!(complement_base(b'R'), b'Y');
        assert_eq!(complement_base(b'B'), b'V');
        assert_eq!(complement_base(b'S'), b'S');
        assert_eq!(complement_base(b'X'), b'N');
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGTT"), b"AACGTT".to_vec());
        assert_eq!(reverse_complement(b"ATGc"), b"gCAT".to_vec());
        assert!(reverse_complement(b"").is_empty());
    }

    #[test]
    fn test_is_dna() {
        assert!(is_dna(""));
        assert!(is_dna("acgtACGT"));
        assert!(!is_dna("ACGN"));
        assert!(!is_dna("AC GT"));
    }
}
