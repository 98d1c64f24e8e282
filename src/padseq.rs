// Dna: a padded nucleotide sequence that allows "out-of-bound" reads.
//
// # What's this?
//
// `Dna` is a vector of five-letter symbols (A,C,G,T,N), so it is basically `Vec<u8>`.
// The sequence is surrounded by `PADDING` sentinel `N`s, and any index outside
// of the buffer also reads as `N`. Emission windows near the ends of a sequence
// can then be scored without boundary case analysis.
//
// Coordinates are 1-based: the i-th base of the sequence sits at buffer index i.
//
// # Example
//
// ```rust
// use spliced::padseq::*;
// let dna = Dna::new("x", b"ACGT");
// assert_eq!(dna.get_s5(1), ADENINE);
// assert_eq!(dna.get_s5(-10), AMBIGUOUS);
// ```

pub const ADENINE: u8 = 0;
pub const CYTOSINE: u8 = 1;
pub const GUANINE: u8 = 2;
pub const THYMINE: u8 = 3;
pub const AMBIGUOUS: u8 = 4;
/// Number of symbols.
pub const SYMBOLS: usize = 5;
/// Leading and trailing sentinel size.
pub const PADDING: usize = 1;

const fn lookup_table() -> [u8; 256] {
    let mut slots = [AMBIGUOUS; 256];
    slots[b'A' as usize] = ADENINE;
    slots[b'a' as usize] = ADENINE;
    slots[b'C' as usize] = CYTOSINE;
    slots[b'c' as usize] = CYTOSINE;
    slots[b'G' as usize] = GUANINE;
    slots[b'g' as usize] = GUANINE;
    slots[b'T' as usize] = THYMINE;
    slots[b't' as usize] = THYMINE;
    slots
}
const LOOKUP_TABLE: [u8; 256] = lookup_table();

/// Convert an ASCII base into the five-letter encoding.
pub const fn convert_to_s5(base: u8) -> u8 {
    LOOKUP_TABLE[base as usize]
}

/// Complement of an encoded base. N stays N.
pub const fn complement(base: u8) -> u8 {
    if base < AMBIGUOUS {
        THYMINE - base
    } else {
        AMBIGUOUS
    }
}

/// ASCII letter of an encoded base.
pub const fn to_ascii(base: u8) -> u8 {
    b"ACGTN"[base as usize]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dna {
    name: String,
    // Padded, encoded sequence.
    seq: Vec<u8>,
}

impl Dna {
    /// Any byte outside of `ACGTacgt` is stored as `N`.
    pub fn new<T: std::borrow::Borrow<[u8]>>(name: &str, xs: T) -> Self {
        let seq: Vec<_> = std::iter::repeat(AMBIGUOUS)
            .take(PADDING)
            .chain(xs.borrow().iter().map(|&x| convert_to_s5(x)))
            .chain(std::iter::repeat(AMBIGUOUS).take(PADDING))
            .collect();
        Self {
            name: name.to_string(),
            seq,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Number of bases, padding excluded.
    pub fn len(&self) -> usize {
        self.seq.len() - 2 * PADDING
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Symbol at 1-based position `i`. Anything outside of the sequence reads as N.
    pub fn get_s5(&self, i: isize) -> u8 {
        if i < 0 {
            AMBIGUOUS
        } else {
            self.seq.get(i as usize).copied().unwrap_or(AMBIGUOUS)
        }
    }
    /// The bases without padding.
    pub fn iter(&self) -> std::slice::Iter<'_, u8> {
        self.seq[PADDING..self.seq.len() - PADDING].iter()
    }
    /// Reverse-complement in place.
    pub fn anti_complement(&mut self) {
        self.seq.reverse();
        self.seq.iter_mut().for_each(|x| *x = complement(*x));
    }
    /// A reverse-complemented copy.
    pub fn anti_complemented(&self) -> Self {
        let mut dna = self.clone();
        dna.anti_complement();
        dna
    }
    /// Number of N in the sequence.
    pub fn ambiguous_count(&self) -> usize {
        bytecount::count(self.as_ref(), AMBIGUOUS)
    }
    /// Decode back into ASCII.
    pub fn to_ascii(&self) -> Vec<u8> {
        self.iter().map(|&x| to_ascii(x)).collect()
    }
}

impl std::convert::AsRef<[u8]> for Dna {
    fn as_ref(&self) -> &[u8] {
        &self.seq[PADDING..self.seq.len() - PADDING]
    }
}

impl std::fmt::Display for Dna {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, ">{}\n{}", self.name, String::from_utf8_lossy(&self.to_ascii()))
    }
}
