//! Emission tables: look-up tables over words and weight matrices.
use crate::intern::StrIdx;
use crate::padseq::{complement, Dna, AMBIGUOUS, SYMBOLS};
use crate::score::*;

/// Which sequence a model reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqType {
    Genomic,
    Dna,
    /// Half of the word from the genomic sequence, then half from the cDNA.
    Pair,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// `SYMBOLS^length` scores indexed by a base-5 word, oldest base most significant.
    Lut(Vec<Score>),
    /// `length x SYMBOLS` scores, one row per window position.
    Wmm(Vec<Score>),
}

/// A sequence model.
///
/// The window read for an emission starts `focus` bases before the first
/// emitted base. For a PAIR model, the window is taken on both sequences,
/// each half being `length / 2` bases long.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqModel {
    pub name: StrIdx,
    pub seq_type: SeqType,
    pub length: usize,
    pub focus: usize,
    pub emission: Emission,
}

fn pow5(n: usize) -> usize {
    SYMBOLS.pow(n as u32)
}

// Digits of `idx` as a word of `len` symbols, oldest first.
fn digits(mut idx: usize, len: usize) -> Vec<u8> {
    let mut word = vec![0; len];
    for slot in word.iter_mut().rev() {
        *slot = (idx % SYMBOLS) as u8;
        idx /= SYMBOLS;
    }
    word
}

fn word_index(word: &[u8]) -> usize {
    word.iter().fold(0, |acc, &x| acc * SYMBOLS + x as usize)
}

// Reverse-complement of a word.
fn rc_word(word: &[u8]) -> Vec<u8> {
    word.iter().rev().map(|&x| complement(x)).collect()
}

impl SeqModel {
    /// Length of the window on one sequence.
    pub fn span(&self) -> usize {
        match self.seq_type {
            SeqType::Pair => self.length / 2,
            _ => self.length,
        }
    }
    /// Check the table size against the declared shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.length == 0 {
            return Err("model length should be positive".to_string());
        }
        if self.seq_type == SeqType::Pair && self.length % 2 == 1 {
            return Err("PAIR models should have even length".to_string());
        }
        if self.focus >= self.span() {
            return Err(format!("focus {} is out of the window", self.focus));
        }
        let (expected, actual) = match &self.emission {
            Emission::Lut(table) => (pow5(self.length), table.len()),
            Emission::Wmm(table) => (self.length * SYMBOLS, table.len()),
        };
        if expected != actual {
            return Err(format!("{} values expected, {} found", expected, actual));
        }
        if self.seq_type == SeqType::Pair && matches!(self.emission, Emission::Wmm(_)) {
            return Err("PAIR models should be LUT".to_string());
        }
        Ok(())
    }
    /// Score the window whose emitted region starts at genomic `g` / cDNA `c` (1-based).
    pub fn score(&self, genomic: &Dna, cdna: &Dna, g: isize, c: isize) -> Score {
        let focus = self.focus as isize;
        match (&self.emission, self.seq_type) {
            (Emission::Lut(table), SeqType::Genomic) => {
                table[Self::window(genomic, g - focus, self.length)]
            }
            (Emission::Lut(table), SeqType::Dna) => table[Self::window(cdna, c - focus, self.length)],
            (Emission::Lut(table), SeqType::Pair) => {
                let half = self.length / 2;
                let gword = Self::window(genomic, g - focus, half);
                let cword = Self::window(cdna, c - focus, half);
                table[gword * pow5(half) + cword]
            }
            (Emission::Wmm(table), seq_type) => {
                let (seq, start) = match seq_type {
                    SeqType::Dna => (cdna, c - focus),
                    _ => (genomic, g - focus),
                };
                (0..self.length)
                    .map(|i| table[i * SYMBOLS + seq.get_s5(start + i as isize) as usize])
                    .sum()
            }
        }
    }
    fn window(seq: &Dna, start: isize, len: usize) -> usize {
        (start..start + len as isize).fold(0, |acc, i| acc * SYMBOLS + seq.get_s5(i) as usize)
    }
    /// Replace every entry involving N by the log of the mean probability of its concrete expansions.
    pub fn ambiguate(&mut self) {
        match &mut self.emission {
            Emission::Wmm(table) => {
                for row in table.chunks_mut(SYMBOLS) {
                    let mean = logsumexp(&row[..AMBIGUOUS as usize]) - (AMBIGUOUS as f64).ln();
                    row[AMBIGUOUS as usize] = mean;
                }
            }
            Emission::Lut(table) => {
                let len = self.length;
                let original = table.clone();
                for (idx, slot) in table.iter_mut().enumerate() {
                    let word = digits(idx, len);
                    if word.iter().all(|&x| x != AMBIGUOUS) {
                        continue;
                    }
                    let expansions: Vec<_> = concrete_expansions(&word)
                        .into_iter()
                        .map(|w| original[word_index(&w)])
                        .collect();
                    *slot = logsumexp(&expansions) - (expansions.len() as f64).ln();
                }
            }
        }
    }
    /// The model reading the reverse-complemented sequences, for a state emitting
    /// `region` bases per unit on each sequence it reads.
    pub fn anti_complemented(&self, region: usize) -> Self {
        let focus = self.span() - region - self.focus;
        let emission = match &self.emission {
            Emission::Wmm(table) => {
                let mut rev = vec![MIN_SCORE; table.len()];
                for i in 0..self.length {
                    for b in 0..SYMBOLS {
                        let from = (self.length - 1 - i) * SYMBOLS + complement(b as u8) as usize;
                        rev[i * SYMBOLS + b] = table[from];
                    }
                }
                Emission::Wmm(rev)
            }
            Emission::Lut(table) => {
                let rev: Vec<_> = (0..table.len())
                    .map(|idx| {
                        let word = digits(idx, self.length);
                        let from = match self.seq_type {
                            SeqType::Pair => {
                                let (gw, cw) = word.split_at(self.length / 2);
                                let mut w = rc_word(gw);
                                w.extend(rc_word(cw));
                                w
                            }
                            _ => rc_word(&word),
                        };
                        table[word_index(&from)]
                    })
                    .collect();
                Emission::Lut(rev)
            }
        };
        Self {
            name: self.name,
            seq_type: self.seq_type,
            length: self.length,
            focus,
            emission,
        }
    }
    pub fn values(&self) -> &[Score] {
        match &self.emission {
            Emission::Lut(table) => table,
            Emission::Wmm(table) => table,
        }
    }
}

fn concrete_expansions(word: &[u8]) -> Vec<Vec<u8>> {
    word.iter().fold(vec![vec![]], |words, &x| {
        let choices: Vec<u8> = if x == AMBIGUOUS { vec![0, 1, 2, 3] } else { vec![x] };
        words
            .iter()
            .flat_map(|w| {
                choices.iter().map(move |&b| {
                    let mut w = w.clone();
                    w.push(b);
                    w
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    fn match_model() -> SeqModel {
        let mut table = vec![MIN_SCORE; 25];
        for g in 0..4 {
            for c in 0..4 {
                let p: f64 = if g == c { 0.24 } else { 0.04 / 12.0 };
                table[g * 5 + c] = p.ln();
            }
        }
        SeqModel {
            name: StrIdx(0),
            seq_type: SeqType::Pair,
            length: 2,
            focus: 0,
            emission: Emission::Lut(table),
        }
    }
    #[test]
    fn ambiguate_idempotent() {
        let mut model = match_model();
        model.ambiguate();
        let once = model.clone();
        model.ambiguate();
        assert_eq!(once, model);
        let nn = model.values()[24];
        let expected = (0.24 * 4.0 + 0.04) / 16.0;
        assert!((nn - f64::ln(expected)).abs() < 1e-9);
        let an = model.values()[4];
        assert!((an - f64::ln((0.24 + 0.04 / 4.0) / 4.0)).abs() < 1e-9);
    }
    #[test]
    fn pair_score() {
        let model = match_model();
        let genomic = Dna::new("g", b"ACGT".as_ref());
        let cdna = Dna::new("c", b"AGGT".as_ref());
        assert!((model.score(&genomic, &cdna, 1, 1) - 0.24f64.ln()).abs() < 1e-12);
        assert!((model.score(&genomic, &cdna, 2, 2) - (0.04f64 / 12.0).ln()).abs() < 1e-12);
    }
    #[test]
    fn wmm_anti_complement() {
        let table: Vec<_> = (0..3 * SYMBOLS).map(|x| -(x as f64)).collect();
        let model = SeqModel {
            name: StrIdx(0),
            seq_type: SeqType::Genomic,
            length: 3,
            focus: 0,
            emission: Emission::Wmm(table),
        };
        let genomic = Dna::new("g", b"TTGACCA".as_ref());
        let rev = genomic.anti_complemented();
        let rev_model = model.anti_complemented(3);
        assert_eq!(rev_model.focus, 0);
        // "GAC" at 3..=5 mirrors to "GTC" at 3..=5 of the reverse strand.
        let x = model.score(&genomic, &genomic, 3, 0);
        let y = rev_model.score(&rev, &rev, 3, 0);
        assert_eq!(x, y);
    }
    #[test]
    fn lut_anti_complement_with_context() {
        let table: Vec<_> = (0..pow5(3)).map(|x| -(x as f64) / 7.0).collect();
        let model = SeqModel {
            name: StrIdx(0),
            seq_type: SeqType::Genomic,
            length: 3,
            focus: 2,
            emission: Emission::Lut(table),
        };
        let genomic = Dna::new("g", b"ACGTTGCAAC".as_ref());
        let len = genomic.len() as isize;
        let rev = genomic.anti_complemented();
        let rev_model = model.anti_complemented(1);
        assert_eq!(rev_model.focus, 0);
        for g in 1..=len {
            let x = model.score(&genomic, &genomic, g, 0);
            let y = rev_model.score(&rev, &rev, len + 1 - g, 0);
            assert_eq!(x, y, "{}", g);
        }
    }
    #[test]
    fn validate() {
        let mut model = match_model();
        assert!(model.validate().is_ok());
        model.focus = 1;
        assert!(model.validate().is_err());
        model.focus = 0;
        model.emission = Emission::Lut(vec![0f64; 24]);
        assert!(model.validate().is_err());
    }
}
