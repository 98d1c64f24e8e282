//! Seed alignments and the Stepping-Stone band derived from them.
//!
//! A seed file has one record per cDNA, in the order of the cDNA FASTA:
//! ```text
//! >cdna_description
//! genomic_boundary_start=1001 genomic_boundary_end=5000 strand=+
//! count=2
//! (1101, 1) (1250, 150)
//! (1751, 151) (1900, 300)
//! ```
//! Coordinates are 1-based and inclusive. The cDNA coordinates refer to the
//! cDNA in the orientation it is aligned in (reverse-complemented when `strand=-`).
//! `genomic_boundary_end=0` marks an empty seed.
use crate::error::{PairError, Result};
use crate::model::Strand;
use serde::{Deserialize, Serialize};

/// Default margin around the HSPs.
pub const DEFAULT_MARGIN: usize = 10;

/// A high scoring segment pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsp {
    pub genomic_start: usize,
    pub genomic_end: usize,
    pub cdna_start: usize,
    pub cdna_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAlignment {
    pub description: String,
    pub gb_start: usize,
    pub gb_end: usize,
    pub strand: Option<Strand>,
    pub hsps: Vec<Hsp>,
}

impl SeedAlignment {
    /// A seed without any constraint but the genomic boundary.
    pub fn boundary(description: &str, gb_start: usize, gb_end: usize) -> Self {
        Self {
            description: description.to_string(),
            gb_start,
            gb_end,
            strand: None,
            hsps: vec![],
        }
    }
    pub fn is_empty(&self) -> bool {
        self.gb_end == 0
    }
    /// Check the seed against the sequences it is going to constrain.
    pub fn validate(&self, genomic_len: usize, cdna_len: usize) -> Result<()> {
        let fail = |msg: String| Err(PairError::Invariant(format!("seed {}: {}", self.description, msg)));
        if self.gb_start == 0 || self.gb_start > self.gb_end || self.gb_end > genomic_len {
            return fail(format!(
                "genomic boundary [{},{}] is not within 1..={}",
                self.gb_start, self.gb_end, genomic_len
            ));
        }
        for hsp in self.hsps.iter() {
            let inside_genomic = self.gb_start <= hsp.genomic_start
                && hsp.genomic_start <= hsp.genomic_end
                && hsp.genomic_end <= self.gb_end;
            let inside_cdna = 1 <= hsp.cdna_start && hsp.cdna_start <= hsp.cdna_end && hsp.cdna_end <= cdna_len;
            if !inside_genomic || !inside_cdna {
                return fail(format!(
                    "HSP ({}, {}) ({}, {}) is outside of the sequences",
                    hsp.genomic_start, hsp.cdna_start, hsp.genomic_end, hsp.cdna_end
                ));
            }
        }
        for pair in self.hsps.windows(2) {
            let (x, y) = (&pair[0], &pair[1]);
            let forward = x.genomic_start <= y.genomic_start
                && x.genomic_end <= y.genomic_end
                && x.cdna_start <= y.cdna_start
                && x.cdna_end <= y.cdna_end;
            if !forward {
                return fail(format!(
                    "HSPs ({}, {}) and ({}, {}) are not ordered",
                    x.genomic_start, x.cdna_start, y.genomic_start, y.cdna_start
                ));
            }
        }
        Ok(())
    }
}

/// Read every seed record of a file.
pub fn read_seeds<P: AsRef<std::path::Path>>(path: P) -> Result<Vec<SeedAlignment>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| PairError::io(path, e))?;
    parse_seeds(&path.to_string_lossy(), &text)
}

/// Parse seed records. `file` is used in error messages.
pub fn parse_seeds(file: &str, text: &str) -> Result<Vec<SeedAlignment>> {
    let error = |no: usize, msg: String| PairError::Seed {
        file: file.to_string(),
        msg: format!("line {}: {}", no + 1, msg),
    };
    let mut seeds: Vec<SeedAlignment> = vec![];
    let mut counts: Vec<Option<usize>> = vec![];
    for (no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(description) = line.strip_prefix('>') {
            seeds.push(SeedAlignment::boundary(description.trim(), 0, 0));
            counts.push(None);
            continue;
        }
        let seed = match seeds.last_mut() {
            Some(seed) => seed,
            None => return Err(error(no, "content before the first record".to_string())),
        };
        if line.starts_with('(') {
            let numbers: Vec<usize> = line
                .split(|c: char| c == '(' || c == ')' || c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<usize>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| error(no, format!("{} in {}", e, line)))?;
            if numbers.len() != 4 {
                return Err(error(no, format!("an HSP needs four coordinates: {}", line)));
            }
            seed.hsps.push(Hsp {
                genomic_start: numbers[0],
                cdna_start: numbers[1],
                genomic_end: numbers[2],
                cdna_end: numbers[3],
            });
            continue;
        }
        for field in line.split_whitespace() {
            let mut kv = field.splitn(2, '=');
            let (key, value) = match (kv.next(), kv.next()) {
                (Some(k), Some(v)) => (k, v),
                _ => return Err(error(no, format!("cannot parse {}", field))),
            };
            let number = || {
                value
                    .parse::<usize>()
                    .map_err(|e| error(no, format!("{}: {}", key, e)))
            };
            match key {
                "genomic_boundary_start" => seed.gb_start = number()?,
                "genomic_boundary_end" => seed.gb_end = number()?,
                "strand" => {
                    let strand = value.chars().next().and_then(Strand::from_char);
                    seed.strand = Some(strand.ok_or_else(|| error(no, format!("bad strand {}", value)))?);
                }
                "count" => {
                    if let Some(count) = counts.last_mut() {
                        *count = Some(number()?);
                    }
                }
                _ => return Err(error(no, format!("unknown field {}", key))),
            }
        }
    }
    for (seed, count) in seeds.iter().zip(counts.iter()) {
        if let Some(count) = count {
            if *count != seed.hsps.len() {
                return Err(PairError::Seed {
                    file: file.to_string(),
                    msg: format!(
                        "{} declares {} HSPs but has {}",
                        seed.description,
                        count,
                        seed.hsps.len()
                    ),
                });
            }
        }
    }
    Ok(seeds)
}

// A closed rectangle of trellis cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    g0: usize,
    g1: usize,
    c0: usize,
    c1: usize,
}

/// The set of trellis cells `(g, c)` a decoder is allowed to touch.
/// `g` and `c` count the bases consumed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    g_start: usize,
    g_end: usize,
    c_len: usize,
    rects: Vec<Rect>,
}

impl Band {
    /// Every cell of `[g_start, g_end] x [0, c_len]`.
    pub fn full(g_start: usize, g_end: usize, c_len: usize) -> Self {
        let rects = vec![Rect {
            g0: g_start,
            g1: g_end,
            c0: 0,
            c1: c_len,
        }];
        Self {
            g_start,
            g_end,
            c_len,
            rects,
        }
    }
    /// The Stepping-Stone corridor around the HSPs of `seed`, widened by `margin`.
    pub fn from_seed(seed: &SeedAlignment, c_len: usize, margin: usize) -> Self {
        let (g_start, g_end) = (seed.gb_start - 1, seed.gb_end);
        if seed.hsps.is_empty() {
            return Self::full(g_start, g_end, c_len);
        }
        let m = margin as isize;
        let clip = |g0: isize, g1: isize, c0: isize, c1: isize| Rect {
            g0: g0.max(g_start as isize) as usize,
            g1: g1.min(g_end as isize).max(g_start as isize) as usize,
            c0: c0.max(0) as usize,
            c1: c1.min(c_len as isize).max(0) as usize,
        };
        let mut rects = vec![];
        let first = seed.hsps[0];
        rects.push(clip(
            g_start as isize,
            first.genomic_start as isize - 1 + m,
            0,
            first.cdna_start as isize - 1 + m,
        ));
        for (i, hsp) in seed.hsps.iter().enumerate() {
            let (gs, ge) = (hsp.genomic_start as isize, hsp.genomic_end as isize);
            let (cs, ce) = (hsp.cdna_start as isize, hsp.cdna_end as isize);
            rects.push(clip(gs - 1 - m, ge + m, cs - 1 - m, ce + m));
            if let Some(next) = seed.hsps.get(i + 1) {
                rects.push(clip(
                    ge - m,
                    next.genomic_start as isize - 1 + m,
                    ce - m,
                    next.cdna_start as isize - 1 + m,
                ));
            }
        }
        let last = seed.hsps[seed.hsps.len() - 1];
        rects.push(clip(
            last.genomic_end as isize - m,
            g_end as isize,
            last.cdna_end as isize - m,
            c_len as isize,
        ));
        Self {
            g_start,
            g_end,
            c_len,
            rects,
        }
    }
    pub fn g_start(&self) -> usize {
        self.g_start
    }
    pub fn g_end(&self) -> usize {
        self.g_end
    }
    pub fn c_len(&self) -> usize {
        self.c_len
    }
    pub fn contains(&self, g: usize, c: usize) -> bool {
        self.rects
            .iter()
            .any(|r| r.g0 <= g && g <= r.g1 && r.c0 <= c && c <= r.c1)
    }
    /// Disjoint, sorted, inclusive ranges of `c` allowed in column `g`.
    pub fn column(&self, g: usize) -> Vec<(usize, usize)> {
        let mut ranges: Vec<_> = self
            .rects
            .iter()
            .filter(|r| r.g0 <= g && g <= r.g1)
            .map(|r| (r.c0, r.c1))
            .collect();
        ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = vec![];
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        merged
    }
    /// Number of cells in the band.
    pub fn area(&self) -> usize {
        (self.g_start..=self.g_end)
            .map(|g| self.column(g).iter().map(|(s, e)| e - s + 1).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const SEEDS: &str = ">first cdna
genomic_boundary_start=1 genomic_boundary_end=1000 strand=+
count=2
(101, 1) (220, 120)
(521, 121) (640, 240)
>second
genomic_boundary_start=0 genomic_boundary_end=0
count=0
";
    #[test]
    fn parse() {
        let seeds = parse_seeds("seeds", SEEDS).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].description, "first cdna");
        assert_eq!(seeds[0].strand, Some(Strand::Plus));
        assert_eq!(
            seeds[0].hsps[1],
            Hsp {
                genomic_start: 521,
                genomic_end: 640,
                cdna_start: 121,
                cdna_end: 240
            }
        );
        assert!(!seeds[0].is_empty());
        assert!(seeds[1].is_empty());
        assert!(seeds[0].validate(1000, 240).is_ok());
        assert!(seeds[0].validate(600, 240).is_err());
    }
    #[test]
    fn count_mismatch() {
        let text = SEEDS.replace("count=2", "count=3");
        assert!(matches!(parse_seeds("seeds", &text), Err(PairError::Seed { .. })));
    }
    #[test]
    fn unordered() {
        let mut seed = parse_seeds("seeds", SEEDS).unwrap().remove(0);
        seed.hsps.swap(0, 1);
        assert!(matches!(seed.validate(1000, 240), Err(PairError::Invariant(_))));
    }
    #[test]
    fn band() {
        let seed = parse_seeds("seeds", SEEDS).unwrap().remove(0);
        let band = Band::from_seed(&seed, 240, 10);
        assert_eq!(band.g_start(), 0);
        assert_eq!(band.g_end(), 1000);
        // The path along the seed: flank, HSP, intron, HSP, flank.
        for g in 0..=100 {
            assert!(band.contains(g, 0));
        }
        for i in 0..120 {
            assert!(band.contains(101 + i, 1 + i));
            assert!(band.contains(521 + i, 121 + i));
        }
        for g in 220..=520 {
            assert!(band.contains(g, 120));
        }
        for g in 640..=1000 {
            assert!(band.contains(g, 240));
        }
        assert!(!band.contains(300, 200));
        assert!(!band.contains(800, 10));
        assert_eq!(band.column(300), vec![(110, 130)]);
        assert!(band.area() < 1001 * 241 / 3);
    }
    #[test]
    fn full() {
        let band = Band::from_seed(&SeedAlignment::boundary("x", 11, 20), 5, 10);
        assert_eq!(band.column(10), vec![(0, 5)]);
        assert_eq!(band.area(), 11 * 6);
    }
}
