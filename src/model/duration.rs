//! Piecewise duration distributions.
use crate::score::*;

/// Largest representable duration.
pub const DURATION_MAX: usize = 1 << 24;

/// One piece of a duration distribution, covering `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    /// Geometric with the given mean, scaled by `weight`.
    Geometric {
        start: usize,
        end: usize,
        mean: f64,
        weight: f64,
    },
    /// A constant score per unit.
    Constant { start: usize, end: usize, score: Score },
    /// Explicit scores, one per duration.
    Defined {
        start: usize,
        end: usize,
        scores: Vec<Score>,
    },
}

impl Piece {
    pub fn start(&self) -> usize {
        match self {
            Piece::Geometric { start, .. } => *start,
            Piece::Constant { start, .. } => *start,
            Piece::Defined { start, .. } => *start,
        }
    }
    pub fn end(&self) -> usize {
        match self {
            Piece::Geometric { end, .. } => *end,
            Piece::Constant { end, .. } => *end,
            Piece::Defined { end, .. } => *end,
        }
    }
    // Score of `d` given `base = score(start - 1)`.
    fn score(&self, base: Score, d: usize) -> Score {
        match self {
            Piece::Geometric {
                start,
                mean,
                weight,
                ..
            } => {
                let q = if *mean <= 1f64 { 1f64 } else { mean.recip() };
                let run = (d - start) as f64;
                let ext = float2score(1f64 - q);
                let ext = if run == 0f64 { 0f64 } else { ext * run };
                base + float2score(*weight) + float2score(q) + ext
            }
            Piece::Constant { start, score, .. } => base + score * (d - start + 1) as f64,
            Piece::Defined { start, scores, .. } => scores[d - start],
        }
    }
}

/// A duration distribution over `[1, DURATION_MAX]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pieces: Vec<Piece>,
    // bases[i] = score(pieces[i].start - 1).
    bases: Vec<Score>,
}

impl Distribution {
    /// The pieces should be contiguous from 1. Otherwise, returns an error message.
    pub fn new(pieces: Vec<Piece>) -> Result<Self, String> {
        if pieces.is_empty() {
            return Err("a duration needs at least one piece".to_string());
        }
        let mut expected = 1;
        for piece in pieces.iter() {
            if piece.start() != expected {
                return Err(format!(
                    "piece starts at {} but {} was expected",
                    piece.start(),
                    expected
                ));
            }
            if piece.end() < piece.start() || piece.end() > DURATION_MAX {
                return Err(format!("bad piece [{},{}]", piece.start(), piece.end()));
            }
            if let Piece::Defined { start, end, scores } = piece {
                if scores.len() != end - start + 1 {
                    return Err(format!(
                        "DEFINED [{},{}] needs {} values, {} found",
                        start,
                        end,
                        end - start + 1,
                        scores.len()
                    ));
                }
            }
            if let Piece::Geometric { weight, .. } = piece {
                if *weight < 0f64 {
                    return Err(format!("negative weight {}", weight));
                }
            }
            expected = piece.end() + 1;
        }
        let mut bases = Vec::with_capacity(pieces.len());
        let mut base = 0f64;
        for piece in pieces.iter() {
            bases.push(base);
            base = piece.score(base, piece.end());
        }
        Ok(Self { pieces, bases })
    }
    /// A single geometric piece with the given mean.
    pub fn geometric(mean: f64) -> Self {
        let piece = Piece::Geometric {
            start: 1,
            end: DURATION_MAX,
            mean,
            weight: 1f64,
        };
        Self {
            pieces: vec![piece],
            bases: vec![0f64],
        }
    }
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }
    /// Score of staying exactly `d` units. `score(0)` is 0 and anything beyond the last piece is `MIN_SCORE`.
    pub fn score(&self, d: usize) -> Score {
        if d == 0 {
            return 0f64;
        }
        match self.pieces.iter().position(|p| d <= p.end()) {
            Some(i) => self.pieces[i].score(self.bases[i], d),
            None => MIN_SCORE,
        }
    }
    /// The end of the last DEFINED piece, or 1 if there is none.
    pub fn cap(&self) -> usize {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Defined { end, .. } => Some(*end),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }
    // score(d + 1) - score(d).
    fn diff(&self, d: usize) -> Score {
        let (x, y) = (self.score(d), self.score(d + 1));
        if y == MIN_SCORE {
            MIN_SCORE
        } else {
            y - x
        }
    }
    /// Decompose a memoryless distribution into (entry, extension):
    /// `score(d) = entry + (d - 1) * extension` for every d >= 1.
    /// Returns `None` if the distribution does not have that shape.
    pub fn memoryless(&self) -> Option<(Score, Score)> {
        let entry = self.score(1);
        let ext = self.diff(1);
        let same = |x: Score| approx_eq(x, ext, 1e-6);
        let mut probes = vec![2];
        for piece in self.pieces.iter() {
            let a = piece.start();
            if a > 1 {
                probes.push(a - 1);
                probes.push(a);
            }
            if let Piece::Defined { start, end, .. } = piece {
                probes.extend(*start..=*end);
            }
        }
        probes.retain(|&d| d >= 1 && d < DURATION_MAX);
        probes.iter().all(|&d| same(self.diff(d))).then(|| (entry, ext))
    }
    /// Scores beyond the cap: (step from cap to cap + 1, extension from then on).
    pub fn tail(&self) -> (Score, Score) {
        let cap = self.cap();
        (self.diff(cap), self.diff(cap + 1))
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match piece {
                Piece::Geometric {
                    start,
                    end,
                    mean,
                    weight,
                } => write!(f, "\tGEOMETRIC {} {} {} {}", start, end, mean, weight)?,
                Piece::Constant { start, end, score } => {
                    write!(f, "\tCONSTANT {} {} {}", start, end, format_score(*score))?
                }
                Piece::Defined { start, end, scores } => {
                    write!(f, "\tDEFINED {} {}", start, end)?;
                    for chunk in scores.chunks(10) {
                        let line: Vec<_> = chunk.iter().map(|&x| format_score(x)).collect();
                        write!(f, "\n\t\t{}", line.join(" "))?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn explicit() -> Distribution {
        let scores: Vec<_> = (1..=30).map(|d| -(d as f64) / 10f64 - 2f64).collect();
        Distribution::new(vec![
            Piece::Defined {
                start: 1,
                end: 30,
                scores,
            },
            Piece::Constant {
                start: 31,
                end: DURATION_MAX,
                score: -300f64,
            },
        ])
        .unwrap()
    }
    #[test]
    fn geometric() {
        let dist = Distribution::geometric(10f64);
        let (entry, ext) = dist.memoryless().unwrap();
        assert!((entry - 0.1f64.ln()).abs() < 1e-12);
        assert!((ext - 0.9f64.ln()).abs() < 1e-12);
        assert!((dist.score(5) - (0.1f64.ln() + 4f64 * 0.9f64.ln())).abs() < 1e-9);
    }
    #[test]
    fn geometric_short_mean() {
        let dist = Distribution::geometric(1f64);
        assert_eq!(dist.score(1), 0f64);
        assert_eq!(dist.score(2), MIN_SCORE);
        let (entry, ext) = dist.memoryless().unwrap();
        assert_eq!((entry, ext), (0f64, MIN_SCORE));
    }
    #[test]
    fn explicit_cap() {
        let dist = explicit();
        assert_eq!(dist.cap(), 30);
        assert!(dist.memoryless().is_none());
        let cap = dist.score(30);
        for d in 31..200 {
            let expected = cap - 300f64 * (d - 30) as f64;
            assert!((dist.score(d) - expected).abs() < 1e-6, "{}", d);
        }
        let (step, ext) = dist.tail();
        assert!((step + 300f64).abs() < 1e-9);
        assert!((ext + 300f64).abs() < 1e-9);
    }
    #[test]
    fn single_use() {
        let dist = Distribution::new(vec![
            Piece::Constant {
                start: 1,
                end: 1,
                score: 0f64,
            },
            Piece::Constant {
                start: 2,
                end: DURATION_MAX,
                score: -300f64,
            },
        ])
        .unwrap();
        let (entry, ext) = dist.memoryless().unwrap();
        assert_eq!(entry, 0f64);
        assert!((ext + 300f64).abs() < 1e-9);
    }
    #[test]
    fn not_contiguous() {
        let dist = Distribution::new(vec![Piece::Constant {
            start: 2,
            end: 10,
            score: 0f64,
        }]);
        assert!(dist.is_err());
        let dist = Distribution::new(vec![Piece::Defined {
            start: 1,
            end: 3,
            scores: vec![0f64; 2],
        }]);
        assert!(dist.is_err());
    }
    #[test]
    fn beyond_last_piece() {
        let dist = Distribution::new(vec![Piece::Constant {
            start: 1,
            end: 4,
            score: -1f64,
        }])
        .unwrap();
        assert_eq!(dist.score(4), -4f64);
        assert_eq!(dist.score(5), MIN_SCORE);
    }
}
