//! Log-space score arithmetic.
//!
//! Every probability in this crate is handled as its natural logarithm.
//! `MIN_SCORE` plays the role of log(0): it is the identity of `max`
//! and of `add_log`, and it never turns into NaN.
pub type Score = f64;

/// log(0).
pub const MIN_SCORE: Score = f64::NEG_INFINITY;

/// Convert a probability into a score. Zero (or anything non-positive) becomes `MIN_SCORE`.
pub fn float2score(p: f64) -> Score {
    if p <= 0f64 {
        MIN_SCORE
    } else {
        p.ln()
    }
}

/// Convert a score back into a probability.
pub fn score2float(s: Score) -> f64 {
    if s == MIN_SCORE {
        0f64
    } else {
        s.exp()
    }
}

/// log(exp(a) + exp(b)).
pub fn add_log(a: Score, b: Score) -> Score {
    if a == MIN_SCORE {
        b
    } else if b == MIN_SCORE {
        a
    } else if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// log(sum exp(x)) over `xs`. Empty input gives `MIN_SCORE`.
pub fn logsumexp(xs: &[Score]) -> Score {
    let max = xs.iter().copied().fold(MIN_SCORE, Score::max);
    if max == MIN_SCORE {
        return MIN_SCORE;
    }
    xs.iter().map(|x| (x - max).exp()).sum::<f64>().ln() + max
}

/// Parse a score token. `-inf`, `-INF`, and `*` denote `MIN_SCORE`.
pub fn parse_score(token: &str) -> Option<Score> {
    match token {
        "-inf" | "-INF" | "-Inf" | "*" => Some(MIN_SCORE),
        _ => token.parse::<f64>().ok().filter(|x| !x.is_nan()),
    }
}

/// Format a score so that `parse_score` reads it back.
pub fn format_score(s: Score) -> String {
    if s == MIN_SCORE {
        "-inf".to_string()
    } else {
        format!("{:.6}", s)
    }
}

/// Whether two scores agree up to a relative tolerance.
pub fn approx_eq(a: Score, b: Score, tol: f64) -> bool {
    if a == MIN_SCORE || b == MIN_SCORE {
        return a == b;
    }
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn add_log_identity() {
        assert_eq!(add_log(MIN_SCORE, MIN_SCORE), MIN_SCORE);
        assert_eq!(add_log(-3.0, MIN_SCORE), -3.0);
        assert_eq!(add_log(MIN_SCORE, -2.5), -2.5);
    }
    #[test]
    fn add_log_value() {
        let x = add_log(0.3f64.ln(), 0.2f64.ln());
        assert!((x - 0.5f64.ln()).abs() < 1e-12);
        let y = add_log(0.2f64.ln(), 0.3f64.ln());
        assert!((x - y).abs() < 1e-15);
    }
    #[test]
    fn logsumexp_matches_add_log() {
        let xs = [-1.0, -2.0, MIN_SCORE, -0.5];
        let folded = xs.iter().fold(MIN_SCORE, |acc, &x| add_log(acc, x));
        assert!((logsumexp(&xs) - folded).abs() < 1e-12);
        assert_eq!(logsumexp(&[]), MIN_SCORE);
        assert_eq!(logsumexp(&[MIN_SCORE, MIN_SCORE]), MIN_SCORE);
    }
    #[test]
    fn tokens() {
        assert_eq!(parse_score("-inf"), Some(MIN_SCORE));
        assert_eq!(parse_score("*"), Some(MIN_SCORE));
        assert_eq!(parse_score("-1.5"), Some(-1.5));
        assert_eq!(parse_score("abc"), None);
        assert_eq!(parse_score(&format_score(MIN_SCORE)), Some(MIN_SCORE));
        assert_eq!(float2score(0.0), MIN_SCORE);
        assert_eq!(score2float(MIN_SCORE), 0.0);
    }
}
