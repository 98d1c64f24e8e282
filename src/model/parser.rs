//! Reader of the parameter file.
//!
//! ```text
//! <HMM> name states transitions durations models
//! <STATES>
//! name INTERNAL|EXPLICIT +|- init-score duration model dg dc
//! <HMM_TRANSITIONS>
//! from to|END probability
//! <STATE_DURATIONS>
//! name pieces
//!     GEOMETRIC start end mean weight
//!     CONSTANT start end score
//!     DEFINED start end score...
//! <SEQUENCE_MODELS>
//! name LUT|WMM GENOMIC|DNA|PAIR length focus symbols score...
//! ```
//! Tokens are separated by white spaces and `#` starts a comment.
//! The null model of `X` is the model named `X_NULL`.
use super::*;
use crate::error::{PairError, Result};
use crate::padseq::SYMBOLS;

struct Tokens<'a> {
    file: &'a str,
    tokens: Vec<(usize, &'a str)>,
    cursor: usize,
}

impl<'a> Tokens<'a> {
    fn new(file: &'a str, text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(no, line)| {
                let line = line.split('#').next().unwrap_or("");
                line.split_whitespace().map(move |t| (no + 1, t))
            })
            .collect();
        Self {
            file,
            tokens,
            cursor: 0,
        }
    }
    fn line(&self) -> usize {
        match self.tokens.get(self.cursor) {
            Some(&(line, _)) => line,
            None => self.tokens.last().map(|&(line, _)| line).unwrap_or(0),
        }
    }
    fn error<T>(&self, msg: String) -> Result<T> {
        Err(PairError::Parameter {
            file: self.file.to_string(),
            line: self.line(),
            msg,
        })
    }
    fn next(&mut self, what: &str) -> Result<&'a str> {
        match self.tokens.get(self.cursor) {
            Some(&(_, token)) => {
                self.cursor += 1;
                Ok(token)
            }
            None => self.error(format!("unexpected end of file while reading {}", what)),
        }
    }
    fn expect(&mut self, keyword: &str) -> Result<()> {
        let token = self.next(keyword)?;
        if token == keyword {
            Ok(())
        } else {
            self.cursor -= 1;
            self.error(format!("expected {}, found {}", keyword, token))
        }
    }
    fn usize(&mut self, what: &str) -> Result<usize> {
        let token = self.next(what)?;
        match token.parse() {
            Ok(x) => Ok(x),
            Err(_) => {
                self.cursor -= 1;
                self.error(format!("{} should be a non-negative integer, found {}", what, token))
            }
        }
    }
    fn float(&mut self, what: &str) -> Result<f64> {
        let token = self.next(what)?;
        match token.parse::<f64>() {
            Ok(x) if !x.is_nan() => Ok(x),
            _ => {
                self.cursor -= 1;
                self.error(format!("{} should be a number, found {}", what, token))
            }
        }
    }
    fn score(&mut self, what: &str) -> Result<Score> {
        let token = self.next(what)?;
        match parse_score(token) {
            Some(x) => Ok(x),
            None => {
                self.cursor -= 1;
                self.error(format!("{} should be a score, found {}", what, token))
            }
        }
    }
    fn probability(&mut self, what: &str) -> Result<Score> {
        let p = self.float(what)?;
        if p < 0f64 {
            self.cursor -= 1;
            return self.error(format!("negative probability {}", p));
        }
        Ok(float2score(p))
    }
    fn is_done(&self) -> bool {
        self.cursor >= self.tokens.len()
    }
}

/// Read a parameter file.
pub fn read_hmm<P: AsRef<std::path::Path>>(path: P, use_null: bool) -> Result<Hmm> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| PairError::io(path, e))?;
    parse_hmm(&path.to_string_lossy(), &text, use_null)
}

// A state line before the references are resolved.
struct StateLine<'a> {
    line: usize,
    name: &'a str,
    state_type: StateType,
    strand: Strand,
    init: Score,
    duration: &'a str,
    model: &'a str,
    dg: usize,
    dc: usize,
}

/// Parse the content of a parameter file. `file` is used in error messages.
pub fn parse_hmm(file: &str, text: &str, use_null: bool) -> Result<Hmm> {
    let mut tokens = Tokens::new(file, text);
    tokens.expect("<HMM>")?;
    let name = tokens.next("model name")?.to_string();
    let num_states = tokens.usize("number of states")?;
    let num_transitions = tokens.usize("number of transitions")?;
    let num_durations = tokens.usize("number of durations")?;
    let num_models = tokens.usize("number of models")?;
    let mut pool = StringPool::new();

    tokens.expect("<STATES>")?;
    let mut lines = Vec::with_capacity(num_states);
    for _ in 0..num_states {
        let line = tokens.line();
        let name = tokens.next("state name")?;
        let state_type = match tokens.next("state type")? {
            "INTERNAL" => StateType::Internal,
            "EXPLICIT" => StateType::Explicit,
            other => {
                tokens.cursor -= 1;
                return tokens.error(format!("unknown state type {}", other));
            }
        };
        let strand = match tokens.next("strand")?.chars().next().and_then(Strand::from_char) {
            Some(strand) => strand,
            None => {
                tokens.cursor -= 1;
                return tokens.error("strand should be + or -".to_string());
            }
        };
        let init = tokens.score("initial score")?;
        let duration = tokens.next("duration name")?;
        let model = tokens.next("model name")?;
        let dg = tokens.usize("genomic increment")?;
        let dc = tokens.usize("cDNA increment")?;
        if lines.iter().any(|l: &StateLine| l.name == name) {
            return Err(PairError::Parameter {
                file: file.to_string(),
                line,
                msg: format!("state {} is declared twice", name),
            });
        }
        lines.push(StateLine {
            line,
            name,
            state_type,
            strand,
            init,
            duration,
            model,
            dg,
            dc,
        });
    }

    tokens.expect("<HMM_TRANSITIONS>")?;
    let state_of = |name: &str| lines.iter().position(|l| l.name == name);
    let mut transitions = vec![];
    let mut exits = vec![];
    for _ in 0..num_transitions {
        let line = tokens.line();
        let error = |msg: String| PairError::Parameter {
            file: file.to_string(),
            line,
            msg,
        };
        let from = tokens.next("source state")?;
        let to = tokens.next("destination state")?;
        let score = tokens.probability("transition probability")?;
        let from = state_of(from).ok_or_else(|| error(format!("unknown state {}", from)))?;
        if to == "END" {
            exits.push((from, score));
            continue;
        }
        match state_of(to) {
            Some(to) if to == from && lines[from].state_type == StateType::Internal => {
                return Err(error(format!(
                    "INTERNAL state {} cannot transit to itself; use its duration",
                    lines[from].name
                )))
            }
            Some(to) => transitions.push((from, to, score)),
            None => return Err(error(format!("unknown state {}", to))),
        }
    }

    tokens.expect("<STATE_DURATIONS>")?;
    let mut durations = Vec::with_capacity(num_durations);
    for _ in 0..num_durations {
        let name = tokens.next("duration name")?;
        let line = tokens.line();
        let num_pieces = tokens.usize("number of pieces")?;
        let mut pieces = Vec::with_capacity(num_pieces);
        for _ in 0..num_pieces {
            let kind = tokens.next("distribution type")?;
            let start = tokens.usize("start")?;
            let end = tokens.usize("end")?;
            let piece = match kind {
                "GEOMETRIC" => {
                    let mean = tokens.float("mean")?;
                    let weight = tokens.float("weight")?;
                    Piece::Geometric {
                        start,
                        end,
                        mean,
                        weight,
                    }
                }
                "CONSTANT" => Piece::Constant {
                    start,
                    end,
                    score: tokens.score("constant score")?,
                },
                "DEFINED" => {
                    if end < start || end - start >= DURATION_MAX {
                        return tokens.error(format!("bad range [{},{}]", start, end));
                    }
                    let scores = (start..=end)
                        .map(|_| tokens.score("defined score"))
                        .collect::<Result<Vec<_>>>()?;
                    Piece::Defined { start, end, scores }
                }
                other => return tokens.error(format!("unknown distribution {}", other)),
            };
            pieces.push(piece);
        }
        let dist = Distribution::new(pieces).map_err(|msg| PairError::Parameter {
            file: file.to_string(),
            line,
            msg: format!("duration {}: {}", name, msg),
        })?;
        durations.push((pool.intern(name), dist));
    }

    tokens.expect("<SEQUENCE_MODELS>")?;
    let mut models = Vec::with_capacity(num_models);
    for _ in 0..num_models {
        let line = tokens.line();
        let name = tokens.next("model name")?;
        let kind = tokens.next("model type")?;
        let seq_type = match tokens.next("sequence type")? {
            "GENOMIC" => SeqType::Genomic,
            "DNA" => SeqType::Dna,
            "PAIR" => SeqType::Pair,
            other => return tokens.error(format!("unknown sequence type {}", other)),
        };
        let length = tokens.usize("model length")?;
        let focus = tokens.usize("model focus")?;
        let symbols = tokens.usize("number of symbols")?;
        if symbols != SYMBOLS {
            return tokens.error(format!("{} symbols are not supported", symbols));
        }
        if length == 0 || length > 12 {
            return tokens.error(format!("model length {} is not supported", length));
        }
        let size = match kind {
            "LUT" => SYMBOLS.pow(length as u32),
            "WMM" => SYMBOLS * length,
            other => return tokens.error(format!("unknown model type {}", other)),
        };
        let values = (0..size)
            .map(|_| tokens.score("model score"))
            .collect::<Result<Vec<_>>>()?;
        let emission = match kind {
            "LUT" => Emission::Lut(values),
            _ => Emission::Wmm(values),
        };
        let model = SeqModel {
            name: pool.intern(name),
            seq_type,
            length,
            focus,
            emission,
        };
        if let Err(msg) = model.validate() {
            return Err(PairError::Parameter {
                file: file.to_string(),
                line,
                msg: format!("model {}: {}", name, msg),
            });
        }
        models.push(model);
    }
    if !tokens.is_done() {
        return tokens.error("trailing tokens after the last model".to_string());
    }

    let explicit_exit = !exits.is_empty();
    let mut states = Vec::with_capacity(lines.len());
    for (s, l) in lines.iter().enumerate() {
        let error = |msg: String| PairError::Parameter {
            file: file.to_string(),
            line: l.line,
            msg,
        };
        let duration = durations
            .iter()
            .position(|(n, _)| pool.resolve(*n) == l.duration)
            .ok_or_else(|| error(format!("unknown duration {}", l.duration)))?;
        let model = models
            .iter()
            .position(|m| pool.resolve(m.name) == l.model)
            .ok_or_else(|| error(format!("unknown model {}", l.model)))?;
        let null_name = format!("{}{}", l.model, NULL_SUFFIX);
        let null = models.iter().position(|m| pool.resolve(m.name) == null_name);
        if use_null && null.is_none() {
            return Err(error(format!(
                "Cannot process NULL model. Try without --nonull ({} not found)",
                null_name
            )));
        }
        let exit = if explicit_exit {
            exits
                .iter()
                .rev()
                .find(|&&(from, _)| from == s)
                .map(|&(_, score)| score)
                .unwrap_or(MIN_SCORE)
        } else {
            0f64
        };
        states.push(State {
            name: pool.intern(l.name),
            state_type: l.state_type,
            strand: l.strand,
            init: l.init,
            exit,
            duration,
            model,
            null: if use_null { null } else { None },
            dg: l.dg,
            dc: l.dc,
            role: StateRole::from_name(l.name, l.dg, l.dc),
        });
    }
    let line = tokens.line();
    let mut hmm = Hmm::new(
        name,
        pool,
        states,
        &transitions,
        explicit_exit,
        durations,
        models,
        use_null,
    )
    .map_err(|msg| PairError::Parameter {
        file: file.to_string(),
        line,
        msg,
    })?;
    hmm.ambiguate();
    debug!(
        "Loaded {} with {} states, window {}",
        hmm.name,
        hmm.num_states(),
        hmm.window()
    );
    Ok(hmm)
}
