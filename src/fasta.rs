//! Very thin Fasta reader. Records are read one at a time.
use crate::error::{PairError, Result};
use crate::padseq::Dna;
use std::io::{BufRead, BufReader};
pub type FASTARecord = (String, Vec<u8>);

/// Streaming reader over the records of a Fasta file.
pub struct FastaReader<R: BufRead> {
    file: String,
    reader: R,
    // Header of the next record, already consumed.
    next_id: Option<String>,
    buffer: String,
    done: bool,
}

impl FastaReader<BufReader<std::fs::File>> {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| PairError::io(path, e))?;
        Ok(Self::new(&path.to_string_lossy(), BufReader::new(file)))
    }
}

impl<R: BufRead> FastaReader<R> {
    /// `file` is used in error messages.
    pub fn new(file: &str, reader: R) -> Self {
        Self {
            file: file.to_string(),
            reader,
            next_id: None,
            buffer: String::new(),
            done: false,
        }
    }
    fn error(&self, msg: String) -> PairError {
        PairError::Fasta {
            file: self.file.clone(),
            msg,
        }
    }
    fn read_line(&mut self) -> Result<bool> {
        self.buffer.clear();
        match self.reader.read_line(&mut self.buffer) {
            Ok(read) => Ok(read > 0),
            Err(e) => Err(PairError::io(&self.file, e)),
        }
    }
    fn next_record(&mut self) -> Result<Option<FASTARecord>> {
        let id = match self.next_id.take() {
            Some(id) => id,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                let line = self.buffer.trim();
                if let Some(header) = line.strip_prefix('>') {
                    break header.split_whitespace().next().unwrap_or("").to_string();
                } else if !line.is_empty() {
                    return Err(self.error("sequence before the first header".to_string()));
                }
            },
        };
        let mut seq = vec![];
        while self.read_line()? {
            let line = self.buffer.trim();
            if let Some(header) = line.strip_prefix('>') {
                self.next_id = Some(header.split_whitespace().next().unwrap_or("").to_string());
                break;
            }
            seq.extend(line.bytes().filter(|b| !b.is_ascii_whitespace()));
        }
        if seq.is_empty() {
            return Err(self.error(format!("record {} has no sequence", id)));
        }
        Ok(Some((id, seq)))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FASTARecord>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.next_record();
        if !matches!(record, Ok(Some(_))) {
            self.done = true;
        }
        record.transpose()
    }
}

/// Read a file that holds exactly one record.
pub fn read_single<P: AsRef<std::path::Path>>(path: P) -> Result<Dna> {
    let path = path.as_ref();
    let mut records = FastaReader::open(path)?;
    let (id, seq) = match records.next() {
        Some(record) => record?,
        None => return Err(records.error("no record".to_string())),
    };
    if records.next().is_some() {
        return Err(records.error("more than one record".to_string()));
    }
    let dna = Dna::new(&id, seq);
    debug!(
        "Read {} ({}bp, {} N) from {}",
        id,
        dna.len(),
        dna.ambiguous_count(),
        path.display()
    );
    Ok(dna)
}
