//! String interning for state, model and duration names.
use std::collections::HashMap;

/// Index of an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct StrIdx(pub u32);

/// A pool of names. Owned by the HMM that interned them.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    names: Vec<String>,
    index: HashMap<String, StrIdx>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }
    /// Return the index of `name`, adding it if this is the first time.
    pub fn intern(&mut self, name: &str) -> StrIdx {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = StrIdx(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }
    pub fn get(&self, name: &str) -> Option<StrIdx> {
        self.index.get(name).copied()
    }
    pub fn resolve(&self, idx: StrIdx) -> &str {
        &self.names[idx.0 as usize]
    }
    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn intern() {
        let mut pool = StringPool::new();
        let m = pool.intern("Match");
        let i = pool.intern("IntronU2");
        assert_ne!(m, i);
        assert_eq!(pool.intern("Match"), m);
        assert_eq!(pool.resolve(i), "IntronU2");
        assert_eq!(pool.get("Donor"), None);
        assert_eq!(pool.len(), 2);
    }
}
