//! File I/O for rooted diagrams.
//!
//! A saved diagram is a line-oriented text file:
//!
//! ```text
//! mdd <K>
//! maxvals <m0> <m1> ... <mK>
//! node <id> <level> <arcs> {<value> <child>}*
//! root <id>
//! ```
//!
//! Nodes appear bottom-up (children before parents); ids are file-local and
//! 1-based. At level 1 the `child` fields are terminal values, everywhere
//! else they are ids of previously listed nodes. `root 0` is the empty
//! diagram.
//!
//! Loading replays the construction protocol (`new_node` / `set_arc` /
//! `check_in`), so a diagram loaded into a forest that already contains
//! structurally equal nodes folds into them instead of duplicating.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::forest::Forest;
use crate::handle::MddHandle;
use crate::types::{Level, NodeIdx, Value};

/// Error type for I/O operations.
#[derive(Debug)]
pub enum IoError {
    /// File I/O error.
    Io(io::Error),
    /// Parse error with message.
    Parse(String),
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        IoError::Io(e)
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "I/O error: {}", e),
            IoError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for IoError {}

fn parse_token<T: std::str::FromStr>(
    tokens: &mut std::str::SplitWhitespace<'_>,
    what: &str,
) -> Result<T, IoError> {
    tokens
        .next()
        .ok_or_else(|| IoError::Parse(format!("missing {}", what)))?
        .parse()
        .map_err(|_| IoError::Parse(format!("malformed {}", what)))
}

impl Forest {
    /// Write the diagram under `root` to `path`.
    pub fn save_mdd(&self, root: &MddHandle, path: impl AsRef<Path>) -> Result<(), IoError> {
        let top = self.num_levels();
        let r = self
            .root_index(root)
            .ok_or_else(|| IoError::Parse("handle does not refer to a live MDD".to_string()))?;
        debug!("save_mdd({}, {:?})", r, path.as_ref());

        // Collect reachable nodes, then emit bottom-up with file-local ids.
        let mut per_level: Vec<Vec<NodeIdx>> = vec![Vec::new(); top + 1];
        let mut seen: HashMap<(Level, NodeIdx), usize> = HashMap::new();
        let mut stack = vec![(top, r)];
        while let Some((k, p)) = stack.pop() {
            if p == 0 || seen.contains_key(&(k, p)) {
                continue;
            }
            seen.insert((k, p), 0);
            per_level[k].push(p);
            if k > 1 {
                for c in self.unpack_node(k, p) {
                    if c != 0 {
                        stack.push((k - 1, c));
                    }
                }
            }
        }

        let mut out = String::new();
        out.push_str(&format!("mdd {}\n", top));
        let bounds: Vec<String> = (0..=top).map(|k| self.max_val(k).to_string()).collect();
        out.push_str(&format!("maxvals {}\n", bounds.join(" ")));

        let mut next_id = 1;
        for k in 1..=top {
            // Slot order keeps the output stable for a given forest state.
            per_level[k].sort_unstable();
            for &p in &per_level[k] {
                let id = next_id;
                next_id += 1;
                seen.insert((k, p), id);

                let pairs: Vec<(Value, NodeIdx)> = self
                    .unpack_node(k, p)
                    .into_iter()
                    .enumerate()
                    .filter(|&(_, c)| c != 0)
                    .map(|(v, c)| (v as Value, c))
                    .collect();
                out.push_str(&format!("node {} {} {}", id, k, pairs.len()));
                for (v, c) in pairs {
                    let child = if k == 1 {
                        c as usize
                    } else {
                        seen[&(k - 1, c)]
                    };
                    out.push_str(&format!(" {} {}", v, child));
                }
                out.push('\n');
            }
        }
        out.push_str(&format!(
            "root {}\n",
            if r == 0 { 0 } else { seen[&(top, r)] }
        ));

        fs::write(path, out)?;
        Ok(())
    }

    /// Load a diagram from `path` and attach a handle to its root. The file
    /// must describe a forest of the same depth; wider domains grow this
    /// forest's levels accordingly.
    pub fn load_mdd(&mut self, path: impl AsRef<Path>) -> Result<MddHandle, IoError> {
        let top = self.num_levels();
        let content = fs::read_to_string(path.as_ref())?;
        debug!("load_mdd({:?})", path.as_ref());

        let mut ids: HashMap<usize, (Level, NodeIdx)> = HashMap::new();
        let mut root: Option<NodeIdx> = None;

        for line in content.lines() {
            let mut tokens = line.split_whitespace();
            let keyword = match tokens.next() {
                Some(t) => t,
                None => continue,
            };
            match keyword {
                "mdd" => {
                    let k: usize = parse_token(&mut tokens, "level count")?;
                    if k != top {
                        return Err(IoError::Parse(format!(
                            "file has {} levels, forest has {}",
                            k, top
                        )));
                    }
                }
                "maxvals" => {
                    for k in 0..=top {
                        let m: Value = parse_token(&mut tokens, "domain bound")?;
                        if m > self.max_val(k) {
                            self.change_domain(k, m)
                                .map_err(|e| IoError::Parse(e.to_string()))?;
                        }
                    }
                }
                "node" => {
                    let id: usize = parse_token(&mut tokens, "node id")?;
                    let k: Level = parse_token(&mut tokens, "node level")?;
                    if k < 1 || k > top {
                        return Err(IoError::Parse(format!("node {} at level {}", id, k)));
                    }
                    let arcs: usize = parse_token(&mut tokens, "arc count")?;
                    let p = self.new_node(k);
                    for _ in 0..arcs {
                        let v: Value = parse_token(&mut tokens, "arc value")?;
                        let c: usize = parse_token(&mut tokens, "arc child")?;
                        if v < 0 || v > self.max_val(k) {
                            return Err(IoError::Parse(format!(
                                "arc value {} outside level {}",
                                v, k
                            )));
                        }
                        let child = if k == 1 {
                            let c = c as NodeIdx;
                            if c > self.max_val(0) {
                                return Err(IoError::Parse(format!("terminal value {}", c)));
                            }
                            c
                        } else {
                            match ids.get(&c) {
                                Some(&(level, idx)) if level == k - 1 => idx,
                                _ => {
                                    return Err(IoError::Parse(format!(
                                        "node {} references unknown child {}",
                                        id, c
                                    )))
                                }
                            }
                        };
                        self.set_arc(k, p, v, child);
                    }
                    let p = self.check_in(k, p);
                    ids.insert(id, (k, p));
                }
                "root" => {
                    let id: usize = parse_token(&mut tokens, "root id")?;
                    if id == 0 {
                        root = Some(0);
                    } else {
                        match ids.get(&id) {
                            Some(&(level, idx)) if level == top => root = Some(idx),
                            _ => {
                                return Err(IoError::Parse(format!("unknown root {}", id)));
                            }
                        }
                    }
                }
                other => {
                    return Err(IoError::Parse(format!("unknown keyword '{}'", other)));
                }
            }
        }

        let root = root.ok_or_else(|| IoError::Parse("missing root line".to_string()))?;
        Ok(self.attach(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("mdd_rs_io_{}.mdd", name))
    }

    #[test]
    fn test_round_trip_same_forest_folds() {
        let mut f = Forest::new(3, &[5, 3, 3, 3]);
        let a = f.mdd_from_range(&[2, 1, 0, 2], &[2, 2, 3, 3]).unwrap();
        let b = f.mdd_from_range(&[4, 3, 3, 0], &[4, 3, 3, 1]).unwrap();
        let u = f.max(&a, &b).unwrap();

        let path = temp_path("round_trip");
        f.save_mdd(&u, &path).unwrap();
        let loaded = f.load_mdd(&path).unwrap();
        fs::remove_file(&path).ok();

        // Canonicalization folds the reloaded diagram into the original.
        assert_eq!(f.root_index(&loaded), f.root_index(&u));
    }

    #[test]
    fn test_round_trip_fresh_forest() {
        let mut f = Forest::new(2, &[5, 3, 3]);
        let a = f.mdd_from_range(&[2, 1, 1], &[2, 2, 2]).unwrap();
        let b = f.mdd_from_range(&[5, 0, 0], &[5, 0, 0]).unwrap();
        let u = f.max(&a, &b).unwrap();

        let path = temp_path("fresh_forest");
        f.save_mdd(&u, &path).unwrap();

        let mut g = Forest::new(2, &[1, 1, 1]); // narrower domains: they grow on load
        let loaded = g.load_mdd(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(g.max_val(0), 5);
        assert_eq!(g.value(&loaded, &[0, 1, 1]).unwrap(), 2);
        assert_eq!(g.value(&loaded, &[0, 2, 2]).unwrap(), 2);
        assert_eq!(g.value(&loaded, &[0, 0, 0]).unwrap(), 5);
        assert_eq!(g.value(&loaded, &[0, 3, 3]).unwrap(), 0);
    }

    #[test]
    fn test_empty_diagram_round_trip() {
        let mut f = Forest::new(2, &[1, 3, 3]);
        let empty = f.attach(0);
        let path = temp_path("empty");
        f.save_mdd(&empty, &path).unwrap();
        let loaded = f.load_mdd(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(f.root_index(&loaded), Some(0));
    }

    #[test]
    fn test_parse_errors() {
        let mut f = Forest::new(2, &[1, 3, 3]);

        let path = temp_path("bad_depth");
        fs::write(&path, "mdd 5\n").unwrap();
        let err = f.load_mdd(&path).unwrap_err();
        assert!(matches!(err, IoError::Parse(_)));
        fs::remove_file(&path).ok();

        let path = temp_path("bad_keyword");
        fs::write(&path, "mdd 2\nbogus\n").unwrap();
        assert!(matches!(f.load_mdd(&path).unwrap_err(), IoError::Parse(_)));
        fs::remove_file(&path).ok();

        let path = temp_path("no_root");
        fs::write(&path, "mdd 2\nmaxvals 1 3 3\n").unwrap();
        assert!(matches!(f.load_mdd(&path).unwrap_err(), IoError::Parse(_)));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_rejects_destroyed_handle() {
        let mut f = Forest::new(2, &[1, 3, 3]);
        let a = f.mdd_from_range(&[1, 1, 1], &[1, 1, 1]).unwrap();
        assert_eq!(f.value(&a, &[0, 1, 1]), Ok(1));
        let slot = a.slot();
        f.destroy_mdd(a);
        let stale = MddHandle::new(slot);
        let path = temp_path("stale");
        assert!(matches!(
            f.save_mdd(&stale, &path).unwrap_err(),
            IoError::Parse(_)
        ));
    }
}
