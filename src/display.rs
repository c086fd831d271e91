//! Read-only rendering of diagrams: range-compressed listings and DOT.
//!
//! Both walks consume the unpacked dense view only; they never mutate node
//! state. Consecutive values leading to the same child are compressed into
//! a single range, so a diagram over wide domains (say, octets) prints as
//! `[16-31]` rather than sixteen lines.

use std::collections::HashSet;
use std::fmt::Write;

use crate::forest::Forest;
use crate::handle::MddHandle;
use crate::types::{Level, MddError, NodeIdx, Value};

/// A compressed run of consecutive values with a common child.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PrintRange {
    pub low: Value,
    pub high: Value,
}

impl PrintRange {
    fn render(&self, max_val: Value) -> String {
        if self.low == self.high {
            format!("{}", self.low)
        } else if self.low == 0 && self.high == max_val {
            "*".to_string()
        } else {
            format!("[{}-{}]", self.low, self.high)
        }
    }
}

/// Group a dense child view into `(child, ranges)` runs, in ascending value
/// order. Adjacent values sharing a child merge into one range.
fn compress(view: &[NodeIdx]) -> Vec<(NodeIdx, Vec<PrintRange>)> {
    let mut runs: Vec<(NodeIdx, Vec<PrintRange>)> = Vec::new();
    for (v, &child) in view.iter().enumerate() {
        let v = v as Value;
        if let Some(last) = runs.iter_mut().find(|(c, _)| *c == child) {
            let tail = last.1.last_mut().unwrap();
            if tail.high + 1 == v {
                tail.high = v;
            } else {
                last.1.push(PrintRange { low: v, high: v });
            }
        } else {
            runs.push((child, vec![PrintRange { low: v, high: v }]));
        }
    }
    runs
}

impl Forest {
    /// Every non-default mapping of `root`, one line per distinct value
    /// combination, levels rendered root-most first:
    ///
    /// ```text
    /// [1-2] * 3 -> 1
    /// ```
    pub fn print_ranges(&self, root: &MddHandle) -> Result<String, MddError> {
        let r = self.root_index(root).ok_or(MddError::InvalidMdd)?;
        let mut out = String::new();
        let mut path = Vec::new();
        self.print_ranges_rec(self.num_levels(), r, &mut path, &mut out);
        Ok(out)
    }

    fn print_ranges_rec(&self, k: Level, p: NodeIdx, path: &mut Vec<String>, out: &mut String) {
        if k == 0 {
            if p != 0 {
                writeln!(out, "{} -> {}", path.join(" "), p).unwrap();
            }
            return;
        }
        if p == 0 {
            return;
        }
        for (child, ranges) in compress(&self.unpack_node(k, p)) {
            if child == 0 {
                continue;
            }
            let rendered: Vec<String> = ranges
                .iter()
                .map(|r| r.render(self.max_val(k)))
                .collect();
            path.push(rendered.join(","));
            self.print_ranges_rec(k - 1, child, path, out);
            path.pop();
        }
    }

    /// Graphviz rendering of the sub-diagram under `root`. Nodes are grouped
    /// by level, edges carry the compressed value ranges that select them.
    pub fn to_dot(&self, root: &MddHandle) -> Result<String, MddError> {
        let top = self.num_levels();
        let r = self.root_index(root).ok_or(MddError::InvalidMdd)?;

        let mut out = String::new();
        writeln!(out, "digraph mdd {{").unwrap();
        writeln!(out, "  rankdir=TB;").unwrap();
        writeln!(out, "  node [shape=circle];").unwrap();

        let mut seen: HashSet<(Level, NodeIdx)> = HashSet::new();
        let mut terminals: HashSet<Value> = HashSet::new();
        let mut stack = vec![(top, r)];
        while let Some((k, p)) = stack.pop() {
            if p == 0 || !seen.insert((k, p)) {
                continue;
            }
            writeln!(out, "  n{}_{} [label=\"{}:{}\"];", k, p, k, p).unwrap();
            for (child, ranges) in compress(&self.unpack_node(k, p)) {
                if child == 0 {
                    continue;
                }
                let label: Vec<String> = ranges
                    .iter()
                    .map(|r| r.render(self.max_val(k)))
                    .collect();
                if k == 1 {
                    terminals.insert(child);
                    writeln!(
                        out,
                        "  n{}_{} -> t{} [label=\"{}\"];",
                        k,
                        p,
                        child,
                        label.join(",")
                    )
                    .unwrap();
                } else {
                    writeln!(
                        out,
                        "  n{}_{} -> n{}_{} [label=\"{}\"];",
                        k,
                        p,
                        k - 1,
                        child,
                        label.join(",")
                    )
                    .unwrap();
                    stack.push((k - 1, child));
                }
            }
        }
        let mut terminals: Vec<Value> = terminals.into_iter().collect();
        terminals.sort();
        for t in terminals {
            writeln!(out, "  t{} [shape=box, label=\"{}\"];", t, t).unwrap();
        }
        writeln!(out, "}}").unwrap();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_merges_runs() {
        let runs = compress(&[5, 5, 7, 5]);
        assert_eq!(
            runs,
            vec![
                (
                    5,
                    vec![PrintRange { low: 0, high: 1 }, PrintRange { low: 3, high: 3 }]
                ),
                (7, vec![PrintRange { low: 2, high: 2 }]),
            ]
        );
    }

    #[test]
    fn test_render_full_domain_is_star() {
        let r = PrintRange { low: 0, high: 3 };
        assert_eq!(r.render(3), "*");
        assert_eq!(r.render(7), "[0-3]");
        let single = PrintRange { low: 2, high: 2 };
        assert_eq!(single.render(3), "2");
    }

    #[test]
    fn test_print_ranges_lists_mappings() {
        let mut f = Forest::new(2, &[5, 3, 3]);
        let a = f.mdd_from_range(&[2, 1, 0], &[2, 2, 3]).unwrap();
        let printed = f.print_ranges(&a).unwrap();
        assert_eq!(printed, "* [1-2] -> 2\n");

        let b = f.mdd_from_range(&[4, 3, 1], &[4, 3, 1]).unwrap();
        let both = f.max(&a, &b).unwrap();
        let printed = f.print_ranges(&both).unwrap();
        // Level-2 value 1 now routes through a merged child; the rest of
        // the domain still reaches the original mapping.
        assert!(printed.contains("0,[2-3] [1-2] -> 2"));
        assert!(printed.contains("1 [1-2] -> 2"));
        assert!(printed.contains("1 3 -> 4"));
    }

    #[test]
    fn test_print_empty_diagram() {
        let mut f = Forest::new(2, &[1, 3, 3]);
        let empty = f.attach(0);
        assert_eq!(f.print_ranges(&empty).unwrap(), "");
    }

    #[test]
    fn test_dot_shape() {
        let mut f = Forest::new(2, &[1, 3, 3]);
        let a = f.mdd_from_range(&[1, 0, 2], &[1, 1, 2]).unwrap();
        let dot = f.to_dot(&a).unwrap();
        assert!(dot.starts_with("digraph mdd {"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("[label=\"[0-1]\"]"));
        assert!(dot.contains("t1 [shape=box"));
    }
}
