//! `Hosts` lens for `/etc/hosts`.
//!
//! ```text
//! # comment              →  #comment = "comment"
//! 127.0.0.1 localhost lh →  1/ipaddr = "127.0.0.1"
//!   # loopback              1/canonical = "localhost"
//!                           1/alias = "lh"
//!                           1/#comment = "loopback"
//! ```
//!
//! Entries are labelled `1`, `2`, … in file order.  A comment after the
//! host names becomes the entry's last child.  Blank lines are not
//! represented in the tree and are dropped on save.

use crate::tree::Fragment;

use super::{Lens, LensError};

#[derive(Debug, Clone, Copy, Default)]
pub struct Hosts;

impl Lens for Hosts {
    fn name(&self) -> &str {
        "Hosts"
    }

    fn get(&self, text: &str) -> Result<Vec<Fragment>, LensError> {
        let mut out = Vec::new();
        let mut seq = 0;
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                out.push(Fragment::new("#comment").with_value(comment.trim()));
                continue;
            }
            let (body, trailing) = match line.split_once('#') {
                Some((body, comment)) => (body, Some(comment.trim())),
                None => (line, None),
            };
            let mut words = body.split_whitespace();
            let (Some(ip), Some(canonical)) = (words.next(), words.next()) else {
                let col = raw.len() - raw.trim_start().len() + 1;
                return Err(LensError::at("expected an address followed by a host name", i + 1, col));
            };
            seq += 1;
            let mut entry = Fragment::new(seq.to_string())
                .with_child(Fragment::new("ipaddr").with_value(ip))
                .with_child(Fragment::new("canonical").with_value(canonical));
            for alias in words {
                entry = entry.with_child(Fragment::new("alias").with_value(alias));
            }
            if let Some(comment) = trailing {
                entry = entry.with_child(Fragment::new("#comment").with_value(comment));
            }
            out.push(entry);
        }
        Ok(out)
    }

    fn put(&self, tree: &[Fragment], _original: Option<&str>) -> Result<String, LensError> {
        let mut text = String::new();
        for (i, node) in tree.iter().enumerate() {
            let line = i + 1;
            if node.label == "#comment" {
                text.push_str("# ");
                text.push_str(node.value.as_deref().unwrap_or_default());
                text.push('\n');
                continue;
            }
            if !node.label.bytes().all(|b| b.is_ascii_digit()) || node.label.is_empty() {
                return Err(LensError::at(format!("unexpected node `{}`", node.label), line, 1));
            }
            let (Some(ip), Some(canonical)) = (node.child_value("ipaddr"), node.child_value("canonical"))
            else {
                return Err(LensError::at(
                    format!("entry `{}` needs both ipaddr and canonical", node.label),
                    line,
                    1,
                ));
            };
            text.push_str(ip);
            text.push('\t');
            text.push_str(canonical);
            let mut comment = None;
            for child in &node.children {
                match child.label.as_str() {
                    "ipaddr" | "canonical" => {}
                    "#comment" => comment = child.value.as_deref(),
                    "alias" => {
                        if let Some(a) = child.value.as_deref() {
                            text.push(' ');
                            text.push_str(a);
                        }
                    }
                    other => {
                        return Err(LensError::at(
                            format!("unexpected node `{other}` in entry `{}`", node.label),
                            line,
                            1,
                        ));
                    }
                }
            }
            if let Some(c) = comment {
                text.push_str("\t# ");
                text.push_str(c);
            }
            text.push('\n');
        }
        Ok(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
