//! `Shellvars` lens for `KEY=value` files such as `/etc/environment`.
//!
//! Each assignment becomes a node labelled with the variable name whose
//! value is the raw right-hand side (quotes included).  Comment lines become
//! `#comment` nodes; blank lines are dropped.

use crate::tree::Fragment;

use super::{Lens, LensError};

#[derive(Debug, Clone, Copy, Default)]
pub struct Shellvars;

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_shell_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Lens for Shellvars {
    fn name(&self) -> &str {
        "Shellvars"
    }

    fn get(&self, text: &str) -> Result<Vec<Fragment>, LensError> {
        let mut out = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                out.push(Fragment::new("#comment").with_value(comment.trim()));
                continue;
            }
            let indent = raw.len() - raw.trim_start().len();
            let assignment = line.strip_prefix("export ").map_or(line, str::trim_start);
            let Some((name, value)) = assignment.split_once('=') else {
                return Err(LensError::at("expected NAME=value", i + 1, indent + 1));
            };
            if !is_shell_name(name) {
                return Err(LensError::at(format!("invalid variable name `{name}`"), i + 1, indent + 1));
            }
            out.push(Fragment::new(name).with_value(value));
        }
        Ok(out)
    }

    fn put(&self, tree: &[Fragment], _original: Option<&str>) -> Result<String, LensError> {
        let mut text = String::new();
        for (i, node) in tree.iter().enumerate() {
            let value = node.value.as_deref().unwrap_or_default();
            if node.label == "#comment" {
                text.push_str("# ");
                text.push_str(value);
            } else if is_shell_name(&node.label) {
                if !node.children.is_empty() {
                    return Err(LensError::at(
                        format!("variable `{}` cannot have children", node.label),
                        i + 1,
                        1,
                    ));
                }
                text.push_str(&node.label);
                text.push('=');
                text.push_str(value);
            } else {
                return Err(LensError::at(format!("invalid variable name `{}`", node.label), i + 1, 1));
            }
            text.push('\n');
        }
        Ok(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_assignments_and_comments() {
        let frags = Shellvars.get("# env\nPATH=\"/usr/bin\"\nexport LANG=C\n").unwrap();
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[1].label, "PATH");
        assert_eq!(frags[1].value.as_deref(), Some("\"/usr/bin\""));
        assert_eq!(frags[2].label, "LANG");
    }

    #[test]
    fn get_rejects_garbage() {
        let err = Shellvars.get("A=1\n  not an assignment\n").unwrap_err();
        assert_eq!((err.line, err.char), (Some(2), Some(3)));
    }

    #[test]
    fn put_rejects_bad_name() {
        let frags = vec![Fragment::new("OK").with_value("1"), Fragment::new("9bad").with_value("x")];
        let err = Shellvars.put(&frags, None).unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn put_writes_assignments() {
        let frags = vec![Fragment::new("#comment").with_value("hi"), Fragment::new("A").with_value("1")];
        assert_eq!(Shellvars.put(&frags, None).unwrap(), "# hi\nA=1\n");
    }
}
