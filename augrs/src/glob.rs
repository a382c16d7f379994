//! Shell-style glob matching for transform `incl`/`excl` patterns.
//!
//! Syntax:
//!
//! ```text
//! *        any run of characters within one path component
//! ?        any single character except `/`
//! [...]    character class; `[^...]` or `[!...]` negated; `a-z` ranges
//! \x       literal x
//! ```
//!
//! Matching is case-sensitive and works on bytes.  A wildcard never matches
//! `/`, so `/etc/default/*` does not reach into subdirectories.

/// `true` if `text` matches the whole of `pat`.
///
/// Pattern and text are compared component by component, so a wildcard is
/// confined to the component it appears in.
pub fn glob_match(pat: &str, text: &str) -> bool {
    let mut pats = pat.split('/');
    let mut parts = text.split('/');
    loop {
        match (pats.next(), parts.next()) {
            (None, None) => return true,
            (Some(p), Some(t)) if component_match(p.as_bytes(), t.as_bytes()) => {}
            _ => return false,
        }
    }
}

/// `true` if `pat` contains any wildcard and therefore needs a directory walk.
pub fn has_wildcard(pat: &str) -> bool {
    let b = pat.as_bytes();
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'*' | b'?' | b'[' => return true,
            _ => i += 1,
        }
    }
    false
}

/// Match one path component.  Backtracks only to the most recent `*`, which
/// keeps the cost linear in practice.
fn component_match(pat: &[u8], s: &[u8]) -> bool {
    let (mut p, mut i) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while i < s.len() {
        if let Some(&c) = pat.get(p) {
            let step = match c {
                b'*' => {
                    star = Some((p + 1, i));
                    p += 1;
                    continue;
                }
                b'?' => Some(1),
                b'[' => cmatch(&pat[p + 1..], s[i]).map(|rest| pat.len() - p - rest.len()),
                b'\\' if p + 1 < pat.len() => (pat[p + 1] == s[i]).then_some(2),
                _ => (c == s[i]).then_some(1),
            };
            if let Some(n) = step {
                p += n;
                i += 1;
                continue;
            }
        }
        match star {
            Some((sp, si)) => {
                p = sp;
                i = si + 1;
                star = Some((sp, si + 1));
            }
            None => return false,
        }
    }
    while pat.get(p) == Some(&b'*') {
        p += 1;
    }
    p == pat.len()
}

/// Match a character class against `ch`.
///
/// `class` is the slice after the opening `[`.  Returns the slice after the
/// closing `]` on match, `None` on non-match or a malformed class.
fn cmatch(mut class: &[u8], ch: u8) -> Option<&[u8]> {
    let negated = matches!(class.first(), Some(b'^' | b'!'));
    if negated {
        class = &class[1..];
    }

    let mut matched = false;
    let mut first = true;
    loop {
        match class.first().copied() {
            None => return None,
            Some(b']') if !first => break,
            Some(b'\\') if class.len() > 1 => {
                matched |= class[1] == ch;
                class = &class[2..];
            }
            Some(lo) => {
                if class.len() >= 3 && class[1] == b'-' && class[2] != b']' {
                    matched |= (lo..=class[2]).contains(&ch);
                    class = &class[3..];
                } else {
                    matched |= lo == ch;
                    class = &class[1..];
                }
            }
        }
        first = false;
    }

    let rest = &class[1..];
    if matched ^ negated {
        Some(rest)
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_paths() {
        assert!(glob_match("/etc/hosts", "/etc/hosts"));
        assert!(!glob_match("/etc/hosts", "/etc/hosts.allow"));
    }

    #[test]
    fn star_stays_in_component() {
        assert!(glob_match("/etc/default/*", "/etc/default/grub"));
        assert!(!glob_match("/etc/default/*", "/etc/default/grub.d/x"));
        assert!(glob_match("/etc/*/grub", "/etc/default/grub"));
        assert!(glob_match("/etc/*.conf", "/etc/.conf"));
    }

    #[test]
    fn question_and_class() {
        assert!(glob_match("/etc/host?", "/etc/hosts"));
        assert!(glob_match("/etc/[a-h]osts", "/etc/hosts"));
        assert!(!glob_match("/etc/[!h]osts", "/etc/hosts"));
        assert!(glob_match("/etc/[]]", "/etc/]"));
    }

    #[test]
    fn escaped_wildcard_is_literal() {
        assert!(glob_match("/tmp/a\\*b", "/tmp/a*b"));
        assert!(!glob_match("/tmp/a\\*b", "/tmp/axb"));
        assert!(!has_wildcard("/tmp/a\\*b"));
        assert!(has_wildcard("/etc/default/*"));
    }

    #[test]
    fn pathological_pattern_terminates() {
        let text = format!("/{}", "a".repeat(200));
        assert!(!glob_match("/*a*a*a*a*a*a*a*a*b", &text));
    }
}
