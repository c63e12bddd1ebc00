//! Shell-style glob matching against single strings.
//!
//! Supported syntax:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]` / `[a-z]` character sets and ranges
//! - `[!abc]` or `[^abc]` negated sets
//! - `{a,b,c}` brace alternation (nesting allowed)
//! - `\x` escapes the next character

/// Check if a string contains glob metacharacters (`*`, `?`, `[`, `{`).
///
/// Callers use this to decide whether a path argument is a literal name
/// or a pattern that needs expansion.
pub fn contains_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains('{')
}

/// Match a string against a glob pattern.
///
/// Returns true if the pattern matches the entire input. Braces are
/// expanded first, so `*.{rs,go}` matches either `main.rs` or `main.go`.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let input: Vec<char> = input.chars().collect();
    expand_braces(pattern)
        .iter()
        .any(|pat| match_segment(&pat.chars().collect::<Vec<_>>(), &input))
}

/// Expand `{a,b,c}` alternation groups into the full set of patterns.
///
/// Handles nesting; an unclosed brace is treated as a literal.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();

    // Locate the first balanced top-level group.
    let mut depth = 0usize;
    let mut open = None;
    let mut close = None;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let (Some(open), Some(close)) = (open, close) else {
        return vec![pattern.to_string()];
    };

    let prefix: String = chars[..open].iter().collect();
    let suffix: String = chars[close + 1..].iter().collect();
    let body: String = chars[open + 1..close].iter().collect();

    let mut out = Vec::new();
    for alt in split_alternatives(&body) {
        // Recurse to expand any remaining groups in prefix/alt/suffix.
        out.extend(expand_braces(&format!("{prefix}{alt}{suffix}")));
    }
    out
}

/// Split brace body on top-level commas.
fn split_alternatives(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// The token a single pattern position consumes, plus its width in the
/// pattern. Character classes span multiple pattern chars.
enum Token {
    Star,
    Any,
    Literal(char),
    Class { matched: bool, width: usize },
}

fn token_at(pattern: &[char], pi: usize, next_input: Option<char>) -> (Token, usize) {
    match pattern[pi] {
        '*' => (Token::Star, 1),
        '?' => (Token::Any, 1),
        '[' => {
            let (matched, width) = match_char_class(&pattern[pi..], next_input);
            (Token::Class { matched, width }, width)
        }
        '\\' if pi + 1 < pattern.len() => (Token::Literal(pattern[pi + 1]), 2),
        c => (Token::Literal(c), 1),
    }
}

/// Iterative matcher with greedy `*` and single backtrack point.
///
/// Linear-space, O(pattern * input) worst case, so adversarial patterns
/// like `*a*a*a*...` cannot blow up the way naive recursion does.
fn match_segment(pattern: &[char], input: &[char]) -> bool {
    let mut pi = 0usize;
    let mut ii = 0usize;
    // Position of the most recent `*` and the input index it restarts from.
    let mut star: Option<(usize, usize)> = None;

    while ii < input.len() {
        if pi < pattern.len() {
            let (tok, width) = token_at(pattern, pi, Some(input[ii]));
            match tok {
                Token::Star => {
                    // Record the star, try matching zero characters first.
                    star = Some((pi, ii));
                    pi += width;
                    continue;
                }
                Token::Any => {
                    pi += width;
                    ii += 1;
                    continue;
                }
                Token::Literal(c) if c == input[ii] => {
                    pi += width;
                    ii += 1;
                    continue;
                }
                Token::Class { matched: true, .. } => {
                    pi += width;
                    ii += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: give the last `*` one more input character, or fail.
        match star {
            Some((star_pi, star_ii)) => {
                pi = star_pi + 1;
                ii = star_ii + 1;
                star = Some((star_pi, star_ii + 1));
            }
            None => return false,
        }
    }

    // Input consumed. The rest of the pattern must be all stars.
    while pi < pattern.len() {
        match token_at(pattern, pi, None) {
            (Token::Star, width) => pi += width,
            _ => return false,
        }
    }
    true
}

/// Evaluate a `[...]` class against one input character.
///
/// Returns (matched, pattern chars consumed). A leading `]` is literal,
/// an unclosed bracket falls back to matching `[` literally.
fn match_char_class(pattern: &[char], ch: Option<char>) -> (bool, usize) {
    debug_assert_eq!(pattern.first(), Some(&'['));

    let mut idx = 1;
    let negate = matches!(pattern.get(idx), Some('!') | Some('^'));
    if negate {
        idx += 1;
    }

    let first = idx;
    let mut matched = false;
    while idx < pattern.len() {
        let c = pattern[idx];
        if c == ']' && idx > first {
            idx += 1;
            let hit = if negate { !matched } else { matched };
            return (ch.is_some() && hit, idx);
        }
        // Range like a-z, unless the dash is trailing.
        if idx + 2 < pattern.len() && pattern[idx + 1] == '-' && pattern[idx + 2] != ']' {
            if let Some(ch) = ch
                && ch >= c
                && ch <= pattern[idx + 2]
            {
                matched = true;
            }
            idx += 3;
            continue;
        }
        if Some(c) == ch {
            matched = true;
        }
        idx += 1;
    }

    (Some('[') == ch, 1)
}
