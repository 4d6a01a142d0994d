//! Ratcliff/Obershelp similarity over case-folded characters.
//!
//! `ratio = 2 * M / T` where `M` is the number of characters in the matching
//! blocks found by repeatedly taking the longest common block and recursing on
//! both sides of it, and `T` is the total length of both inputs.

use std::collections::HashMap;

/// Similarity in `[0.0, 1.0]`; `1.0` for texts equal after [`fold_case`].
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = folded(a);
    let b = folded(b);
    // The block search breaks ties towards earlier positions of its first
    // argument, so one direction can find fewer matches than the other.
    ratio(&a, &b).max(ratio(&b, &a))
}

/// Cheap upper bound of [`similarity`] from shared character counts.
pub fn quick_upper_bound(a: &str, b: &str) -> f64 {
    let a = folded(a);
    let b = folded(b);
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in &b {
        *available.entry(*c).or_default() += 1;
    }
    let mut shared = 0usize;
    for c in &a {
        if let Some(n) = available.get_mut(c) {
            if *n > 0 {
                *n -= 1;
                shared += 1;
            }
        }
    }
    (2 * shared) as f64 / total as f64
}

/// Full case folding: uppercasing first expands `ß` to `SS`, so `Straße`
/// and `STRASSE` fold to the same `strasse`.
pub fn fold_case(text: &str) -> String {
    text.to_uppercase().to_lowercase()
}

fn folded(text: &str) -> Vec<char> {
    fold_case(text).chars().collect()
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * matched_chars(a, b)) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        b2j.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` inside the given windows; earliest
/// `i`, then earliest `j`, on ties.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    // Length of the match ending at `b[j]` for the previous `a` position.
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_j2len = HashMap::new();
        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next_j2len.insert(j, k);
                if k > best_len {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_len = k;
                }
            }
        }
        j2len = next_j2len;
    }
    (best_i, best_j, best_len)
}
