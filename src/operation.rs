//! Parsing and rendering of crystallographic symmetry operator strings,
//! e.g. `"-x+1/2, y, z+1/4"`, into exact rational affine maps of Q^3.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::rational::{Rat, RMat3, RVec3};

/// An affine map `v ↦ M·v + t` over Q^3, expressed in the basis identified
/// by three reference labels (by default `"x"`, `"y"`, `"z"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalentPosition {
    pub m: RMat3,
    pub t: RVec3,
}

impl EquivalentPosition {
    pub fn identity() -> Self {
        Self {
            m: [
                [Rat::one(), Rat::zero(), Rat::zero()],
                [Rat::zero(), Rat::one(), Rat::zero()],
                [Rat::zero(), Rat::zero(), Rat::one()],
            ],
            t: [Rat::zero(), Rat::zero(), Rat::zero()],
        }
    }

    /// Apply the map to a fractional position, without folding into [0,1)^3.
    pub fn apply(&self, v: &RVec3) -> RVec3 {
        let mut out = [Rat::zero(), Rat::zero(), Rat::zero()];
        for i in 0..3 {
            let mut acc = self.t[i].clone();
            for j in 0..3 {
                acc = acc.add(&self.m[i][j].mul(&v[j]));
            }
            out[i] = acc;
        }
        out
    }

    /// Render back to the `"x,y,z"`-style grammar using the given reference
    /// identifiers.
    pub fn render(&self, ids: &[String; 3]) -> String {
        let rows: Vec<String> = (0..3)
            .map(|i| {
                let mut s = String::new();
                for j in 0..3 {
                    let c = &self.m[i][j];
                    if c.is_zero() {
                        continue;
                    }
                    push_term(&mut s, c, &ids[j]);
                }
                if !self.t[i].is_zero() {
                    push_offset(&mut s, &self.t[i]);
                }
                if s.is_empty() {
                    s.push('0');
                }
                s
            })
            .collect();
        rows.join(",")
    }
}

impl fmt::Display for EquivalentPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&default_ids()))
    }
}

fn default_ids() -> [String; 3] {
    ["x".to_string(), "y".to_string(), "z".to_string()]
}

/// Append `+coeff*ident` (or `-coeff*ident`) to a row string under
/// construction, suppressing the leading `+` and a unit coefficient.
fn push_term(s: &mut String, coeff: &Rat, ident: &str) {
    let big = coeff.to_big();
    let negative = big.numer().sign() == num_bigint::Sign::Minus;
    let mag = if negative { coeff.neg() } else { coeff.clone() };
    if negative {
        s.push('-');
    } else if !s.is_empty() {
        s.push('+');
    }
    if mag != Rat::one() {
        s.push_str(&mag.to_string());
    }
    s.push_str(ident);
}

fn push_offset(s: &mut String, offset: &Rat) {
    let big = offset.to_big();
    let negative = big.numer().sign() == num_bigint::Sign::Minus;
    let mag = if negative { offset.neg() } else { offset.clone() };
    if negative {
        s.push('-');
    } else if !s.is_empty() {
        s.push('+');
    }
    s.push_str(&mag.to_string());
}

/// Discover the three reference identifiers from the first entry in `all`
/// whose tokens contain no operator characters (`+`, `-`, `/`). Falls back
/// to `("x", "y", "z")`.
pub fn discover_reference_identifiers(all: &[String]) -> [String; 3] {
    for entry in all {
        if entry.contains(['+', '-', '/']) {
            continue;
        }
        let parts: Vec<&str> = entry
            .split(|c| c == ',' || c == ';')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() == 3 {
            return [
                parts[0].to_string(),
                parts[1].to_string(),
                parts[2].to_string(),
            ];
        }
    }
    default_ids()
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Tok {
    Int(i64),
    Ident(usize),
    Plus,
    Minus,
    Slash,
    Comma,
    Semicolon,
}

fn tokenize(s: &str, ids: &[String; 3]) -> Result<Vec<Tok>, NetError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0usize;

    // Try longest identifier first so e.g. an id "xy" (unusual, but the
    // grammar doesn't forbid it) isn't shadowed by a single-letter match.
    let mut order: [usize; 3] = [0, 1, 2];
    order.sort_by_key(|&k| std::cmp::Reverse(ids[k].chars().count()));

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
                continue;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
                continue;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
                continue;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
                continue;
            }
            ';' => {
                toks.push(Tok::Semicolon);
                i += 1;
                continue;
            }
            _ => {}
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n: i64 = text
                .parse()
                .map_err(|_| NetError::SymmetryParseError(format!("bad integer in '{s}'")))?;
            toks.push(Tok::Int(n));
            continue;
        }
        let rest: String = chars[i..].iter().collect();
        let mut matched = false;
        for &k in &order {
            let id = &ids[k];
            if !id.is_empty() && rest.starts_with(id.as_str()) {
                toks.push(Tok::Ident(k));
                i += id.chars().count();
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(NetError::SymmetryParseError(format!(
                "unexpected character '{c}' in '{s}'"
            )));
        }
    }
    Ok(toks)
}

#[derive(Clone, Copy)]
enum Pending {
    None,
    Int(i64),
    Ratio(i64, i64),
}

/// Parse `"-x+1/2, y, z+1/4"`-style strings into an [`EquivalentPosition`].
pub fn parse_symmetry_operator(
    s: &str,
    ids: &[String; 3],
) -> Result<EquivalentPosition, NetError> {
    let toks = tokenize(s, ids)?;

    let mut m: RMat3 = [
        [Rat::zero(), Rat::zero(), Rat::zero()],
        [Rat::zero(), Rat::zero(), Rat::zero()],
        [Rat::zero(), Rat::zero(), Rat::zero()],
    ];
    let mut t: RVec3 = [Rat::zero(), Rat::zero(), Rat::zero()];

    let mut dim = 0usize;
    let mut wrote_coeff = false;
    let mut pending = Pending::None;
    let mut awaiting_denominator: Option<i64> = None;
    let mut sign: i64 = 1;

    let flush_offset =
        |pending: &mut Pending, sign: &mut i64, t: &mut RVec3, dim: usize| -> Result<(), NetError> {
            let value = match *pending {
                Pending::None => return Ok(()),
                Pending::Int(n) => Rat::from_ratio_i64(*sign * n, 1),
                Pending::Ratio(n, d) => Rat::from_ratio_i64(*sign * n, d),
            };
            if !t[dim].is_zero() {
                warn!("symmetry operator '{s}': offset for dimension {dim} set more than once");
            }
            t[dim] = t[dim].add(&value);
            *pending = Pending::None;
            *sign = 1;
            Ok(())
        };

    for tok in &toks {
        match *tok {
            Tok::Int(n) => {
                if let Some(num) = awaiting_denominator.take() {
                    pending = Pending::Ratio(num, n);
                } else {
                    if !matches!(pending, Pending::None) {
                        return Err(NetError::SymmetryParseError(format!(
                            "unexpected integer in '{s}'"
                        )));
                    }
                    pending = Pending::Int(n);
                }
            }
            Tok::Slash => match pending {
                Pending::Int(n) => {
                    awaiting_denominator = Some(n);
                    pending = Pending::None;
                }
                _ => {
                    return Err(NetError::SymmetryParseError(format!(
                        "'/' without a preceding integer in '{s}'"
                    )))
                }
            },
            Tok::Ident(k) => {
                if awaiting_denominator.is_some() {
                    return Err(NetError::SymmetryParseError(format!(
                        "'/' missing its denominator in '{s}'"
                    )));
                }
                if dim >= 3 {
                    return Err(NetError::SymmetryParseError(format!(
                        "more than three dimensions declared in '{s}'"
                    )));
                }
                let coeff = match pending {
                    Pending::None => Rat::from_ratio_i64(sign, 1),
                    Pending::Int(n) => Rat::from_ratio_i64(sign * n, 1),
                    Pending::Ratio(n, d) => Rat::from_ratio_i64(sign * n, d),
                };
                m[dim][k] = m[dim][k].add(&coeff);
                wrote_coeff = true;
                pending = Pending::None;
                sign = 1;
            }
            Tok::Plus => {
                flush_offset(&mut pending, &mut sign, &mut t, dim)?;
                sign = 1;
            }
            Tok::Minus => {
                flush_offset(&mut pending, &mut sign, &mut t, dim)?;
                sign = -1;
            }
            Tok::Comma | Tok::Semicolon => {
                if awaiting_denominator.is_some() {
                    return Err(NetError::SymmetryParseError(format!(
                        "'/' missing its denominator in '{s}'"
                    )));
                }
                flush_offset(&mut pending, &mut sign, &mut t, dim)?;
                if !wrote_coeff {
                    return Err(NetError::SymmetryParseError(format!(
                        "dimension {dim} has no coefficient in '{s}'"
                    )));
                }
                dim += 1;
                if dim > 3 {
                    return Err(NetError::SymmetryParseError(format!(
                        "more than three dimensions declared in '{s}'"
                    )));
                }
                wrote_coeff = false;
                sign = 1;
            }
        }
    }

    if awaiting_denominator.is_some() {
        return Err(NetError::SymmetryParseError(format!(
            "'/' missing its denominator in '{s}'"
        )));
    }
    flush_offset(&mut pending, &mut sign, &mut t, dim)?;
    if !wrote_coeff {
        return Err(NetError::SymmetryParseError(format!(
            "dimension {dim} has no coefficient in '{s}'"
        )));
    }
    dim += 1;
    if dim != 3 {
        return Err(NetError::SymmetryParseError(format!(
            "expected exactly three dimensions, got {dim} in '{s}'"
        )));
    }

    Ok(EquivalentPosition { m, t })
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_parse_scenario_1() {
        let ids = default_ids();
        let op = parse_symmetry_operator("-x+1/2, y, z+1/4", &ids).unwrap();
        assert_eq!(op.m[0][0], Rat::from_i64(-1));
        assert_eq!(op.m[1][1], Rat::one());
        assert_eq!(op.m[2][2], Rat::one());
        assert_eq!(op.t[0], Rat::from_ratio_i64(1, 2));
        assert_eq!(op.t[1], Rat::zero());
        assert_eq!(op.t[2], Rat::from_ratio_i64(1, 4));
        assert_eq!(op.render(&ids), "-x+1/2,y,z+1/4");
    }

    #[test]
    fn test_parse_scenario_2() {
        let ids = default_ids();
        let op = parse_symmetry_operator("x-y, x, z", &ids).unwrap();
        assert_eq!(op.m[0][0], Rat::one());
        assert_eq!(op.m[0][1], Rat::from_i64(-1));
        assert_eq!(op.m[1][0], Rat::one());
        assert_eq!(op.m[2][2], Rat::one());
        for i in 0..3 {
            assert!(op.t[i].is_zero());
        }
    }

    #[test]
    fn test_render_roundtrip_is_idempotent() {
        let ids = default_ids();
        let cases = [
            "-x+1/2, y, z+1/4",
            "x-y, x, z",
            "x,y,z",
            "-x,-y,-z",
            "y,x,-z+1/2",
        ];
        for case in cases {
            let op = parse_symmetry_operator(case, &ids).unwrap();
            let rendered = op.render(&ids);
            let reparsed = parse_symmetry_operator(&rendered, &ids).unwrap();
            for i in 0..3 {
                for j in 0..3 {
                    assert_eq!(op.m[i][j], reparsed.m[i][j], "case {case}");
                }
                assert_eq!(op.t[i], reparsed.t[i], "case {case}");
            }
        }
    }

    #[test]
    fn test_missing_dimension_is_error() {
        let ids = default_ids();
        assert!(parse_symmetry_operator("x,y", &ids).is_err());
    }

    #[test]
    fn test_too_many_dimensions_is_error() {
        let ids = default_ids();
        assert!(parse_symmetry_operator("x,y,z,x", &ids).is_err());
    }

    #[test]
    fn test_discover_reference_identifiers_default() {
        let all = vec!["-x+1/2,y,z+1/4".to_string(), "x,y,z".to_string()];
        assert_eq!(discover_reference_identifiers(&all), default_ids());
    }

    #[test]
    fn test_discover_reference_identifiers_custom() {
        let all = vec!["a,b,c".to_string(), "-a+1/2,b,c+1/4".to_string()];
        assert_eq!(
            discover_reference_identifiers(&all),
            ["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    /// Rule 4: a dimension's offset already written to is logged, not
    /// rejected, when a second bare rational shows up for it.
    #[test]
    fn test_doubled_offset_warns_but_still_parses() {
        let ids = default_ids();
        let op = parse_symmetry_operator("x+1/2+1/4, y, z", &ids).unwrap();
        assert_eq!(op.t[0], Rat::from_ratio_i64(3, 4));
    }
}
