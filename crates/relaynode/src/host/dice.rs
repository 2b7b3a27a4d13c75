//! Dice formula parsing and evaluation.
//!
//! Supports sums and differences of `NdM` terms and integer constants,
//! e.g. `2d6+3`, `d20 - 1`, `4d6+1d8`.

use std::fmt;

use rand::Rng;
use relay_proto::{DieResult, DieTerm};
use serde::{Deserialize, Serialize};

use super::HostError;

/// Most dice a single term may roll.
pub const MAX_DICE: u32 = 100;

/// Most faces a die may have.
pub const MAX_FACES: u32 = 1000;

/// Largest constant term. Keeps every total well inside `i64`.
pub const MAX_CONSTANT: i64 = 1_000_000;

/// An evaluated roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollOutcome {
    /// Formula as entered.
    pub formula: String,
    /// Evaluated total.
    pub total: i64,
    /// A die showed the first dice term's maximum face.
    pub is_critical: bool,
    /// A die showed a 1.
    pub is_fumble: bool,
    /// Per-term results.
    pub dice: Vec<DieTerm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    Dice { count: u32, faces: u32 },
    Constant(i64),
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    source: String,
    terms: Vec<(i64, Term)>,
}

impl Formula {
    /// Parse a formula.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidFormula`] for empty input, unknown
    /// tokens, constants above [`MAX_CONSTANT`], or dice counts and faces
    /// out of range.
    pub fn parse(formula: &str) -> Result<Self, HostError> {
        let compact: String = formula.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(invalid(formula, "empty formula"));
        }

        let mut terms = Vec::new();
        let mut sign = 1i64;
        let mut current = String::new();
        for (i, c) in compact.char_indices() {
            if c == '+' || c == '-' {
                if current.is_empty() {
                    if i == 0 {
                        sign = if c == '-' { -1 } else { 1 };
                        continue;
                    }
                    return Err(invalid(formula, "operator without operand"));
                }
                terms.push((sign, parse_term(formula, &current)?));
                current.clear();
                sign = if c == '-' { -1 } else { 1 };
            } else {
                current.push(c);
            }
        }
        if current.is_empty() {
            return Err(invalid(formula, "trailing operator"));
        }
        terms.push((sign, parse_term(formula, &current)?));

        Ok(Self {
            source: formula.trim().to_string(),
            terms,
        })
    }

    /// Evaluate with random dice.
    pub fn evaluate<R: Rng + ?Sized>(&self, rng: &mut R) -> RollOutcome {
        self.evaluate_with(|faces| rng.gen_range(1..=faces))
    }

    /// Evaluate with dice values supplied by `roll_die(faces)`.
    pub fn evaluate_with(&self, mut roll_die: impl FnMut(u32) -> u32) -> RollOutcome {
        let mut total = 0i64;
        let mut dice = Vec::new();

        for &(sign, term) in &self.terms {
            match term {
                Term::Constant(value) => total += sign * value,
                Term::Dice { count, faces } => {
                    let results: Vec<DieResult> = (0..count)
                        .map(|_| DieResult {
                            result: roll_die(faces).clamp(1, faces),
                            active: true,
                        })
                        .collect();
                    let sum: i64 = results.iter().map(|r| i64::from(r.result)).sum();
                    total += sign * sum;
                    dice.push(DieTerm { faces, results });
                }
            }
        }

        let first_faces = match self.terms.first() {
            Some((_, Term::Dice { faces, .. })) => Some(*faces),
            _ => None,
        };
        let any_result = |pred: &dyn Fn(u32) -> bool| {
            dice.iter()
                .flat_map(|term| term.results.iter())
                .any(|r| pred(r.result))
        };
        let is_critical = first_faces.is_some_and(|faces| any_result(&|r| r == faces));
        let is_fumble = any_result(&|r| r == 1);

        RollOutcome {
            formula: self.source.clone(),
            total,
            is_critical,
            is_fumble,
            dice,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_term(formula: &str, token: &str) -> Result<Term, HostError> {
    let lower = token.to_ascii_lowercase();
    let Some((count, faces)) = lower.split_once('d') else {
        if !lower.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(formula, &format!("unknown term '{token}'")));
        }
        return match lower.parse::<i64>() {
            Ok(value) if value <= MAX_CONSTANT => Ok(Term::Constant(value)),
            _ => Err(invalid(
                formula,
                &format!("constant '{token}' exceeds {MAX_CONSTANT}"),
            )),
        };
    };

    let count = if count.is_empty() {
        1
    } else {
        count
            .parse::<u32>()
            .map_err(|_| invalid(formula, &format!("bad dice count in '{token}'")))?
    };
    let faces = faces
        .parse::<u32>()
        .map_err(|_| invalid(formula, &format!("bad die faces in '{token}'")))?;

    if count == 0 || count > MAX_DICE {
        return Err(invalid(formula, &format!("dice count must be 1..={MAX_DICE}")));
    }
    if faces == 0 || faces > MAX_FACES {
        return Err(invalid(formula, &format!("die faces must be 1..={MAX_FACES}")));
    }
    Ok(Term::Dice { count, faces })
}

fn invalid(formula: &str, reason: &str) -> HostError {
    HostError::InvalidFormula(format!("{formula}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed(values: &[u32]) -> impl FnMut(u32) -> u32 + '_ {
        let mut iter = values.iter().copied();
        move |_| iter.next().unwrap_or(1)
    }

    #[test]
    fn test_parse_terms() {
        let formula = Formula::parse("2d6 + 3").unwrap();
        assert_eq!(
            formula.terms,
            vec![(1, Term::Dice { count: 2, faces: 6 }), (1, Term::Constant(3))]
        );
        assert_eq!(formula.to_string(), "2d6 + 3");
    }

    #[test]
    fn test_implicit_single_die() {
        let formula = Formula::parse("D20-1").unwrap();
        assert_eq!(
            formula.terms,
            vec![(1, Term::Dice { count: 1, faces: 20 }), (-1, Term::Constant(1))]
        );
    }

    #[test]
    fn test_leading_sign() {
        let formula = Formula::parse("-2+1d4").unwrap();
        assert_eq!(formula.terms[0], (-1, Term::Constant(2)));
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "   ", "2x6", "1d", "d", "1d0", "101d6", "1d1001", "1d6+", "1d6++2"] {
            assert!(Formula::parse(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn test_rejects_oversized_constants() {
        for bad in ["9223372036854775807+1", "1d20+99999999999999999999", "1000001"] {
            let err = Formula::parse(bad).unwrap_err();
            assert!(matches!(err, HostError::InvalidFormula(ref m) if m.contains("exceeds")), "{bad:?}");
        }
        let outcome = Formula::parse("1000000-1000000").unwrap().evaluate_with(fixed(&[]));
        assert_eq!(outcome.total, 0);
    }

    #[test]
    fn test_total_and_dice() {
        let outcome = Formula::parse("2d6+3").unwrap().evaluate_with(fixed(&[4, 5]));
        assert_eq!(outcome.total, 12);
        assert_eq!(outcome.dice.len(), 1);
        assert_eq!(outcome.dice[0].faces, 6);
        assert_eq!(
            outcome.dice[0].results.iter().map(|r| r.result).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert!(!outcome.is_critical);
        assert!(!outcome.is_fumble);
    }

    #[test]
    fn test_subtracted_dice() {
        let outcome = Formula::parse("1d20-1d4").unwrap().evaluate_with(fixed(&[10, 3]));
        assert_eq!(outcome.total, 7);
    }

    #[test]
    fn test_critical_uses_first_term_faces() {
        let outcome = Formula::parse("1d20").unwrap().evaluate_with(fixed(&[20]));
        assert!(outcome.is_critical);

        // A 6 on the second term is a critical only against a d6 first term.
        let outcome = Formula::parse("1d20+1d6").unwrap().evaluate_with(fixed(&[5, 6]));
        assert!(!outcome.is_critical);
    }

    #[test]
    fn test_fumble_on_any_one() {
        let outcome = Formula::parse("1d20+1d6").unwrap().evaluate_with(fixed(&[12, 1]));
        assert!(outcome.is_fumble);
    }

    #[test]
    fn test_constant_only() {
        let outcome = Formula::parse("7").unwrap().evaluate_with(fixed(&[]));
        assert_eq!(outcome.total, 7);
        assert!(outcome.dice.is_empty());
        assert!(!outcome.is_critical);
    }

    #[test]
    fn test_random_results_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let formula = Formula::parse("10d8").unwrap();
        for _ in 0..20 {
            let outcome = formula.evaluate(&mut rng);
            assert!(outcome.dice[0].results.iter().all(|r| (1..=8).contains(&r.result)));
            assert!((10..=80).contains(&outcome.total));
        }
    }
}
