//! Variable Expansion
//!
//! Expands `name -> [candidates]` into the cartesian product of concrete
//! assignments, in odometer order: the first variable varies slowest, the
//! last one fastest.
//!
//! ```text
//! a: [1, 2]    b: [x, y]
//!   => {a:1, b:x} {a:1, b:y} {a:2, b:x} {a:2, b:y}
//! ```

use std::collections::BTreeMap;

/// One concrete assignment of every variable
pub type VariableCombination = BTreeMap<String, String>;

/// Expand `variables` into every combination.
///
/// The result has `product(len(candidates))` entries; an empty input (or any
/// empty candidate list) yields an empty list.
pub fn expand_variables<K, V>(variables: &[(K, Vec<V>)]) -> Vec<VariableCombination>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if variables.is_empty() {
        return Vec::new();
    }

    let total: usize = variables.iter().map(|(_, values)| values.len()).product();
    let mut combinations = Vec::with_capacity(total);
    if total == 0 {
        return combinations;
    }

    let mut digits = vec![0usize; variables.len()];
    loop {
        combinations.push(
            variables
                .iter()
                .zip(&digits)
                .map(|((name, values), &digit)| {
                    (name.as_ref().to_string(), values[digit].as_ref().to_string())
                })
                .collect(),
        );

        // advance the rightmost digit, carrying leftwards
        let mut position = digits.len();
        loop {
            if position == 0 {
                return combinations;
            }
            position -= 1;
            digits[position] += 1;
            if digits[position] < variables[position].1.len() {
                break;
            }
            digits[position] = 0;
        }
    }
}
