//! Parsing for the kernel "list format" used by cpuset interface files.
//!
//! Files such as `cpuset.cpus.effective` and `cpuset.mems.effective` contain
//! comma-separated tokens, where each token is a single index or an inclusive
//! `min-max` range:
//!
//! ```text
//! 7
//! 1-6
//! 0,3-4,7,8-10
//! 0-0,0,1-7
//! 3,2,1
//! ```
//!
//! Duplicates and re-orderings are allowed and collapse into the same set.

use std::collections::HashSet;

use thiserror::Error;

/// Conventional ceiling for CPU indices. Raised when the host's own
/// available set genuinely exceeds it.
const MAX_CPU_INDEX: usize = 8192;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A token was neither a valid integer nor a valid `min-max` pair, or
    /// had `max < min`. Carries the original input.
    #[error("invalid format: {value}")]
    InvalidFormat { value: String },

    /// A value or range endpoint exceeded the configured bound. The bound
    /// exists to stop the set becoming excessively large when fed garbled
    /// or adversarial input.
    #[error("value out of range, maximum is {maximum}")]
    OutOfRange { maximum: usize },
}

/// Parses a kernel list-format string into a set of indices.
///
/// An empty input yields an empty set.
///
/// # Errors
///
/// Returns [`ParseError::InvalidFormat`] for malformed tokens.
pub fn parse_uint_list(val: &str) -> Result<HashSet<usize>, ParseError> {
    parse_bounded(val, 0)
}

/// Like [`parse_uint_list`], but values larger than `maximum` cause an
/// [`ParseError::OutOfRange`] error if `maximum` is non-zero.
pub fn parse_uint_list_maximum(
    val: &str,
    maximum: usize,
) -> Result<HashSet<usize>, ParseError> {
    parse_bounded(val, maximum)
}

fn parse_bounded(val: &str, maximum: usize) -> Result<HashSet<usize>, ParseError> {
    if val.is_empty() {
        return Ok(HashSet::new());
    }

    let invalid = || ParseError::InvalidFormat {
        value: val.to_owned(),
    };

    let mut available = HashSet::new();
    for token in val.split(',') {
        match token.split_once('-') {
            None => {
                let value = token.parse::<usize>().map_err(|_| invalid())?;
                check_maximum(value, maximum)?;
                available.insert(value);
            }
            Some((min, max)) => {
                let min = min.parse::<usize>().map_err(|_| invalid())?;
                let max = max.parse::<usize>().map_err(|_| invalid())?;
                if max < min {
                    return Err(invalid());
                }
                check_maximum(max, maximum)?;
                available.extend(min..=max);
            }
        }
    }

    Ok(available)
}

fn check_maximum(value: usize, maximum: usize) -> Result<(), ParseError> {
    if maximum != 0 && value > maximum {
        return Err(ParseError::OutOfRange { maximum });
    }
    Ok(())
}

/// Returns true if every index in `provided` is present in `available`.
///
/// `available` is parsed unbounded; `provided` is parsed with a bound of
/// `max(8192, max(available))`, protecting against absurd inputs while
/// still accepting hosts with more than 8192 CPUs.
///
/// # Errors
///
/// Parse failures of either list propagate; they are never reported as
/// `false`.
pub fn is_subset(provided: &str, available: &str) -> Result<bool, ParseError> {
    let available = parse_uint_list(available)?;

    let maximum = available
        .iter()
        .copied()
        .max()
        .map_or(MAX_CPU_INDEX, |m| m.max(MAX_CPU_INDEX));
    let provided = parse_uint_list_maximum(provided, maximum)?;

    Ok(provided.is_subset(&available))
}
