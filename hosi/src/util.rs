// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use core::str::FromStr;

use crate::error::ProtocolError;

/// Parse one comma-separated field, naming it in the error if it's missing or malformed.
pub(crate) fn parse_field<T: FromStr>(
    line: &str,
    fields: &[&str],
    index: usize,
    name: &str,
) -> Result<T, ProtocolError> {
    let field = fields
        .get(index)
        .ok_or_else(|| ProtocolError::decode(line, format!("missing {} (field {})", name, index)))?;
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::decode(line, format!("invalid {} {:?}", name, field)))
}

/// Parse every field from `start` on as a count.
pub(crate) fn parse_counts(line: &str, fields: &[&str], start: usize) -> Result<Vec<f64>, ProtocolError> {
    fields
        .iter()
        .skip(start)
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| ProtocolError::decode(line, format!("invalid count {:?}", field)))
        })
        .collect()
}

/// The index of the first largest value.
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, value)| match best {
            Some((_, max)) if *value <= max => best,
            _ => Some((index, *value)),
        })
        .map(|(index, _)| index)
}
