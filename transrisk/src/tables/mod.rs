//! LaTeX table fragments. Each fragment holds rows only (cells separated by `&`, rows terminated
//! by `\\`) and is `\input` by the paper.

use std::path::Path;

use log::info;

use crate::error::TransRiskResult;

pub mod coverage;
pub mod crises;
pub mod ngrams;
pub mod transmission;

/// Significance stars for a p-value. A missing p-value gets no stars.
pub fn stars(p_value: Option<f64>) -> &'static str {
    match p_value {
        Some(p) if p <= 0.01 => "***",
        Some(p) if p <= 0.05 => "**",
        Some(p) if p <= 0.1 => "*",
        _ => "",
    }
}

/// Formats `value` with `decimals` decimals and a comma every three integer digits.
pub fn thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };
    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3 + 1);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if value.is_sign_negative() && formatted.chars().any(|c| c != '0' && c != '.') {
        grouped.insert(0, '-');
    }
    match fraction {
        Some(fraction) => format!("{grouped}.{fraction}"),
        None => grouped,
    }
}

/// Thousands-separated count, `0` when missing.
pub fn count_or_zero(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() && v != 0.0 => thousands(v, 0),
        _ => "0".to_string(),
    }
}

/// Writes a table fragment, creating the parent directory if needed.
pub fn write_fragment(path: &Path, contents: &str) -> TransRiskResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    info!("Wrote table {}", path.display());
    Ok(())
}
