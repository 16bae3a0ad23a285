use anyhow::{ensure, Result};

fn normalize(text: &str, ignore_case: bool, ignore_punctuation: bool) -> String {
    let text = if ignore_case { text.to_lowercase() } else { text.to_string() };
    if ignore_punctuation {
        text.chars().filter(|c| !c.is_ascii_punctuation()).collect()
    } else {
        text
    }
}

/// Fraction of predictions equal to their reference, in `[0, 1]`.
pub fn compute_exact_match(
    predictions: &[String],
    references: &[String],
    ignore_case: bool,
    ignore_punctuation: bool,
) -> Result<f64> {
    ensure!(
        predictions.len() == references.len(),
        "Got {} predictions but {} references",
        predictions.len(),
        references.len()
    );
    if predictions.is_empty() {
        return Ok(0.0);
    }

    let matches = predictions
        .iter()
        .zip(references.iter())
        .filter(|(p, r)| {
            normalize(p, ignore_case, ignore_punctuation) == normalize(r, ignore_case, ignore_punctuation)
        })
        .count();

    Ok(matches as f64 / predictions.len() as f64)
}
