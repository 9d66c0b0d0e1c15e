//! Amount Extraction Layer
//!
//! Pulls monetary amounts out of recognized receipt text. Candidates come
//! from an ordered set of currency patterns, get normalized into decimal
//! values, de-duplicated, and ranked by value; the largest amount is the
//! suggested total. The result carries a confidence derived from the
//! recognizer's score plus text-quality signals.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Receipt vocabulary used for the confidence bonus. Spanish-language
/// receipts are the product's primary market.
const KEYWORDS: &[&str] = &[
    "total",
    "subtotal",
    "importe",
    "suma",
    "precio",
    "costo",
    "pago",
    "cantidad",
    "monto",
    "tarifa",
    "neto",
    "bruto",
    "iva",
    "descuento",
    "cambio",
    "efectivo",
];

/// Which pattern produced a candidate, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternId {
    /// `$ 1,234.56`
    SymbolPrefixed,
    /// `150 pesos`, `99.90 MXN`
    CurrencyWord,
    /// `total: 126.21`, `importe $88`
    KeywordPrefixed,
    /// Bare decimal like `45.00`
    BareDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Cap on ranked candidates kept in the analysis.
    pub max_candidates: usize,
    /// Texts shorter than this are penalized as likely-partial reads.
    pub min_meaningful_len: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            min_meaningful_len: 50,
        }
    }
}

/// One extracted amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountCandidate {
    pub value: f64,
    /// The text span the pattern matched, kept for display.
    pub matched_text: String,
    pub pattern: PatternId,
}

/// Ranked extraction result for one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountAnalysis {
    /// Largest extracted amount; receipts put the grand total above the
    /// line items in value if not in position.
    pub suggested: Option<f64>,
    /// All distinct amounts, descending by value.
    pub candidates: Vec<AmountCandidate>,
    pub confidence: f32,
    pub keyword_hits: usize,
}

impl AmountAnalysis {
    fn empty(confidence: f32) -> Self {
        Self {
            suggested: None,
            candidates: Vec::new(),
            confidence,
            keyword_hits: 0,
        }
    }
}

/// Pattern-based amount extractor.
pub struct AmountExtractor {
    config: ExtractorConfig,
    patterns: Vec<(PatternId, Regex)>,
}

impl AmountExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        // Literal patterns, compile failure is a programming error.
        let patterns = vec![
            (
                PatternId::SymbolPrefixed,
                Regex::new(r"\$\s*(\d{1,3}(?:[,\s]\d{3})*(?:[.,]\d{2})?)").unwrap(),
            ),
            (
                PatternId::CurrencyWord,
                Regex::new(r"(?i)(\d{1,3}(?:[,\s]\d{3})*(?:[.,]\d{2})?)\s*(?:pesos?|mxn)").unwrap(),
            ),
            (
                PatternId::KeywordPrefixed,
                Regex::new(
                    r"(?i)(?:total|importe|suma|subtotal|precio|costo|pago|cantidad|monto|tarifa)[:\s]*\$?\s*(\d{1,3}(?:[,\s]\d{3})*(?:[.,]\d{2})?)",
                )
                .unwrap(),
            ),
            (
                PatternId::BareDecimal,
                Regex::new(r"(\d{2,6}[.,]\d{2})").unwrap(),
            ),
        ];
        Self { config, patterns }
    }

    /// Analyze recognized text. `base_confidence` is the recognizer's
    /// normalized score in [0, 1].
    pub fn analyze(&self, text: &str, base_confidence: f32) -> AmountAnalysis {
        if text.trim().is_empty() {
            return AmountAnalysis::empty(self.score(base_confidence, false, 0, 0));
        }

        let mut seen_cents: HashSet<i64> = HashSet::new();
        let mut candidates: Vec<AmountCandidate> = Vec::new();

        for (id, pattern) in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let raw = caps.get(1).map_or(whole.as_str(), |g| g.as_str());
                let Some(value) = parse_amount(raw) else {
                    continue;
                };
                // De-duplicate at cent precision; the earliest pattern wins.
                let cents = (value * 100.0).round() as i64;
                if !seen_cents.insert(cents) {
                    continue;
                }
                candidates.push(AmountCandidate {
                    value,
                    matched_text: whole.as_str().to_string(),
                    pattern: *id,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.max_candidates);

        let keyword_hits = count_keyword_hits(text);
        let confidence = self.score(
            base_confidence,
            !candidates.is_empty(),
            keyword_hits,
            text.chars().count(),
        );
        let suggested = candidates.first().map(|c| c.value);

        debug!(
            "Extracted {} amount(s), {} keyword hit(s), confidence {:.2}",
            candidates.len(),
            keyword_hits,
            confidence
        );

        AmountAnalysis {
            suggested,
            candidates,
            confidence,
            keyword_hits,
        }
    }

    /// Recognizer score adjusted by extraction signals, clamped to
    /// [0.1, 1.0].
    fn score(&self, base: f32, found_amounts: bool, keyword_hits: usize, text_len: usize) -> f32 {
        let mut confidence = base;
        if found_amounts {
            confidence += 0.1;
        }
        confidence += (keyword_hits as f32 * 0.05).min(0.25);
        if text_len < self.config.min_meaningful_len {
            confidence -= 0.2;
        }
        confidence.clamp(0.1, 1.0)
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

fn count_keyword_hits(text: &str) -> usize {
    let lowered = text.to_lowercase();
    KEYWORDS.iter().filter(|k| lowered.contains(**k)).count()
}

/// Normalize a matched numeric string into a decimal value.
///
/// The final `.` or `,` is a decimal point when exactly two digits follow
/// it; every other separator is a thousands separator and is dropped.
/// `1,234.56` -> 1234.56, `126,21` -> 126.21, `1,234` -> 1234.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match cleaned.rfind(['.', ',']) {
        Some(idx) if cleaned.len() - idx == 3 => {
            let integral: String = cleaned[..idx]
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            format!("{integral}.{}", &cleaned[idx + 1..])
        }
        _ => cleaned.chars().filter(char::is_ascii_digit).collect(),
    };

    match normalized.parse::<f64>() {
        Ok(value) if value > 0.0 => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> AmountExtractor {
        AmountExtractor::default()
    }

    #[test]
    fn test_receipt_totals_ranked_by_value() {
        // 50 characters exactly, so no short-text penalty.
        let text = "Subtotal: $108.80\nIVA (16%): $17.41\nTOTAL: $126.21";
        let analysis = extractor().analyze(text, 0.9);

        assert_eq!(analysis.suggested, Some(126.21));
        let values: Vec<f64> = analysis.candidates.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![126.21, 108.80, 17.41]);
        // base 0.9 + found 0.1 + three keywords 0.15, clamped to 1.0.
        assert!(analysis.confidence > 0.9);
        assert!(analysis.confidence <= 1.0);
        assert_eq!(analysis.keyword_hits, 3);
    }

    #[test]
    fn test_empty_text() {
        let analysis = extractor().analyze("", 0.0);
        assert_eq!(analysis.suggested, None);
        assert!(analysis.candidates.is_empty());
        // Clamped to the confidence floor.
        assert!((analysis.confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_no_amounts_in_prose() {
        let analysis = extractor().analyze(
            "gracias por su compra, vuelva pronto, conserve este comprobante",
            0.8,
        );
        assert_eq!(analysis.suggested, None);
        assert!(analysis.candidates.is_empty());
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let analysis = extractor().analyze("total: $50.00 ... a pagar 50.00", 0.9);
        assert_eq!(analysis.candidates.len(), 1);
        assert_eq!(analysis.suggested, Some(50.0));
    }

    #[test]
    fn test_decimal_comma() {
        let analysis = extractor().analyze("TOTAL: 126,21", 0.9);
        assert_eq!(analysis.suggested, Some(126.21));
    }

    #[test]
    fn test_thousands_separators() {
        let analysis = extractor().analyze("importe total $1,234.56 en caja", 0.9);
        assert_eq!(analysis.suggested, Some(1234.56));
    }

    #[test]
    fn test_thousands_without_decimals() {
        let analysis = extractor().analyze("monto: $1,234", 0.9);
        assert_eq!(analysis.suggested, Some(1234.0));
    }

    #[test]
    fn test_currency_word_pattern() {
        let analysis = extractor().analyze("pague 150.00 pesos en efectivo", 0.9);
        assert_eq!(analysis.suggested, Some(150.0));
        let c = &analysis.candidates[0];
        assert_eq!(c.pattern, PatternId::CurrencyWord);
    }

    #[test]
    fn test_pattern_priority_on_shared_value() {
        // Both the symbol pattern and the bare-decimal pattern match; the
        // symbol pattern runs first and claims the value.
        let analysis = extractor().analyze("$99.90", 0.9);
        assert_eq!(analysis.candidates.len(), 1);
        assert_eq!(analysis.candidates[0].pattern, PatternId::SymbolPrefixed);
    }

    #[test]
    fn test_short_text_penalty() {
        let analysis = extractor().analyze("$5.00", 0.9);
        assert_eq!(analysis.suggested, Some(5.0));
        // base 0.9 + found 0.1 - short 0.2 = 0.8
        assert!((analysis.confidence - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_keyword_bonus_is_capped() {
        let text = "total subtotal importe suma precio costo pago sin montos aqui nada numerico";
        let analysis = extractor().analyze(text, 0.5);
        assert!(analysis.keyword_hits >= 6);
        // base 0.5 + capped keyword bonus 0.25, no amounts found.
        assert!((analysis.confidence - 0.75).abs() < 1e-5);
    }

    #[test]
    fn test_candidate_cap() {
        let text =
            "items: 11.11 22.22 33.33 44.44 55.55 66.66 77.77 y el total general $88.88 pagado";
        let analysis = extractor().analyze(text, 0.9);
        assert_eq!(analysis.candidates.len(), 5);
        assert_eq!(analysis.suggested, Some(88.88));
        // Descending order throughout.
        for pair in analysis.candidates.windows(2) {
            assert!(pair[0].value >= pair[1].value);
        }
    }

    #[test]
    fn test_confidence_never_leaves_bounds() {
        for base in [0.0, 0.3, 0.9, 1.0] {
            for text in ["", "$5.00", "total total total $999,999.99 pesos y mas texto largo"] {
                let c = extractor().analyze(text, base).confidence;
                assert!((0.1..=1.0).contains(&c), "confidence {c} out of bounds");
            }
        }
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("..,,"), None);
        assert_eq!(parse_amount("0.00"), None);
    }
}
