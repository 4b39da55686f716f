//! Extraction strategies for the theoretical portfolio page.

use serde::Deserialize;
use serde_json::Value;
use time::Date;

use super::html::{block_with_class, element_blocks, strip_tags};
use super::RowParseError;
use crate::{ConstituentRow, UtcDateTime, ValidationError};

/// Summary rows the page appends below the constituents.
const TOTAL_SENTINELS: [&str; 2] = ["Quantidade Teórica Total", "Redutor"];

/// Minimum number of `<td>` cells for a constituent row.
const MIN_CELLS: usize = 5;

/// Rows and skips produced by one strategy.
#[derive(Debug, Default)]
pub(super) struct Extraction {
    pub rows: Vec<ConstituentRow>,
    pub skipped: Vec<RowParseError>,
}

impl Extraction {
    fn push(&mut self, row_index: usize, result: Result<ConstituentRow, RowParseError>) {
        match result {
            Ok(row) if self.rows.iter().any(|existing| existing.code == row.code) => {
                self.skipped.push(RowParseError {
                    row: row_index,
                    code: Some(row.code),
                    reason: String::from("duplicate ticker code"),
                });
            }
            Ok(row) => self.rows.push(row),
            Err(err) => self.skipped.push(err),
        }
    }
}

/// Table strategy: the first `<table>`, else a `<div class="table">` block.
///
/// Returns `None` when the page has no table container at all.
pub(super) fn from_table(
    html: &str,
    trade_date: Date,
    collected_at: UtcDateTime,
) -> Option<Extraction> {
    let container = match element_blocks(html, "table").into_iter().next() {
        Some(table) => table.inner,
        None => {
            // A div container has no reliable end; scan to the end of the page.
            let div = block_with_class(html, "div", "table")?;
            &html[div.start..]
        }
    };

    let mut extraction = Extraction::default();
    // The first row is the header.
    for (index, row) in element_blocks(container, "tr").into_iter().enumerate().skip(1) {
        let cells: Vec<String> = element_blocks(row.inner, "td")
            .into_iter()
            .map(|cell| strip_tags(cell.inner))
            .collect();
        if cells.len() < MIN_CELLS {
            continue;
        }
        if is_total_sentinel(&cells[0]) {
            continue;
        }

        let result = build_row(
            index,
            &cells[0],
            &cells[1],
            &cells[2],
            &cells[3],
            &cells[4],
            trade_date,
            collected_at,
        );
        extraction.push(index, result);
    }
    Some(extraction)
}

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    #[serde(default)]
    cod: Option<String>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default, rename = "theoricalQty")]
    theoretical_qty: Option<Value>,
    #[serde(default)]
    part: Option<Value>,
}

/// Script strategy: a `"results"` array embedded in a `<script>` body.
pub(super) fn from_scripts(
    html: &str,
    trade_date: Date,
    collected_at: UtcDateTime,
) -> Option<Extraction> {
    element_blocks(html, "script")
        .into_iter()
        .filter_map(|script| results_array(script.inner))
        .filter_map(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
        .find(|entries| !entries.is_empty())
        .map(|entries| {
            let mut extraction = Extraction::default();
            for (index, entry) in entries.into_iter().enumerate() {
                let entry = match serde_json::from_value::<ScriptEntry>(entry) {
                    Ok(entry) => entry,
                    Err(err) => {
                        extraction.push(
                            index,
                            Err(RowParseError {
                                row: index,
                                code: None,
                                reason: err.to_string(),
                            }),
                        );
                        continue;
                    }
                };
                let code = entry.cod.as_deref().unwrap_or_default();
                if is_total_sentinel(code) {
                    continue;
                }

                let result = build_row(
                    index,
                    code,
                    entry.asset.as_deref().unwrap_or_default(),
                    entry.kind.as_deref().unwrap_or_default(),
                    &value_text(entry.theoretical_qty.as_ref()),
                    &value_text(entry.part.as_ref()),
                    trade_date,
                    collected_at,
                );
                extraction.push(index, result);
            }
            extraction
        })
}

/// Placeholder rows used when the page yields no structured data.
pub(super) fn fallback_rows(trade_date: Date, collected_at: UtcDateTime) -> Vec<ConstituentRow> {
    [
        ("PETR4", "PETROBRAS", "PN N2", 1_000_000.0, 5.5),
        ("VALE3", "VALE", "ON N1", 800_000.0, 4.2),
        ("ITUB4", "ITAUUNIBANCO", "PN N1", 1_200_000.0, 6.1),
    ]
    .into_iter()
    .filter_map(|(code, name, class, quantity, weight)| {
        ConstituentRow::new(code, name, class, quantity, weight, trade_date, collected_at).ok()
    })
    .collect()
}

/// Parses a pt-BR formatted number: `.` groups thousands, `,` is the decimal mark.
///
/// An empty cell reads as zero.
pub fn parse_locale_number(text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }

    let normalized = trimmed.replace('.', "").replace(',', ".");
    normalized
        .parse::<f64>()
        .map_err(|_| ValidationError::InvalidNumber {
            value: trimmed.to_owned(),
        })
}

fn is_total_sentinel(code: &str) -> bool {
    let code = code.trim();
    TOTAL_SENTINELS
        .iter()
        .any(|sentinel| sentinel.to_lowercase() == code.to_lowercase())
}

#[allow(clippy::too_many_arguments)]
fn build_row(
    index: usize,
    code: &str,
    name: &str,
    class: &str,
    quantity: &str,
    weight: &str,
    trade_date: Date,
    collected_at: UtcDateTime,
) -> Result<ConstituentRow, RowParseError> {
    let code_label = Some(code.trim().to_owned()).filter(|value| !value.is_empty());
    let fail = |err: ValidationError| RowParseError {
        row: index,
        code: code_label.clone(),
        reason: err.to_string(),
    };

    let quantity = parse_locale_number(quantity).map_err(fail)?;
    let weight = parse_locale_number(weight).map_err(fail)?;
    ConstituentRow::new(code, name, class, quantity, weight, trade_date, collected_at).map_err(fail)
}

/// JSON numbers are rendered with `.` decimals and must not go through the
/// locale parser's thousands stripping.
fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(number)) => number.to_string().replace('.', ","),
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

/// Raw JSON text of the array following the first `"results"` key.
fn results_array(script: &str) -> Option<&str> {
    let key = script.find("\"results\"")?;
    let after_key = &script[key + "\"results\"".len()..];
    let colon = after_key.find(':')?;
    if !after_key[..colon].trim().is_empty() {
        return None;
    }
    let rest = &after_key[colon + 1..];
    let open = rest.find('[')?;
    if !rest[..open].trim().is_empty() {
        return None;
    }

    let body = &rest[open..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (pos, ch) in body.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[..=pos]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn collected() -> UtcDateTime {
        UtcDateTime::parse("2026-10-16T18:30:00Z").expect("valid")
    }

    #[test]
    fn parses_locale_numbers() {
        assert_eq!(parse_locale_number("1.234.567,89").expect("number"), 1_234_567.89);
        assert_eq!(parse_locale_number("8,123").expect("number"), 8.123);
        assert_eq!(parse_locale_number("  ").expect("number"), 0.0);
        assert_eq!(parse_locale_number("12,5%").expect("number"), 12.5);
        assert!(parse_locale_number("n/d").is_err());
    }

    #[test]
    fn recognizes_total_sentinels() {
        assert!(is_total_sentinel("Quantidade Teórica Total"));
        assert!(is_total_sentinel("quantidade teórica total"));
        assert!(is_total_sentinel(" REDUTOR "));
        assert!(!is_total_sentinel("PETR4"));
    }

    #[test]
    fn extracts_results_array_with_brackets_in_strings() {
        let script = r#"var page = {"header": {}, "results": [{"cod": "A]B"}, {"cod": "C"}], "page": 1};"#;
        let raw = results_array(script).expect("array");
        assert_eq!(raw, r#"[{"cod": "A]B"}, {"cod": "C"}]"#);
    }

    #[test]
    fn script_entries_accept_numbers_and_strings() {
        let html = r#"<script>window.data = {"results":[
            {"cod":"PETR4","asset":"PETROBRAS","type":"PN N2","theoricalQty":"4.566.457.037","part":"7,012"},
            {"cod":"VALE3","asset":"VALE","type":"ON NM","theoricalQty":4196924316,"part":11.5}
        ]};</script>"#;

        let extraction =
            from_scripts(html, date!(2026 - 10 - 16), collected()).expect("script data");
        assert!(extraction.skipped.is_empty());
        assert_eq!(extraction.rows.len(), 2);
        assert_eq!(extraction.rows[0].theoretical_quantity, 4_566_457_037.0);
        assert_eq!(extraction.rows[0].weight_percent, 7.012);
        assert_eq!(extraction.rows[1].theoretical_quantity, 4_196_924_316.0);
        assert_eq!(extraction.rows[1].weight_percent, 11.5);
    }

    #[test]
    fn table_rows_skip_header_and_short_rows() {
        let html = "<table>\
            <tr><td>Código</td><td>Ação</td><td>Tipo</td><td>Qtde</td><td>Part</td></tr>\
            <tr><td>ABEV3</td><td>AMBEV S/A</td><td>ON</td><td>4.394.835.131</td><td>2,710</td></tr>\
            <tr><td colspan=3>nota</td></tr>\
            <tr><td>Redutor</td><td></td><td></td><td>1.000</td><td></td></tr>\
            </table>";

        let extraction =
            from_table(html, date!(2026 - 10 - 16), collected()).expect("table present");
        assert_eq!(extraction.rows.len(), 1);
        assert_eq!(extraction.rows[0].code, "ABEV3");
        assert_eq!(extraction.rows[0].class, "ON");
        assert!(extraction.skipped.is_empty());
    }

    #[test]
    fn no_table_container_yields_none() {
        assert!(from_table("<p>nothing</p>", date!(2026 - 10 - 16), collected()).is_none());
    }

    #[test]
    fn fallback_has_three_placeholders() {
        let rows = fallback_rows(date!(2026 - 10 - 16), collected());
        let codes: Vec<&str> = rows.iter().map(|row| row.code.as_str()).collect();
        assert_eq!(codes, ["PETR4", "VALE3", "ITUB4"]);
    }
}
