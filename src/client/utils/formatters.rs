//! Formatting and aggregation helpers that turn raw backend values into
//! display strings (CNPJ, BRL currency, dates) and chart-ready datasets.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::common::models::{OperatorRecord, RegionExpense, MISSING_REGION};

pub const CHART_LABEL: &str = "Despesas por UF (R$)";
pub const FALLBACK_COLOR: &str = "rgba(200, 200, 200, 0.8)";

const CNPJ_DIGITS: usize = 14;

/// Formats the first run of 14 digits as `NN.NNN.NNN/NNNN-NN`.
/// No validation: input without such a run comes back unchanged.
pub fn format_identifier(id: &str) -> String {
    if id.is_empty() {
        return String::new();
    }

    let mut run = 0;
    for (i, b) in id.bytes().enumerate() {
        if !b.is_ascii_digit() {
            run = 0;
            continue;
        }
        run += 1;
        if run == CNPJ_DIGITS {
            let start = i + 1 - CNPJ_DIGITS;
            let d = &id[start..=i];
            return format!(
                "{}{}.{}.{}/{}-{}{}",
                &id[..start],
                &d[0..2],
                &d[2..5],
                &d[5..8],
                &d[8..12],
                &d[12..14],
                &id[i + 1..]
            );
        }
    }

    id.to_string()
}

/// pt-BR BRL currency (`R$ 1.234,56`). Missing or non-finite amounts format as zero.
pub fn format_currency(amount: Option<f64>) -> String {
    let value = amount.filter(|v| v.is_finite()).unwrap_or(0.0);
    let digits = round_to_cents(value.abs());
    let (units, cents) = digits.split_at(digits.len() - 2);
    let sign = if value < 0.0 && digits.bytes().any(|d| d != b'0') { "-" } else { "" };
    format!("{}R$ {},{}", sign, group_thousands(units), cents)
}

/// Digits of a non-negative `value` rounded half-up to cents, without the
/// decimal point. Rounds the shortest decimal form, so `1.005` gives `101`.
fn round_to_cents(value: f64) -> String {
    let repr = value.to_string();
    let (units, fraction) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let mut digits: Vec<u8> = units
        .bytes()
        .chain(fraction.bytes().chain(std::iter::repeat(b'0')).take(2))
        .collect();

    if fraction.as_bytes().get(2).is_some_and(|d| *d >= b'5') {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }
    digits.into_iter().map(char::from).collect()
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Short pt-BR date (`DD/MM/YYYY`). Empty or unparseable input yields "".
pub fn format_date(date: &str) -> String {
    let date = date.trim();
    if date.is_empty() {
        return String::new();
    }

    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(date)
                .ok()
                .map(|dt| dt.with_timezone(&Local).date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|dt| dt.date())
        });

    match parsed {
        Some(d) => d.format("%d/%m/%Y").to_string(),
        None => {
            log::debug!("format_date: unparseable input '{}'", date);
            String::new()
        }
    }
}

/// Fixed colour per UF so a state keeps its colour across charts.
pub fn region_color(code: &str) -> &'static str {
    match code {
        "AC" => "rgba(255, 107, 107, 0.8)",
        "AL" => "rgba(255, 159, 64, 0.8)",
        "AP" => "rgba(255, 205, 86, 0.8)",
        "AM" => "rgba(75, 192, 192, 0.8)",
        "BA" => "rgba(54, 162, 235, 0.8)",
        "CE" => "rgba(153, 102, 255, 0.8)",
        "DF" => "rgba(255, 159, 243, 0.8)",
        "ES" => "rgba(201, 203, 207, 0.8)",
        "GO" => "rgba(75, 235, 107, 0.8)",
        "MA" => "rgba(255, 99, 132, 0.8)",
        "MT" => "rgba(255, 159, 132, 0.8)",
        "MS" => "rgba(54, 235, 162, 0.8)",
        "MG" => "rgba(235, 162, 54, 0.8)",
        "PA" => "rgba(162, 54, 235, 0.8)",
        "PB" => "rgba(54, 162, 235, 0.9)",
        "PR" => "rgba(235, 54, 162, 0.8)",
        "PE" => "rgba(162, 235, 54, 0.8)",
        "PI" => "rgba(99, 132, 255, 0.8)",
        "RJ" => "rgba(255, 132, 99, 0.8)",
        "RN" => "rgba(132, 255, 99, 0.8)",
        "RS" => "rgba(132, 99, 255, 0.8)",
        "RO" => "rgba(255, 99, 255, 0.8)",
        "RR" => "rgba(99, 255, 132, 0.8)",
        "SC" => "rgba(255, 198, 88, 0.8)",
        "SP" => "rgba(88, 198, 255, 0.8)",
        "SE" => "rgba(198, 255, 88, 0.8)",
        "TO" => "rgba(255, 88, 198, 0.8)",
        _ => FALLBACK_COLOR,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: Vec<String>,
    pub border_color: String,
    pub border_width: u32,
}

/// Chart.js-shaped dataset: labels plus one parallel series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

impl ChartData {
    pub fn values(&self) -> &[f64] {
        self.datasets.first().map(|d| d.data.as_slice()).unwrap_or(&[])
    }

    pub fn colors(&self) -> &[String] {
        self.datasets.first().map(|d| d.background_color.as_slice()).unwrap_or(&[])
    }

    /// (label, value) pairs in label order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.labels.iter().map(String::as_str).zip(self.values().iter().copied())
    }
}

/// Anything that contributes an amount to a region total.
pub trait RegionAmount {
    fn region(&self) -> &str;
    fn amount(&self) -> f64;
}

impl RegionAmount for OperatorRecord {
    fn region(&self) -> &str {
        self.region_code()
    }

    fn amount(&self) -> f64 {
        self.expense_amount()
    }
}

impl RegionAmount for RegionExpense {
    fn region(&self) -> &str {
        if self.region_code.is_empty() {
            MISSING_REGION
        } else {
            &self.region_code
        }
    }

    fn amount(&self) -> f64 {
        if self.total_amount.is_finite() {
            self.total_amount
        } else {
            0.0
        }
    }
}

/// Sums amounts per region, labels sorted ascending, one colour per label.
pub fn aggregate_by_region<T: RegionAmount>(items: &[T]) -> ChartData {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for item in items {
        *totals.entry(item.region()).or_insert(0.0) += item.amount();
    }

    let labels: Vec<String> = totals.keys().map(|k| k.to_string()).collect();
    let data: Vec<f64> = totals.values().copied().collect();
    let background_color = labels.iter().map(|uf| region_color(uf).to_string()).collect();

    ChartData {
        labels,
        datasets: vec![ChartDataset {
            label: CHART_LABEL.to_string(),
            data,
            background_color,
            border_color: "#fff".to_string(),
            border_width: 2,
        }],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sort direction '{0}', expected 'asc' or 'desc'")]
pub struct InvalidSortDirection(pub String);

impl FromStr for SortDirection {
    type Err = InvalidSortDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(InvalidSortDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

/// Field lookup by name, used by `sort_by_field`.
pub trait SortableRecord {
    fn field_value(&self, field: &str) -> Option<FieldValue>;
}

impl SortableRecord for OperatorRecord {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        let text = |v: &Option<String>| v.clone().map(FieldValue::Text);
        match field {
            "cnpj" => Some(FieldValue::Text(self.cnpj.clone())),
            "razao_social" => Some(FieldValue::Text(self.razao_social.clone())),
            "uf" => text(&self.uf),
            "registro_ans" => text(&self.registro_ans),
            "nome_fantasia" => text(&self.nome_fantasia),
            "modalidade" => text(&self.modalidade),
            "valor_despesas" => self.valor_despesas.as_ref().map(|a| FieldValue::Number(a.value())),
            _ => None,
        }
    }
}

impl SortableRecord for RegionExpense {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "uf" | "region_code" => Some(FieldValue::Text(self.region_code.clone())),
            "valor_despesas" | "total_amount" => Some(FieldValue::Number(self.total_amount)),
            _ => None,
        }
    }
}

impl SortableRecord for Value {
    fn field_value(&self, field: &str) -> Option<FieldValue> {
        match self.get(field)? {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            _ => None,
        }
    }
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn swap_case(c: char) -> char {
    if c.is_lowercase() {
        c.to_uppercase().next().unwrap_or(c)
    } else {
        c.to_lowercase().next().unwrap_or(c)
    }
}

/// Collation for pt-BR text: base letters first, then accents, then case
/// (lowercase sorts before uppercase).
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();

    let base = lower_a.chars().map(fold_char).cmp(lower_b.chars().map(fold_char));
    base.then_with(|| lower_a.cmp(&lower_b))
        .then_with(|| a.chars().map(swap_case).cmp(b.chars().map(swap_case)))
}

/// Numbers (a missing value counts as 0) order before text; text uses
/// `locale_compare`.
fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.total_cmp(y),
        (FieldValue::Text(x), FieldValue::Text(y)) => locale_compare(x, y),
        (FieldValue::Number(_), FieldValue::Text(_)) => Ordering::Less,
        (FieldValue::Text(_), FieldValue::Number(_)) => Ordering::Greater,
    }
}

/// Returns a sorted copy; `items` is left as it was.
pub fn sort_by_field<T: SortableRecord + Clone>(items: &[T], field: &str, direction: SortDirection) -> Vec<T> {
    let mut keyed: Vec<(FieldValue, &T)> = items
        .iter()
        .map(|item| (item.field_value(field).unwrap_or(FieldValue::Number(0.0)), item))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match direction {
        SortDirection::Asc => compare_values(a, b),
        SortDirection::Desc => compare_values(b, a),
    });
    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(uf: Option<&str>, amount: Option<&str>) -> OperatorRecord {
        let mut record = OperatorRecord::new("00000000000000", "X");
        record.uf = uf.map(str::to_string);
        if let Some(a) = amount {
            record = record.with_expenses(a);
        }
        record
    }

    fn is_cnpj_shape(s: &str) -> bool {
        let b = s.as_bytes();
        b.len() == 18
            && b.iter().enumerate().all(|(i, c)| match i {
                2 | 6 => *c == b'.',
                10 => *c == b'/',
                15 => *c == b'-',
                _ => c.is_ascii_digit(),
            })
    }

    #[test]
    fn identifier_gets_punctuated() {
        assert_eq!(format_identifier("12345678000199"), "12.345.678/0001-99");
        for raw in ["00000000000000", "98765432000111", "11222333000181"] {
            let formatted = format_identifier(raw);
            assert!(is_cnpj_shape(&formatted), "{}", formatted);
            let digits: String = formatted.chars().filter(|c| c.is_ascii_digit()).collect();
            assert_eq!(digits, raw);
        }
    }

    #[test]
    fn identifier_without_fourteen_digits_is_unchanged() {
        assert_eq!(format_identifier(""), "");
        assert_eq!(format_identifier("123"), "123");
        assert_eq!(format_identifier("12.345.678/0001-99"), "12.345.678/0001-99");
    }

    #[test]
    fn identifier_replaces_only_first_run() {
        assert_eq!(format_identifier("x123456780001999"), "x12.345.678/0001-999");
        assert_eq!(
            format_identifier("12345678000199 12345678000199"),
            "12.345.678/0001-99 12345678000199"
        );
    }

    #[test]
    fn currency_null_is_zero() {
        assert_eq!(format_currency(None), "R$ 0,00");
        assert_eq!(format_currency(Some(f64::NAN)), "R$ 0,00");
    }

    #[test]
    fn currency_groups_and_rounds() {
        assert_eq!(format_currency(Some(0.0)), "R$ 0,00");
        assert_eq!(format_currency(Some(1234.5)), "R$ 1.234,50");
        assert_eq!(format_currency(Some(1234567.891)), "R$ 1.234.567,89");
        assert_eq!(format_currency(Some(999.999)), "R$ 1.000,00");
        assert_eq!(format_currency(Some(-42.1)), "-R$ 42,10");
        assert_eq!(format_currency(Some(-0.001)), "R$ 0,00");
    }

    #[test]
    fn currency_rounds_the_decimal_value() {
        assert_eq!(format_currency(Some(1.005)), "R$ 1,01");
        assert_eq!(format_currency(Some(2.675)), "R$ 2,68");
        assert_eq!(format_currency(Some(0.994)), "R$ 0,99");
        assert_eq!(format_currency(Some(-0.995)), "-R$ 1,00");
    }

    #[test]
    fn currency_keeps_large_amounts_exact() {
        assert_eq!(format_currency(Some(1e20)), "R$ 100.000.000.000.000.000.000,00");
        assert_eq!(format_currency(Some(9_007_199_254_740_993.0)), "R$ 9.007.199.254.740.992,00");
    }

    #[test]
    fn date_formats_as_day_month_year() {
        assert_eq!(format_date(""), "");
        assert_eq!(format_date("2024-03-07"), "07/03/2024");
        assert_eq!(format_date("2024-03-07T10:20:30"), "07/03/2024");
        assert_eq!(format_date("2024-03-07 10:20:30.123"), "07/03/2024");
        assert_eq!(format_date("not a date"), "");
    }

    #[test]
    fn aggregate_empty_input() {
        let chart = aggregate_by_region::<OperatorRecord>(&[]);
        assert!(chart.labels.is_empty());
        assert!(chart.values().is_empty());
    }

    #[test]
    fn aggregate_sums_and_sorts_regions() {
        let ops = vec![op(Some("SP"), Some("100")), op(Some("SP"), Some("50")), op(Some("RJ"), Some("30"))];
        let chart = aggregate_by_region(&ops);
        assert_eq!(chart.labels, vec!["RJ", "SP"]);
        assert_eq!(chart.values(), &[30.0, 150.0]);
        assert_eq!(chart.colors(), &[region_color("RJ").to_string(), region_color("SP").to_string()]);
        assert_eq!(chart.datasets[0].label, CHART_LABEL);
    }

    #[test]
    fn aggregate_missing_region_and_bad_amounts() {
        let ops = vec![op(None, Some("abc")), op(None, None), op(Some("AC"), Some("10.5"))];
        let chart = aggregate_by_region(&ops);
        assert_eq!(chart.labels, vec!["AC", "XX"]);
        assert_eq!(chart.values(), &[10.5, 0.0]);
        assert_eq!(chart.colors()[1], FALLBACK_COLOR);
    }

    #[test]
    fn chart_serializes_camel_case() {
        let chart = aggregate_by_region(&[op(Some("SP"), Some("1"))]);
        let v = serde_json::to_value(&chart).unwrap();
        assert_eq!(v["datasets"][0]["backgroundColor"][0], region_color("SP"));
        assert_eq!(v["datasets"][0]["borderWidth"], 2);
    }

    #[test]
    fn sort_direction_parses() {
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("up".parse::<SortDirection>().is_err());
    }

    #[test]
    fn sort_does_not_mutate_input() {
        let items = vec![
            OperatorRecord::new("2", "Beta"),
            OperatorRecord::new("1", "Alfa"),
            OperatorRecord::new("3", "Gama"),
        ];
        let before = items.clone();
        let sorted = sort_by_field(&items, "razao_social", SortDirection::Asc);
        assert_eq!(items, before);
        let names: Vec<&str> = sorted.iter().map(|o| o.razao_social.as_str()).collect();
        assert_eq!(names, vec!["Alfa", "Beta", "Gama"]);
    }

    #[test]
    fn desc_reverses_locale_order() {
        let items = vec![
            OperatorRecord::new("1", "Órion"),
            OperatorRecord::new("2", "amil"),
            OperatorRecord::new("3", "Bradesco"),
            OperatorRecord::new("4", "Operadora"),
        ];
        let asc: Vec<String> = sort_by_field(&items, "razao_social", SortDirection::Asc)
            .into_iter()
            .map(|o| o.razao_social)
            .collect();
        assert_eq!(asc, vec!["amil", "Bradesco", "Operadora", "Órion"]);

        let mut desc: Vec<String> = sort_by_field(&items, "razao_social", SortDirection::Desc)
            .into_iter()
            .map(|o| o.razao_social)
            .collect();
        desc.reverse();
        assert_eq!(desc, asc);
    }

    #[test]
    fn numeric_fields_sort_numerically() {
        let items = vec![
            op(Some("SP"), Some("100")),
            op(Some("RJ"), Some("9")),
            op(Some("MG"), Some("25.5")),
        ];
        let sorted = sort_by_field(&items, "valor_despesas", SortDirection::Desc);
        let amounts: Vec<f64> = sorted.iter().map(|o| o.expense_amount()).collect();
        assert_eq!(amounts, vec![100.0, 25.5, 9.0]);
    }

    #[test]
    fn json_objects_are_sortable() {
        let rows = vec![json!({"uf": "SP", "total": 3}), json!({"uf": "AC", "total": 10})];
        let by_total = sort_by_field(&rows, "total", SortDirection::Asc);
        assert_eq!(by_total[0]["uf"], "SP");
        let by_uf = sort_by_field(&rows, "uf", SortDirection::Asc);
        assert_eq!(by_uf[0]["uf"], "AC");
    }

    #[test]
    fn mixed_text_and_numbers_sort_consistently() {
        let rows: Vec<Value> = (0..200)
            .map(|i| if i % 2 == 0 { json!({ "v": i }) } else { json!({ "v": i.to_string() }) })
            .collect();
        let asc = sort_by_field(&rows, "v", SortDirection::Asc);
        assert_eq!(asc.len(), 200);
        assert!(asc[..100].iter().all(|r| r["v"].is_number()));
        assert!(asc[100..].iter().all(|r| r["v"].is_string()));
        assert_eq!(asc[0]["v"], 0);
        assert_eq!(asc[99]["v"], 198);
        // text is compared as text: "1" < "11" < "3"
        assert_eq!(asc[100]["v"], "1");
        assert_eq!(asc[101]["v"], "101");

        let mut desc = sort_by_field(&rows, "v", SortDirection::Desc);
        desc.reverse();
        assert_eq!(desc, asc);
    }

    #[test]
    fn missing_values_sort_as_zero() {
        let rows = vec![json!({"v": 5}), json!({}), json!({"v": -1})];
        let sorted = sort_by_field(&rows, "v", SortDirection::Asc);
        assert_eq!(sorted, vec![json!({"v": -1}), json!({}), json!({"v": 5})]);
    }

    #[test]
    fn locale_compare_orders_case_and_accents() {
        assert_eq!(locale_compare("a", "A"), Ordering::Less);
        assert_eq!(locale_compare("e", "é"), Ordering::Less);
        assert_eq!(locale_compare("é", "f"), Ordering::Less);
        assert_eq!(locale_compare("abc", "abc"), Ordering::Equal);
    }
}
