use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Codice UF usato quando il backend non ne fornisce uno.
pub const MISSING_REGION: &str = "XX";

/// Statistiche generali (`GET /estatisticas`), opache per il client.
pub type Statistics = Value;

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Importo come arriva dal backend: numero JSON oppure stringa numerica
/// (i `Decimal` di FastAPI vengono serializzati come stringhe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    /// Numeric value with parseFloat semantics; anything unparseable is zero.
    pub fn value(&self) -> f64 {
        match self {
            RawAmount::Number(n) if n.is_finite() => *n,
            RawAmount::Number(_) => 0.0,
            RawAmount::Text(s) => parse_float_prefix(s).unwrap_or(0.0),
        }
    }
}

impl From<f64> for RawAmount {
    fn from(value: f64) -> Self {
        RawAmount::Number(value)
    }
}

impl From<&str> for RawAmount {
    fn from(value: &str) -> Self {
        RawAmount::Text(value.to_string())
    }
}

/// Parses the longest leading decimal literal of `input` ("12.5abc" -> 12.5).
/// Returns `None` when no digits lead the string.
pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }

    // exponent only counts when followed by digits
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

/// Rappresenta un'operadora come restituita dalla lista paginata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cnpj: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub razao_social: String,
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valor_despesas: Option<RawAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registro_ans: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome_fantasia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modalidade: Option<String>,
}

impl OperatorRecord {
    pub fn new(cnpj: impl Into<String>, razao_social: impl Into<String>) -> Self {
        Self {
            cnpj: cnpj.into(),
            razao_social: razao_social.into(),
            uf: None,
            valor_despesas: None,
            registro_ans: None,
            nome_fantasia: None,
            modalidade: None,
        }
    }

    pub fn with_region(mut self, uf: impl Into<String>) -> Self {
        self.uf = Some(uf.into());
        self
    }

    pub fn with_expenses(mut self, amount: impl Into<RawAmount>) -> Self {
        self.valor_despesas = Some(amount.into());
        self
    }

    /// Region code, or `XX` when missing or blank.
    pub fn region_code(&self) -> &str {
        match self.uf.as_deref() {
            Some(uf) if !uf.is_empty() => uf,
            _ => MISSING_REGION,
        }
    }

    pub fn expense_amount(&self) -> f64 {
        self.valor_despesas.as_ref().map(RawAmount::value).unwrap_or(0.0)
    }

    /// Case-insensitive substring match on legal name or CNPJ.
    pub fn matches_term(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.razao_social.to_lowercase().contains(&needle) || self.cnpj.to_lowercase().contains(&needle)
    }
}

/// Risposta di `GET /operadoras`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorPage {
    pub data: Vec<OperatorRecord>,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Scheda completa di `GET /operadoras/{cnpj}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cnpj: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub razao_social: String,
    #[serde(default)]
    pub registro_ans: Option<String>,
    #[serde(default)]
    pub nome_fantasia: Option<String>,
    #[serde(default)]
    pub modalidade: Option<String>,
    #[serde(default)]
    pub logradouro: Option<String>,
    #[serde(default)]
    pub numero: Option<String>,
    #[serde(default)]
    pub complemento: Option<String>,
    #[serde(default)]
    pub bairro: Option<String>,
    #[serde(default)]
    pub cidade: Option<String>,
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub endereco_eletronico: Option<String>,
    #[serde(default)]
    pub representante: Option<String>,
    #[serde(default)]
    pub cargo_representante: Option<String>,
    #[serde(default)]
    pub data_registro_ans: Option<NaiveDate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Una riga dello storico trimestrale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub ano: i32,
    pub trimestre: u8,
    pub valor_despesas: RawAmount,
}

/// Dettaglio spese di `GET /operadoras/{cnpj}/despesas`.
/// Unknown fields are kept in `extra` so the payload round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cnpj: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub razao_social: String,
    #[serde(default)]
    pub registro_ans: Option<String>,
    #[serde(default)]
    pub modalidade: Option<String>,
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default)]
    pub cidade: Option<String>,
    #[serde(default)]
    pub historico: Vec<ExpenseEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExpenseDetail {
    pub fn total_expenses(&self) -> f64 {
        self.historico.iter().map(|e| e.valor_despesas.value()).sum()
    }
}

/// Totale di spesa per UF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionExpense {
    #[serde(rename = "uf", default, deserialize_with = "null_as_empty")]
    pub region_code: String,
    #[serde(rename = "valor_despesas", default)]
    pub total_amount: f64,
}

/// Risposta di `GET /operadoras/estatisticas/despesas-uf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionExpenseResponse {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub data: Vec<RegionExpense>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_float_prefix_follows_parse_float() {
        assert_eq!(parse_float_prefix("100"), Some(100.0));
        assert_eq!(parse_float_prefix("  12.5abc"), Some(12.5));
        assert_eq!(parse_float_prefix("-3.25"), Some(-3.25));
        assert_eq!(parse_float_prefix("1e3x"), Some(1000.0));
        assert_eq!(parse_float_prefix("7e"), Some(7.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix(""), None);
        assert_eq!(parse_float_prefix("."), None);
    }

    #[test]
    fn operator_accepts_string_or_number_amounts() {
        let json = r#"[
            {"cnpj": "12345678000199", "razao_social": "Alfa Saude", "uf": "SP", "valor_despesas": "1500.75"},
            {"cnpj": "98765432000111", "razao_social": "Beta", "uf": null, "valor_despesas": 20},
            {"cnpj": null, "razao_social": "Gama"}
        ]"#;
        let ops: Vec<OperatorRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(ops[0].expense_amount(), 1500.75);
        assert_eq!(ops[0].region_code(), "SP");
        assert_eq!(ops[1].expense_amount(), 20.0);
        assert_eq!(ops[1].region_code(), MISSING_REGION);
        assert_eq!(ops[2].cnpj, "");
        assert_eq!(ops[2].expense_amount(), 0.0);
    }

    #[test]
    fn blank_region_falls_back_to_sentinel() {
        let op = OperatorRecord::new("1", "A").with_region("");
        assert_eq!(op.region_code(), "XX");
    }

    #[test]
    fn matches_term_is_case_insensitive_on_name_and_cnpj() {
        let op = OperatorRecord::new("12345678000199", "Unimed Paulistana");
        assert!(op.matches_term("UNIMED"));
        assert!(op.matches_term("paulis"));
        assert!(op.matches_term("5678"));
        assert!(!op.matches_term("bradesco"));
    }

    #[test]
    fn expense_detail_keeps_unknown_fields() {
        let json = r#"{
            "cnpj": "12345678000199",
            "razao_social": "Alfa",
            "registro_ans": "123456",
            "historico": [
                {"ano": 2024, "trimestre": 1, "valor_despesas": "100.50"},
                {"ano": 2024, "trimestre": 2, "valor_despesas": 49.5}
            ],
            "observacao": "extra"
        }"#;
        let detail: ExpenseDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.historico.len(), 2);
        assert_eq!(detail.total_expenses(), 150.0);
        assert_eq!(detail.extra.get("observacao"), Some(&Value::from("extra")));
    }

    #[test]
    fn region_response_uses_wire_names() {
        let json = r#"{"labels": ["RJ"], "values": [30.0], "data": [{"uf": "RJ", "valor_despesas": 30.0}, {"uf": null, "valor_despesas": 1.0}]}"#;
        let resp: RegionExpenseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].region_code, "RJ");
        assert_eq!(resp.data[0].total_amount, 30.0);
        assert_eq!(resp.data[1].region_code, "");
    }
}
