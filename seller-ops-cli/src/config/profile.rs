//! Sheet profiles: where each downstream sheet takes its values from

use anyhow::{Result, bail};
use serde::Deserialize;
use std::path::PathBuf;

use crate::pipeline::card::{CardField, NewItemCard};
use crate::sheets::{CandidatePolicy, CellValue, ColumnTarget, TargetColumns};

/// Text case applied to a projected field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Case {
    #[default]
    Keep,
    Upper,
    Lower,
}

/// A literal written into every projected row
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    Number(f64),
    Text(String),
}

impl Constant {
    fn to_cell(&self) -> CellValue {
        match self {
            Constant::Number(n) => CellValue::Number(*n),
            Constant::Text(s) => CellValue::parse(s.clone()),
        }
    }
}

/// The value that lands in one target column: a card field or a constant
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ValueSpec {
    #[serde(default)]
    pub field: Option<CardField>,
    #[serde(default)]
    pub constant: Option<Constant>,
    #[serde(default)]
    pub case: Case,
}

impl ValueSpec {
    pub fn validate(&self) -> Result<()> {
        match (&self.field, &self.constant) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(field), Some(_)) => bail!("value for '{}' sets both field and constant", field),
            (None, None) => bail!("value needs either a field or a constant"),
        }
    }

    /// Column label used by exports
    pub fn label(&self) -> String {
        match (&self.field, &self.constant) {
            (Some(field), _) => field.to_string(),
            (None, Some(Constant::Number(n))) => CellValue::Number(*n).to_string(),
            (None, Some(Constant::Text(s))) => s.clone(),
            (None, None) => String::new(),
        }
    }

    /// Cell value for one card; numeric-looking field text is written as a number
    pub fn resolve(&self, card: &NewItemCard) -> CellValue {
        if let Some(constant) = &self.constant {
            return constant.to_cell();
        }
        let Some(field) = self.field else {
            return CellValue::Empty;
        };

        let raw = card.get(field);
        let text = match self.case {
            Case::Keep => raw.to_string(),
            Case::Upper => raw.to_uppercase(),
            Case::Lower => raw.to_lowercase(),
        };
        numeric_cell(text)
    }
}

fn numeric_cell(text: String) -> CellValue {
    // codes like "007" stay text
    let leading_zero = text.len() > 1 && text.starts_with('0') && !text.starts_with("0.") && !text.starts_with("0,");
    if !leading_zero
        && let Ok(n) = text.replace(',', ".").parse::<f64>()
        && n.is_finite()
    {
        return CellValue::Number(n);
    }
    CellValue::parse(text)
}

/// One value bound to one column
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Binding {
    /// Header name of the target column
    #[serde(default)]
    pub column: Option<String>,
    /// A1 letter of the target column
    #[serde(default)]
    pub letter: Option<String>,
    /// 0-based target column index
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(flatten)]
    pub value: ValueSpec,
}

impl Binding {
    fn target(&self) -> Result<ColumnTarget> {
        match (&self.column, &self.letter, self.index) {
            (Some(name), None, None) => Ok(ColumnTarget::Header(name.clone())),
            (None, Some(letter), None) => Ok(ColumnTarget::Letter(letter.clone())),
            (None, None, Some(idx)) => Ok(ColumnTarget::Index(idx)),
            _ => bail!("binding needs exactly one of column, letter or index"),
        }
    }
}

/// Consecutive columns from `start` to `end`, filled in order by `values`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpanBinding {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub expected: Option<usize>,
    pub values: Vec<ValueSpec>,
}

/// A downstream sheet and how a card projects onto it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetProfile {
    pub name: String,
    /// Alias from the `[spreadsheets]` table
    pub spreadsheet: String,
    pub sheet: String,
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    /// Header of the key column compared against the key field
    pub comparison_column: String,
    /// Card field the batch collapses on and reconciles by
    pub key_field: CardField,
    /// Insert only rows whose key is missing from the sheet
    #[serde(default = "default_true")]
    pub reconcile: bool,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default)]
    pub span: Option<SpanBinding>,
    /// Headers expected to hold a formula in the sheet's last row
    #[serde(default)]
    pub formula_columns: Vec<String>,
    #[serde(default)]
    pub policy: CandidatePolicy,
    /// Also save the projected rows to this workbook
    #[serde(default)]
    pub export_xlsx: Option<PathBuf>,
}

fn default_header_row() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl SheetProfile {
    /// Target columns, resolved later against the live header row
    pub fn targets(&self) -> Result<TargetColumns> {
        match (&self.span, self.bindings.is_empty()) {
            (Some(span), true) => Ok(TargetColumns::Span {
                start: span.start.clone(),
                end: span.end.clone(),
                expected: span.expected.or(Some(span.values.len())),
            }),
            (None, false) => Ok(TargetColumns::Each(
                self.bindings.iter().map(Binding::target).collect::<Result<_>>()?,
            )),
            (Some(_), false) => bail!("profile '{}' sets both span and bindings", self.name),
            (None, true) => bail!("profile '{}' needs span or bindings", self.name),
        }
    }

    /// Value specs in target order
    pub fn values(&self) -> Vec<&ValueSpec> {
        match &self.span {
            Some(span) => span.values.iter().collect(),
            None => self.bindings.iter().map(|b| &b.value).collect(),
        }
    }

    /// Static checks, no network
    pub fn validate(&self) -> Result<()> {
        if self.header_row == 0 {
            bail!("profile '{}': header_row is 1-based", self.name);
        }
        self.targets()?;
        for value in self.values() {
            value.validate().map_err(|e| anyhow::anyhow!("profile '{}': {}", self.name, e))?;
        }
        if let Some(span) = &self.span
            && let Some(expected) = span.expected
            && expected != span.values.len()
        {
            bail!(
                "profile '{}': span expects {} columns but lists {} values",
                self.name,
                expected,
                span.values.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sopost() -> SheetProfile {
        toml::from_str(
            r#"
            name = "sopost"
            spreadsheet = "unit"
            sheet = "Сопост"
            comparison_column = "wild"
            key_field = "supplier_code_unique"
            formula_columns = ["Маржа"]

            [span]
            start = "предмет"
            end = "Добавляем"
            expected = 6
            values = [
                { field = "category" },
                { field = "item_name" },
                { field = "supplier_code_unique" },
                { field = "supplier_code_unique" },
                { field = "purchase_price" },
                { constant = 100 },
            ]
            "#,
        )
        .unwrap()
    }

    fn card() -> NewItemCard {
        NewItemCard::new(2)
            .with(CardField::Sku, "123")
            .with(CardField::Client, "ип иванов")
            .with(CardField::Category, "Shoes")
            .with(CardField::ItemName, "Кроссовки")
            .with(CardField::SupplierCodeUnique, "wild99")
            .with(CardField::PurchasePrice, "500")
    }

    #[test]
    fn test_span_profile() {
        let profile = sopost();
        profile.validate().unwrap();
        assert_eq!(profile.header_row, 1);
        assert!(profile.reconcile);
        assert_eq!(
            profile.targets().unwrap(),
            TargetColumns::Span { start: "предмет".into(), end: "Добавляем".into(), expected: Some(6) }
        );

        let row: Vec<CellValue> = profile.values().iter().map(|v| v.resolve(&card())).collect();
        assert_eq!(
            row,
            vec![
                CellValue::Text("Shoes".into()),
                CellValue::Text("Кроссовки".into()),
                CellValue::Text("wild99".into()),
                CellValue::Text("wild99".into()),
                CellValue::Number(500.0),
                CellValue::Number(100.0),
            ]
        );
    }

    #[test]
    fn test_binding_profile_with_case() {
        let profile: SheetProfile = toml::from_str(
            r#"
            name = "autopilot"
            spreadsheet = "pilot"
            sheet = "Автопилот"
            header_row = 3
            comparison_column = "Артикул"
            key_field = "sku"
            bindings = [
                { index = 0, field = "sku" },
                { letter = "B", field = "category" },
                { column = "Клиент", field = "client", case = "upper" },
            ]
            "#,
        )
        .unwrap();
        profile.validate().unwrap();

        assert_eq!(
            profile.targets().unwrap(),
            TargetColumns::Each(vec![
                ColumnTarget::Index(0),
                ColumnTarget::Letter("B".into()),
                ColumnTarget::Header("Клиент".into()),
            ])
        );
        assert_eq!(profile.values()[2].resolve(&card()), CellValue::Text("ИП ИВАНОВ".into()));
        assert_eq!(profile.values()[0].resolve(&card()), CellValue::Number(123.0));
    }

    #[test]
    fn test_invalid_profiles() {
        let mut profile = sopost();
        profile.bindings.push(Binding {
            column: Some("x".into()),
            letter: None,
            index: None,
            value: ValueSpec { field: Some(CardField::Sku), ..Default::default() },
        });
        assert!(profile.validate().is_err());

        let mut profile = sopost();
        profile.span.as_mut().unwrap().expected = Some(5);
        assert!(profile.validate().is_err());

        let mut profile = sopost();
        profile.span.as_mut().unwrap().values.push(ValueSpec::default());
        profile.span.as_mut().unwrap().expected = None;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_binding_needs_one_target() {
        let binding = Binding {
            column: Some("a".into()),
            letter: Some("B".into()),
            index: None,
            value: ValueSpec::default(),
        };
        assert!(binding.target().is_err());
    }

    #[test]
    fn test_numeric_cells() {
        assert_eq!(numeric_cell("500".into()), CellValue::Number(500.0));
        assert_eq!(numeric_cell("12,5".into()), CellValue::Number(12.5));
        assert_eq!(numeric_cell("0".into()), CellValue::Number(0.0));
        assert_eq!(numeric_cell("0.5".into()), CellValue::Number(0.5));
        assert_eq!(numeric_cell("007".into()), CellValue::Text("007".into()));
        assert_eq!(numeric_cell("wild1".into()), CellValue::Text("wild1".into()));
        assert_eq!(numeric_cell(String::new()), CellValue::Empty);
    }
}
