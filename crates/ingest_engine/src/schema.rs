use serde::Deserialize;

/// Field specification handed to the extractor. The orchestrator only passes
/// it through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuerySchema {
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// CSS selector of the element carrying the value.
    pub selector: String,
    /// Read this attribute instead of the element text.
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Float,
    /// Normalized to YYYY-MM-DD.
    Date,
    /// Comma separated, upper-cased.
    Categories,
}
