//! Per-page structured fragments, as decoded from one model answer.
//!
//! A fragment only describes what was visible on its own page: any field can
//! be missing, lists can be empty, and nothing is reconciled yet. Fragments
//! are immutable once decoded; [`crate::merge`] reads them and builds its own
//! accumulating record.
//!
//! Decoding is typed but forgiving about the small liberties vision models
//! take (numbers where text was asked for, `null` lists, blank strings). It is
//! not forgiving about structure: an object where a name should be still
//! fails the page.

use crate::document::DocumentType;
use crate::record::{Capital, NotaryInfo, Partner};
use serde::{Deserialize, Serialize};

/// The structured output of one page, tagged by document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "documentType", content = "fragment", rename_all = "kebab-case")]
pub enum PageFragment {
    Incorporation(IncorporationFragment),
    Sanctions(SanctionsFragment),
}

impl PageFragment {
    pub fn document_type(&self) -> DocumentType {
        match self {
            PageFragment::Incorporation(_) => DocumentType::IncorporationRecord,
            PageFragment::Sanctions(_) => DocumentType::SanctionsList,
        }
    }
}

/// What one page of an acta constitutiva contributed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncorporationFragment {
    #[serde(default, deserialize_with = "lenient::text")]
    pub company_name: Option<String>,
    #[serde(default, alias = "companyRfc", deserialize_with = "lenient::id")]
    pub company_tax_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub incorporation_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::partners")]
    pub partners: Vec<Partner>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub business_purpose_chunk: Option<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub capital: Option<Capital>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub management_body_chunk: Option<String>,
    #[serde(
        default,
        alias = "legalRepresentativesChunk",
        alias = "legalRepresentatives",
        deserialize_with = "lenient::text_list"
    )]
    pub legal_representative_names: Vec<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub notary_info: Option<NotaryInfo>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub registration_data_chunk: Option<String>,
}

/// What one page of a sanctions list contributed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SanctionsFragment {
    #[serde(deserialize_with = "lenient::seq")]
    pub entries: Vec<PartialEntry>,
}

/// A sanctions-list row as seen on one page. Rows without a name are
/// unidentifiable and ignored by the merger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialEntry {
    #[serde(default, deserialize_with = "lenient::text")]
    pub full_name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    pub entry_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub aliases: Vec<String>,
    #[serde(default, alias = "rfc", deserialize_with = "lenient::id")]
    pub tax_id: Option<String>,
    #[serde(default, alias = "curp", deserialize_with = "lenient::id")]
    pub personal_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub source_list: Option<String>,
}

/// Field decoders shared by fragments and merged records.
pub(crate) mod lenient {
    use crate::record::Partner;
    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Structured values that a model may also hand back as a bare sentence.
    pub trait Prose: Sized {
        fn from_prose(text: String) -> Self;
        fn is_blank(&self) -> bool;
    }

    fn non_blank(s: String) -> Option<String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == s.len() {
            Some(s)
        } else {
            Some(trimmed.to_string())
        }
    }

    fn kind(v: &Value) -> &'static str {
        match v {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        }
    }

    fn scalar(v: Value) -> Result<Option<String>, String> {
        match v {
            Value::Null => Ok(None),
            Value::String(s) => Ok(non_blank(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(format!("expected text, found {}", kind(&other))),
        }
    }

    /// Short text: string, number or boolean.
    pub fn text<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Option::<Value>::deserialize(d)?.unwrap_or(Value::Null);
        scalar(v).map_err(D::Error::custom)
    }

    /// Tax / personal ids: text, trimmed and uppercased.
    pub fn id<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(text(d)?.map(|s| s.to_uppercase()))
    }

    /// Free text; an array of lines is joined with newlines.
    pub fn prose<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(d)?.unwrap_or(Value::Null) {
            Value::Array(items) => {
                let lines = items
                    .into_iter()
                    .map(scalar)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(D::Error::custom)?;
                let joined = lines.into_iter().flatten().collect::<Vec<_>>().join("\n");
                Ok(non_blank(joined))
            }
            other => scalar(other).map_err(D::Error::custom),
        }
    }

    /// A list of names: `null`, a single string, or an array of scalars.
    pub fn text_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(d)?.unwrap_or(Value::Null) {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(non_blank(s).into_iter().collect()),
            Value::Array(items) => {
                let names = items
                    .into_iter()
                    .map(scalar)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(D::Error::custom)?;
                Ok(names.into_iter().flatten().collect())
            }
            other => Err(D::Error::custom(format!(
                "expected a list of names, found {}",
                kind(&other)
            ))),
        }
    }

    /// A list of records; `null` is an empty list.
    pub fn seq<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
    }

    /// Partners as read off a page, with RFC and CURP uppercased.
    pub fn partners<'de, D>(d: D) -> Result<Vec<Partner>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut partners: Vec<Partner> = seq(d)?;
        for p in &mut partners {
            p.tax_id = p.tax_id.take().map(|s| s.to_uppercase());
            p.personal_id = p.personal_id.take().map(|s| s.to_uppercase());
        }
        Ok(partners)
    }

    /// A small record (capital, notary) or a sentence describing it.
    /// Records whose fields are all empty decode as `None`.
    pub fn record<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Prose,
    {
        let parsed = match Option::<Value>::deserialize(d)?.unwrap_or(Value::Null) {
            Value::Null => return Ok(None),
            Value::String(s) => match non_blank(s) {
                Some(s) => T::from_prose(s),
                None => return Ok(None),
            },
            Value::Number(n) => T::from_prose(n.to_string()),
            obj @ Value::Object(_) => serde_json::from_value::<T>(obj).map_err(D::Error::custom)?,
            other => {
                return Err(D::Error::custom(format!(
                    "expected an object or text, found {}",
                    kind(&other)
                )))
            }
        };
        Ok(if parsed.is_blank() { None } else { Some(parsed) })
    }
}
