//! Merged, document-level records returned to the caller.
//!
//! Every type here serialises to the JSON the upload front-end renders and
//! deserialises back without loss, so a record can be cached or forwarded
//! as-is.

use crate::document::DocumentType;
use crate::fragment::lenient::{self, Prose};
use serde::{Deserialize, Serialize};

/// A company partner (socio). Also used for the per-page partial view: on a
/// single page any subset of fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    /// RFC. Uppercased when decoded from a page; kept as given here.
    #[serde(default, alias = "rfc", deserialize_with = "lenient::text")]
    pub tax_id: Option<String>,
    /// CURP.
    #[serde(default, alias = "curp", deserialize_with = "lenient::text")]
    pub personal_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub nationality: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub contribution: Option<String>,
}

impl Partner {
    /// True when at least one of name, tax id or personal id is present.
    pub fn is_identifiable(&self) -> bool {
        self.name.is_some() || self.tax_id.is_some() || self.personal_id.is_some()
    }
}

/// Capital social.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capital {
    #[serde(default, deserialize_with = "lenient::text")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub description: Option<String>,
}

impl Prose for Capital {
    fn from_prose(text: String) -> Self {
        Capital {
            description: Some(text),
            ..Default::default()
        }
    }

    fn is_blank(&self) -> bool {
        self.amount.is_none() && self.currency.is_none() && self.description.is_none()
    }
}

/// Notary (or corredor público) who formalised the deed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryInfo {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "lenient::prose")]
    pub location: Option<String>,
}

impl Prose for NotaryInfo {
    fn from_prose(text: String) -> Self {
        NotaryInfo {
            name: Some(text),
            ..Default::default()
        }
    }

    fn is_blank(&self) -> bool {
        self.name.is_none() && self.number.is_none() && self.location.is_none()
    }
}

/// The merged acta constitutiva.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncorporationRecord {
    pub company_name: Option<String>,
    pub company_tax_id: Option<String>,
    pub incorporation_date: Option<String>,
    pub partners: Vec<Partner>,
    pub business_purpose: Option<String>,
    pub capital: Option<Capital>,
    pub duration: Option<String>,
    pub management_body: Option<String>,
    pub legal_representatives: Vec<String>,
    pub notary_info: Option<NotaryInfo>,
    pub registration_data: Option<String>,
}

/// One merged sanctions-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanctionsEntry {
    pub full_name: String,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub aliases: Vec<String>,
    pub tax_id: Option<String>,
    pub personal_id: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub reason: Option<String>,
    pub source_list: Option<String>,
}

/// The single result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "documentType", content = "data", rename_all = "kebab-case")]
pub enum MergedRecord {
    #[serde(rename = "incorporation-record")]
    Incorporation(IncorporationRecord),
    #[serde(rename = "sanctions-list")]
    Sanctions(Vec<SanctionsEntry>),
}

impl MergedRecord {
    pub fn document_type(&self) -> DocumentType {
        match self {
            MergedRecord::Incorporation(_) => DocumentType::IncorporationRecord,
            MergedRecord::Sanctions(_) => DocumentType::SanctionsList,
        }
    }

    pub fn as_incorporation(&self) -> Option<&IncorporationRecord> {
        match self {
            MergedRecord::Incorporation(r) => Some(r),
            MergedRecord::Sanctions(_) => None,
        }
    }

    pub fn as_sanctions(&self) -> Option<&[SanctionsEntry]> {
        match self {
            MergedRecord::Sanctions(entries) => Some(entries),
            MergedRecord::Incorporation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_incorporation() -> MergedRecord {
        MergedRecord::Incorporation(IncorporationRecord {
            company_name: Some("Acme S.A. de C.V.".into()),
            company_tax_id: Some("AAC010101AB1".into()),
            incorporation_date: Some("12 de marzo de 2010".into()),
            partners: vec![Partner {
                name: Some("Juan Pérez".into()),
                tax_id: Some("PEGJ800101AB1".into()),
                address: Some("Calle 1, CDMX".into()),
                ..Default::default()
            }],
            business_purpose: Some("Comercio\nImportación".into()),
            capital: Some(Capital {
                amount: Some("50000".into()),
                currency: Some("MXN".into()),
                description: None,
            }),
            duration: Some("99 años".into()),
            management_body: None,
            legal_representatives: vec!["Ana Ruiz".into()],
            notary_info: Some(NotaryInfo {
                name: Some("Lic. Pedro Gómez".into()),
                number: Some("45".into()),
                location: Some("Monterrey, N.L.".into()),
            }),
            registration_data: None,
        })
    }

    #[test]
    fn incorporation_round_trips_through_json() {
        let record = sample_incorporation();
        let json = serde_json::to_string(&record).unwrap();
        let back: MergedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn sanctions_round_trips_through_json() {
        let record = MergedRecord::Sanctions(vec![SanctionsEntry {
            full_name: "Carlos Ramírez".into(),
            entry_type: Some("Persona Física".into()),
            aliases: vec!["El Güero".into(), "C. R.".into()],
            tax_id: None,
            personal_id: Some("RARC700101HDFMRR09".into()),
            birth_date: Some("1970-01-01".into()),
            address: None,
            reason: Some("Lavado de dinero".into()),
            source_list: Some("LPB".into()),
        }]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["documentType"], "sanctions-list");
        assert_eq!(value["data"][0]["type"], "Persona Física");
        let back: MergedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn caller_built_ids_round_trip_unchanged() {
        let record = MergedRecord::Incorporation(IncorporationRecord {
            partners: vec![Partner {
                name: Some("Juan Pérez".into()),
                tax_id: Some("pegj800101ab1".into()),
                personal_id: Some("Pegj800101HdfRrn09".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        let json = serde_json::to_string(&record).unwrap();
        let back: MergedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn absent_fields_serialise_as_null() {
        let value = serde_json::to_value(MergedRecord::Incorporation(IncorporationRecord::default()))
            .unwrap();
        assert!(value["data"]["companyName"].is_null());
        assert_eq!(value["data"]["partners"], serde_json::json!([]));
    }

    #[test]
    fn partner_identifiable() {
        assert!(!Partner::default().is_identifiable());
        let p = Partner {
            personal_id: Some("X".into()),
            ..Default::default()
        };
        assert!(p.is_identifiable());
    }
}
