//! Prompts sent to the vision model, one instruction per document type.
//!
//! The documents are Mexican, so the instructions are in Spanish; the JSON
//! keys are English and must match the field names in [`crate::fragment`].
//! Every instruction is scoped to the single page being shown: pages are
//! extracted independently and reconciled later by [`crate::merge`].
//!
//! Callers can override the system message via
//! [`crate::config::ExtractionConfig::system_prompt`]; the page instructions
//! are fixed because the decoder depends on their keys.

use crate::document::DocumentType;

/// Default system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente experto en extracción de datos de documentos legales mexicanos. \
Analiza la imagen de la página proporcionada y responde ÚNICAMENTE con un objeto JSON válido. \
No incluyas explicaciones, comentarios ni bloques de código markdown.";

/// Instruction for one page of an acta constitutiva.
pub const INCORPORATION_PAGE_PROMPT: &str = r#"Analiza la imagen de ESTA PÁGINA de un acta constitutiva mexicana. Extrae SOLO la información que sea VISIBLE EN ESTA PÁGINA y devuélvela como un objeto JSON.

Claves a usar (exactamente como aparecen, en inglés), cuando el dato esté presente en esta página:
- "companyName": razón o denominación social completa.
- "companyTaxId": RFC de la sociedad (12 caracteres).
- "incorporationDate": fecha de constitución.
- "partners": arreglo de socios cuyos datos aparezcan en esta página. Cada socio es un objeto con las claves que se encuentren:
    - "name": nombre completo.
    - "taxId": RFC (13 caracteres).
    - "personalId": CURP (18 caracteres).
    - "nationality": nacionalidad.
    - "address": domicilio.
    - "contribution": aportación.
- "businessPurposeChunk": parte del objeto social que aparece en esta página.
- "capital": objeto con "amount", "currency" y "description" si el capital social se define en esta página.
- "duration": duración de la sociedad.
- "managementBodyChunk": descripción del órgano de administración o de sus miembros.
- "legalRepresentativeNames": arreglo con los nombres de representantes legales o apoderados.
- "notaryInfo": objeto con "name", "number" y "location" del notario o corredor público.
- "registrationDataChunk": datos de inscripción en el Registro Público de Comercio.

MUY IMPORTANTE:
- Si un dato no aparece en esta página, usa null (o [] para los arreglos). Si no hay socios, devuelve "partners": [].
- NO inventes información ni uses datos de otras páginas.
- Responde solo con el objeto JSON, sin texto adicional."#;

/// Instruction for one page of a lista de personas bloqueadas.
pub const SANCTIONS_PAGE_PROMPT: &str = r#"Analiza la imagen de ESTA PÁGINA de una lista de personas bloqueadas (LPB) o sancionadas. Extrae TODAS las personas o entidades VISIBLES EN ESTA PÁGINA y devuélvelas en un arreglo bajo la clave "entries".

Cada elemento de "entries" es un objeto con estas claves (exactamente como aparecen, en inglés):
- "fullName": nombre completo de la persona o entidad.
- "type": "Persona Física" o "Entidad/Empresa"; infiérelo si no es explícito.
- "aliases": arreglo de alias o nombres alternativos.
- "taxId": RFC.
- "personalId": CURP.
- "birthDate": fecha de nacimiento.
- "address": domicilio.
- "reason": motivo del bloqueo o sanción.
- "sourceList": nombre o referencia de la lista de origen.

MUY IMPORTANTE:
- Si la página no contiene ninguna entrada, devuelve {"entries": []}.
- Si un campo de una entrada no aparece, usa null para ese campo.
- NO inventes información ni uses datos de otras páginas.
- Responde solo con el objeto JSON, sin texto adicional."#;

/// Page instruction for a document type.
pub fn page_instruction(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::IncorporationRecord => INCORPORATION_PAGE_PROMPT,
        DocumentType::SanctionsList => SANCTIONS_PAGE_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incorporation_prompt_names_every_decoded_key() {
        for key in [
            "companyName",
            "companyTaxId",
            "incorporationDate",
            "partners",
            "taxId",
            "personalId",
            "businessPurposeChunk",
            "capital",
            "duration",
            "managementBodyChunk",
            "legalRepresentativeNames",
            "notaryInfo",
            "registrationDataChunk",
        ] {
            assert!(
                INCORPORATION_PAGE_PROMPT.contains(&format!("\"{key}\"")),
                "missing {key}"
            );
        }
    }

    #[test]
    fn sanctions_prompt_requires_entries_container() {
        let p = page_instruction(DocumentType::SanctionsList);
        assert!(p.contains("\"entries\""));
        assert!(p.contains("\"fullName\""));
    }

    #[test]
    fn prompts_are_page_scoped() {
        for t in [DocumentType::IncorporationRecord, DocumentType::SanctionsList] {
            assert!(page_instruction(t).contains("ESTA PÁGINA"));
        }
    }
}
