//! Identity-key normalisation for names and ids seen across pages.
//!
//! The same partner shows up as `José Pérez`, `JOSE PEREZ` and `Jose  Perez,`
//! on different pages of one acta. [`normalize`] maps all of those to the same
//! key so the merger can recognise them. It does not attempt to reconcile
//! genuine spelling variants (`Peres` vs `Pérez`).

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Compute the matching key for a name.
///
/// Steps, in order:
/// 1. canonical decomposition (NFD) so accents become separate marks
/// 2. drop the combining marks
/// 3. uppercase
/// 4. drop everything that is not `A–Z`, `0–9` or whitespace
/// 5. collapse whitespace runs to one space
/// 6. trim
///
/// Total and idempotent; empty input yields an empty string.
pub fn normalize(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`normalize`] for optional input; `None` and blank names give `None`.
pub fn normalize_key(value: Option<&str>) -> Option<String> {
    let key = normalize(value?);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Entity key for a name or id.
///
/// [`normalize_key`] when it leaves anything. Names in other scripts
/// (`Виктор Бут`, `李明`) or made only of symbols normalise to nothing, so
/// those fall back to the text uppercased with whitespace collapsed.
/// `None` only for absent or blank input.
pub fn identity_key(value: Option<&str>) -> Option<String> {
    let value = value?;
    normalize_key(Some(value)).or_else(|| {
        let folded = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if folded.is_empty() {
            None
        } else {
            Some(folded.to_uppercase())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_case() {
        assert_eq!(normalize("José Pérez"), normalize("JOSE PEREZ"));
        assert_eq!(normalize("José Pérez"), "JOSE PEREZ");
    }

    #[test]
    fn handles_enye_and_dieresis() {
        assert_eq!(normalize("Muñoz Güemes"), "MUNOZ GUEMES");
    }

    #[test]
    fn drops_punctuation_and_collapses_spaces() {
        assert_eq!(normalize("  Pérez,  Juan\t(Lic.) "), "PEREZ JUAN LIC");
        assert_eq!(normalize("Grupo-Acme S.A. de C.V."), "GRUPOACME SA DE CV");
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(normalize("pegj800101hdf"), "PEGJ800101HDF");
    }

    #[test]
    fn empty_and_symbol_only_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("..--"), "");
        assert_eq!(normalize_key(Some("--")), None);
        assert_eq!(normalize_key(None), None);
    }

    #[test]
    fn identity_key_falls_back_for_other_scripts() {
        assert_eq!(identity_key(Some("José  Pérez")), Some("JOSE PEREZ".into()));
        assert_eq!(identity_key(Some("Виктор Бут")), Some("ВИКТОР БУТ".into()));
        assert_eq!(
            identity_key(Some("  виктор   бут ")),
            identity_key(Some("ВИКТОР БУТ"))
        );
        assert_eq!(identity_key(Some("李明")), Some("李明".into()));
        assert_eq!(identity_key(Some("--")), Some("--".into()));
        assert_eq!(identity_key(Some(" \t ")), None);
        assert_eq!(identity_key(None), None);
    }

    #[test]
    fn idempotent() {
        for s in [
            "José Pérez",
            "MARÍA   DEL   CARMEN",
            "Ñandú Ångström ǰ",
            "straße",
            "  ",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {s:?}");
        }
    }
}
