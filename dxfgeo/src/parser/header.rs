//! Parser de la section HEADER (variables $NOM)

use tracing::warn;

use crate::reader::{GroupCursor, GroupPair};
use crate::types::Header;
use crate::DxfError;

/// Parse la section HEADER jusqu'à son ENDSEC.
///
/// Les variables reconnues ($EXTMIN, $EXTMAX, $INSUNITS, $DWGCODEPAGE)
/// alimentent des champs structurés; la première valeur textuelle de
/// chaque variable est aussi conservée brute pour la détection de CRS.
pub fn parse(cursor: &mut GroupCursor, header: &mut Header) -> Result<(), DxfError> {
    let mut current_var: Option<String> = None;
    let mut ext_min = (None, None);
    let mut ext_max = (None, None);

    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("HEADER", 0, "missing ENDSEC"));
        };
        let pair = pair.clone();

        match pair.code {
            0 if pair.value == "ENDSEC" => break,
            0 if pair.value == "SECTION" => {
                cursor.back();
                return Err(DxfError::section(
                    "HEADER",
                    pair.line,
                    "missing ENDSEC before next SECTION",
                ));
            }
            0 => {
                return Err(DxfError::section(
                    "HEADER",
                    pair.line,
                    format!("unexpected marker \"{}\" inside HEADER", pair.value),
                ));
            }
            9 => current_var = Some(pair.value),
            code => {
                let Some(var) = current_var.as_deref() else {
                    // Valeur sans variable courante: tolérée
                    continue;
                };

                match (var, code) {
                    ("$EXTMIN", 10) => ext_min.0 = header_float(var, &pair),
                    ("$EXTMIN", 20) => ext_min.1 = header_float(var, &pair),
                    ("$EXTMAX", 10) => ext_max.0 = header_float(var, &pair),
                    ("$EXTMAX", 20) => ext_max.1 = header_float(var, &pair),
                    ("$INSUNITS", 70) => header.ins_units = pair.value.trim().parse().ok(),
                    ("$DWGCODEPAGE", 3) => header.codepage = Some(pair.value.clone()),
                    _ => {}
                }

                header
                    .variables
                    .entry(var.to_string())
                    .or_insert(pair.value);
            }
        }
    }

    if let (Some(x), Some(y)) = ext_min {
        header.ext_min = Some((x, y));
    }
    if let (Some(x), Some(y)) = ext_max {
        header.ext_max = Some((x, y));
    }

    Ok(())
}

fn header_float(var: &str, pair: &GroupPair) -> Option<f64> {
    match fast_float::parse(pair.value.trim()) {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(
                variable = var,
                value = pair.value.as_str(),
                line = pair.line,
                "Ignoring unparseable header coordinate"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_pairs;

    fn parse_header(content: &str) -> Header {
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut header = Header::default();
        parse(&mut cursor, &mut header).unwrap();
        header
    }

    #[test]
    fn test_parse_extents_and_units() {
        let header = parse_header(
            "9\n$EXTMIN\n10\n2600000.0\n20\n1199000.0\n\
             9\n$EXTMAX\n10\n2601000.0\n20\n1200000.0\n\
             9\n$INSUNITS\n70\n4\n\
             0\nENDSEC\n",
        );
        assert_eq!(header.ext_min, Some((2_600_000.0, 1_199_000.0)));
        assert_eq!(header.ext_max, Some((2_601_000.0, 1_200_000.0)));
        assert_eq!(header.ins_units, Some(4));
    }

    #[test]
    fn test_parse_codepage() {
        let header = parse_header("9\n$DWGCODEPAGE\n3\nANSI_1252\n0\nENDSEC\n");
        assert_eq!(header.codepage.as_deref(), Some("ANSI_1252"));
    }

    #[test]
    fn test_unknown_variable_kept_raw() {
        let header = parse_header("9\n$CUSTOMPROJ\n1\nEPSG:2056\n0\nENDSEC\n");
        assert_eq!(
            header.variables.get("$CUSTOMPROJ").map(String::as_str),
            Some("EPSG:2056")
        );
    }

    #[test]
    fn test_missing_endsec_is_section_error() {
        let mut cursor = GroupCursor::new(read_pairs("9\n$EXTMIN\n10\n1.0\n").unwrap());
        let err = parse(&mut cursor, &mut Header::default()).unwrap_err();
        assert!(matches!(err, DxfError::Section { .. }));
    }
}
