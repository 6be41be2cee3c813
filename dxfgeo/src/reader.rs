//! Lecteur de paires group-code / valeur, l'unité atomique du format DXF
//!
//! Un fichier DXF ASCII alterne lignes de code (un entier) et lignes de
//! valeur. Les fins de ligne CR, LF et CRLF coexistent dans les fichiers
//! réels, parfois au sein d'un même fichier.

use memchr::memchr2;

use crate::DxfError;

/// Group code des commentaires DXF
const COMMENT_CODE: i32 = 999;

/// Une paire (code, valeur) avec la ligne du code dans le fichier source
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPair {
    pub code: i32,
    pub value: String,
    /// Numéro de ligne (1-based) de la ligne de code
    pub line: usize,
}

/// Itérateur de lignes tolérant aux trois conventions de fin de ligne
/// (CR seul, LF seul, CRLF)
struct LineIter<'a> {
    rest: &'a str,
    line: usize,
}

impl<'a> LineIter<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            rest: content,
            line: 0,
        }
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<(usize, &'a str)> {
        if self.rest.is_empty() {
            return None;
        }
        self.line += 1;

        match memchr2(b'\r', b'\n', self.rest.as_bytes()) {
            Some(pos) => {
                let line = &self.rest[..pos];
                let bytes = self.rest.as_bytes();
                // CRLF compte pour une seule fin de ligne
                let skip = if bytes[pos] == b'\r' && bytes.get(pos + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                self.rest = &self.rest[pos + skip..];
                Some((self.line, line))
            }
            None => {
                let line = self.rest;
                self.rest = "";
                Some((self.line, line))
            }
        }
    }
}

/// Découpe le contenu brut en séquence ordonnée de paires (code, valeur).
///
/// Les lignes vides sont ignorées; deux lignes non vides consécutives
/// forment une paire. Les paires de commentaire (code 999) sont éliminées.
///
/// # Errors
///
/// `DxfError::Parse` si une ligne de code ne se parse pas comme entier, ou
/// si le fichier se termine sur une ligne de code orpheline.
pub fn read_pairs(content: &str) -> Result<Vec<GroupPair>, DxfError> {
    let mut pairs = Vec::with_capacity(content.len() / 16);
    let mut lines = LineIter::new(content).filter(|(_, l)| !l.trim().is_empty());

    while let Some((code_line_no, code_line)) = lines.next() {
        let trimmed = code_line.trim();
        let code: i32 = trimmed.parse().map_err(|_| {
            DxfError::parse(
                code_line_no,
                format!("group code \"{}\" is not an integer", trimmed),
            )
        })?;

        let Some((_, value_line)) = lines.next() else {
            return Err(DxfError::parse(
                code_line_no,
                "file ends after a group code with no value line",
            ));
        };

        if code == COMMENT_CODE {
            continue;
        }

        pairs.push(GroupPair {
            code,
            value: value_line.trim().to_string(),
            line: code_line_no,
        });
    }

    Ok(pairs)
}

/// Curseur sur la séquence de paires, avec lookahead d'une paire.
///
/// Les parsers de section s'en servent pour s'arrêter sur un marqueur
/// `(0, "SECTION")` sans le consommer, afin qu'une section ne puisse
/// jamais avaler le début de la suivante.
#[derive(Debug)]
pub struct GroupCursor {
    pairs: Vec<GroupPair>,
    pos: usize,
}

impl GroupCursor {
    pub fn new(pairs: Vec<GroupPair>) -> Self {
        Self { pairs, pos: 0 }
    }

    /// Paire suivante sans avancer
    pub fn peek(&self) -> Option<&GroupPair> {
        self.pairs.get(self.pos)
    }

    /// Consomme et retourne la paire suivante
    pub fn next(&mut self) -> Option<&GroupPair> {
        let pair = self.pairs.get(self.pos);
        if pair.is_some() {
            self.pos += 1;
        }
        pair
    }

    /// Recule d'une paire (annule le dernier `next`)
    pub fn back(&mut self) {
        debug_assert!(self.pos > 0, "back() before any next()");
        self.pos = self.pos.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_pairs_lf() {
        let pairs = read_pairs("0\nSECTION\n2\nHEADER\n").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].code, 0);
        assert_eq!(pairs[0].value, "SECTION");
        assert_eq!(pairs[1].code, 2);
        assert_eq!(pairs[1].value, "HEADER");
    }

    #[test]
    fn test_read_pairs_crlf_and_cr() {
        let pairs = read_pairs("0\r\nSECTION\r2\rHEADER\r\n").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].value, "HEADER");
    }

    #[test]
    fn test_read_pairs_extra_whitespace() {
        // Les codes sont souvent cadrés à droite dans les fichiers AutoCAD
        let pairs = read_pairs("  0  \nLINE\n 10\n2600000.5\n").unwrap();
        assert_eq!(pairs[0].code, 0);
        assert_eq!(pairs[1].code, 10);
        assert_eq!(pairs[1].value, "2600000.5");
    }

    #[test]
    fn test_read_pairs_skips_blank_lines() {
        let pairs = read_pairs("\n\n0\n\nSECTION\n\n").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].value, "SECTION");
    }

    #[test]
    fn test_read_pairs_skips_comments() {
        let pairs = read_pairs("999\ngenerated by tool\n0\nEOF\n").unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].value, "EOF");
    }

    #[test]
    fn test_read_pairs_bad_code_reports_line() {
        let err = read_pairs("0\nSECTION\nnot-a-code\nvalue\n").unwrap_err();
        match err {
            DxfError::Parse { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("not-a-code"));
            }
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_pairs_dangling_code() {
        let err = read_pairs("0\nSECTION\n2\n").unwrap_err();
        assert!(matches!(err, DxfError::Parse { .. }));
    }

    #[test]
    fn test_cursor_back() {
        let pairs = read_pairs("0\nSECTION\n0\nENDSEC\n").unwrap();
        let mut cursor = GroupCursor::new(pairs);
        let first = cursor.next().unwrap().value.clone();
        assert_eq!(first, "SECTION");
        cursor.back();
        assert_eq!(cursor.peek().unwrap().value, "SECTION");
    }
}
