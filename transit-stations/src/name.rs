//! Station name canonicalisation: lowercase, strip accents, collapse
//! whitespace, normalise station-type suffixes.

const SUFFIX_MAP: &[(&str, &str)] = &[
    ("hbf", "hauptbahnhof"),
    ("bhf", "bahnhof"),
    ("bf", "bahnhof"),
    ("bstg", "bahnsteig"),
];

/// Fold common German/Austrian diacritics to their ASCII base form. The
/// teacher's pack carries no transliteration crate, so this is a small
/// fixed table rather than a full Unicode normaliser.
fn strip_accents(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'ä' | 'Ä' => 'a',
            'ö' | 'Ö' => 'o',
            'ü' | 'Ü' => 'u',
            'ß' => 's',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
            'á' | 'à' | 'â' | 'Á' | 'À' | 'Â' => 'a',
            'í' | 'ì' | 'î' | 'Í' | 'Ì' | 'Î' => 'i',
            'ó' | 'ò' | 'ô' | 'Ó' | 'Ò' | 'Ô' => 'o',
            'ú' | 'ù' | 'û' | 'Ú' | 'Ù' | 'Û' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other,
        })
        .collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_suffix(word: &str) -> String {
    SUFFIX_MAP
        .iter()
        .find(|(from, _)| *from == word)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| word.to_string())
}

/// Produce the canonical comparison form of a raw station name: lowercase,
/// accent-folded, whitespace-collapsed, with station-type suffixes (`Hbf`,
/// `Bhf`, `Bf`) expanded to their full word so `"Wien Hbf"` and `"Wien
/// Hauptbahnhof"` compare equal.
pub fn normalize(raw: &str) -> String {
    let folded = strip_accents(&raw.to_lowercase());
    let collapsed = collapse_whitespace(&folded);
    collapsed
        .split(' ')
        .map(normalize_suffix)
        .collect::<Vec<_>>()
        .join(" ")
}
