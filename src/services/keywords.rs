//! Keyword matching for the fixed routing pass. Matching is accent- and
//! case-insensitive and anchored on word boundaries, so "si" matches
//! "si, confirmo" but not "asistencia".

use regex::Regex;

pub const GREETING_KEYWORDS: &[&str] = &[
    "hola",
    "buenas",
    "buen dia",
    "buenos dias",
    "buenas tardes",
    "buenas noches",
];

pub const APPOINTMENT_KEYWORDS: &[&str] = &["turno", "cita", "consulta", "reservar", "agendar"];

pub const CANCEL_KEYWORDS: &[&str] = &["cancelar", "anular", "borrar"];

pub const CONFIRM_KEYWORDS: &[&str] = &["si", "confirmo", "confirmar", "dale", "ok"];

pub const URGENCY_KEYWORDS: &[&str] = &[
    "urgencia",
    "urgente",
    "emergencia",
    "dolor fuerte",
    "sangrado",
    "accidente",
];

pub const FAQ_INSURANCE_KEYWORDS: &[&str] = &["obra social", "prepaga", "cobertura", "osde", "swiss"];

pub const FAQ_COST_KEYWORDS: &[&str] = &["costo", "precio", "cuanto sale", "cuanto cuesta", "valor"];

pub const FAQ_LOCATION_KEYWORDS: &[&str] = &["donde", "direccion", "ubicacion", "como llegar"];

pub const FAQ_FREE_KEYWORDS: &[&str] = &["gratis", "gratuito", "sin cargo"];

pub const REPEAT_KEYWORDS: &[&str] = &["repetir", "mismo", "de nuevo con"];

pub const HISTORY_KEYWORDS: &[&str] = &["historial", "mis turnos", "anteriores"];

/// Lowercases, strips Spanish diacritics, and collapses whitespace runs.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match c {
            'á' => folded.push('a'),
            'é' => folded.push('e'),
            'í' => folded.push('i'),
            'ó' => folded.push('o'),
            'ú' | 'ü' => folded.push('u'),
            'ñ' => folded.push('n'),
            _ => folded.push(c),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word match of any keyword against the normalized text. Keywords
/// are assumed pre-normalized (the const lists above are).
pub fn matches(text: &str, keywords: &[&str]) -> bool {
    let normalized = normalize(text);
    keywords.iter().any(|kw| {
        let pattern = format!(r"\b{}\b", regex::escape(kw));
        Regex::new(&pattern)
            .map(|re| re.is_match(&normalized))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_case() {
        assert_eq!(normalize("  Sí, CONFIRMO  el   Turno "), "si, confirmo el turno");
        assert_eq!(normalize("Mañana"), "manana");
    }

    #[test]
    fn matches_whole_words_only() {
        assert!(matches("si, quiero", CONFIRM_KEYWORDS));
        assert!(matches("Sí", CONFIRM_KEYWORDS));
        assert!(!matches("necesito asistencia", CONFIRM_KEYWORDS));
        assert!(!matches("pasillo", CONFIRM_KEYWORDS));
    }

    #[test]
    fn matches_accented_input() {
        assert!(matches("Hola, ¿cómo están?", GREETING_KEYWORDS));
        assert!(matches("quisiera anular mi turno", CANCEL_KEYWORDS));
        assert!(matches("¿dónde queda la clínica?", FAQ_LOCATION_KEYWORDS));
    }

    #[test]
    fn matches_multi_word_keywords() {
        assert!(matches("tengo un dolor fuerte en la muela", URGENCY_KEYWORDS));
        assert!(matches("¿cuánto sale la consulta?", FAQ_COST_KEYWORDS));
    }

    #[test]
    fn no_match_on_empty_text() {
        assert!(!matches("", GREETING_KEYWORDS));
        assert!(!matches("   ", GREETING_KEYWORDS));
    }
}
