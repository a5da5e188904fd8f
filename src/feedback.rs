/// Mensajes de corrección por letra
pub struct SymbolFeedback {
    pub correct: &'static str,
    pub incorrect: &'static str,
}

const FALLBACK_CORRECT: &str = "Nice job!";
const FALLBACK_INCORRECT: &str = "Adjust your hand shape.";

/// Tabla A-Z (índice = letra - 'A')
const FEEDBACK_TABLE: [SymbolFeedback; 26] = [
    SymbolFeedback { correct: "Perfect A!", incorrect: "Keep fingers closed, thumb on side." },
    SymbolFeedback { correct: "Nice B!", incorrect: "Straighten all fingers, thumb across palm." },
    SymbolFeedback { correct: "Good C!", incorrect: "Curve hand like C." },
    SymbolFeedback { correct: "Well done D!", incorrect: "Index up, others touching thumb." },
    SymbolFeedback { correct: "Nice E!", incorrect: "Curl fingers slightly inward." },
    SymbolFeedback { correct: "Perfect F!", incorrect: "Touch thumb to index, other fingers up." },
    SymbolFeedback { correct: "Great G!", incorrect: "Point sideways with index and thumb." },
    SymbolFeedback { correct: "Good H!", incorrect: "Index and middle together, sideways." },
    SymbolFeedback { correct: "Well done I!", incorrect: "Pinkie up, rest down." },
    SymbolFeedback { correct: "Perfect J!", incorrect: "Draw a J with pinkie." },
    SymbolFeedback { correct: "Great K!", incorrect: "Thumb under middle, index up." },
    SymbolFeedback { correct: "Nice L!", incorrect: "Form L with thumb and index." },
    SymbolFeedback { correct: "Well done M!", incorrect: "Three fingers over thumb, tight." },
    SymbolFeedback { correct: "Perfect N!", incorrect: "Two fingers over thumb, others down." },
    SymbolFeedback { correct: "Good O!", incorrect: "Curve all fingers into circle." },
    SymbolFeedback { correct: "Nice P!", incorrect: "Thumb under middle, point down." },
    SymbolFeedback { correct: "Well done Q!", incorrect: "Thumb under index, point down." },
    SymbolFeedback { correct: "Perfect R!", incorrect: "Cross index over middle." },
    SymbolFeedback { correct: "Good S!", incorrect: "Make a fist, thumb in front." },
    SymbolFeedback { correct: "Well done T!", incorrect: "Thumb between index and middle." },
    SymbolFeedback { correct: "Nice U!", incorrect: "Index and middle together, up." },
    SymbolFeedback { correct: "Perfect V!", incorrect: "Separate index and middle." },
    SymbolFeedback { correct: "Great W!", incorrect: "Raise index, middle, ring." },
    SymbolFeedback { correct: "Good X!", incorrect: "Bend index, others down." },
    SymbolFeedback { correct: "Nice Y!", incorrect: "Thumb and pinkie out, others down." },
    SymbolFeedback { correct: "Well done Z!", incorrect: "Draw Z in air with index." },
];

/// Frases del modo práctica
pub const PRACTICE_SENTENCES: [&str; 6] = [
    "HELLO MY G",
    "I LOVE JA",
    "LEARN INTELLIBUS",
    "NEURAL HANDS",
    "ASL IS FUN",
    "PRACTICE MAKES PERFECT",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub message: String,
    pub is_correct: bool,
}

/// Entrada de la tabla para un símbolo, si existe
pub fn lookup(symbol: &str) -> Option<&'static SymbolFeedback> {
    let mut chars = symbol.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some(&FEEDBACK_TABLE[(c.to_ascii_uppercase() as u8 - b'A') as usize])
        }
        _ => None,
    }
}

/// Compara el símbolo intentado con el esperado (sin distinguir mayúsculas)
/// y devuelve el mensaje de la tabla del símbolo esperado.
pub fn feedback(attempted: &str, expected: &str) -> Feedback {
    let is_correct = attempted.trim().eq_ignore_ascii_case(expected.trim());
    let entry = lookup(expected);

    let message = match (entry, is_correct) {
        (Some(entry), true) => entry.correct,
        (Some(entry), false) => entry.incorrect,
        (None, true) => FALLBACK_CORRECT,
        (None, false) => FALLBACK_INCORRECT,
    };

    Feedback {
        message: message.to_string(),
        is_correct,
    }
}

/// Modo libre (sin objetivo): siempre el mensaje positivo de la letra detectada
pub fn free_form_feedback(detected: &str) -> Feedback {
    Feedback {
        message: lookup(detected)
            .map(|e| e.correct)
            .unwrap_or(FALLBACK_CORRECT)
            .to_string(),
        is_correct: true,
    }
}
