// 🎙️ Voice Normalizer - Rules as Data
// Rewrites spoken arithmetic ("what is five plus three") into the symbolic
// form the evaluator accepts ("5+3").
//
// Rule ORDER is load-bearing: longer phrases run before the words they
// contain, and compound numbers run before their single-word parts.

use std::sync::LazyLock;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRule {
    /// Lowercase phrase, matched on word boundaries
    pub pattern: String,

    pub replacement: String,
}

impl VoiceRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        VoiceRule {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Replace every whole-word occurrence of the pattern.
    ///
    /// A pattern edge that is a word character must sit next to a non-word
    /// character (or the text boundary). Edges that are not word characters
    /// (like `%`) match anywhere.
    pub fn apply(&self, text: &str) -> String {
        let pattern = self.pattern.as_str();
        if pattern.is_empty() {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        while let Some(found) = text[cursor..].find(pattern) {
            let start = cursor + found;
            let end = start + pattern.len();

            if self.on_boundary(text, start, end) {
                out.push_str(&text[cursor..start]);
                out.push_str(&self.replacement);
                cursor = end;
            } else {
                let step = text[start..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&text[cursor..start + step]);
                cursor = start + step;
            }
        }

        out.push_str(&text[cursor..]);
        out
    }

    fn on_boundary(&self, text: &str, start: usize, end: usize) -> bool {
        let first_is_word = self.pattern.chars().next().map_or(false, is_word_char);
        let last_is_word = self.pattern.chars().next_back().map_or(false, is_word_char);

        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();

        let left_ok = !first_is_word || !before.map_or(false, is_word_char);
        let right_ok = !last_is_word || !after.map_or(false, is_word_char);
        left_ok && right_ok
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ============================================================================
// RULE TABLES
// ============================================================================

const FILLERS: &[&str] = &["um", "uh", "please", "can you", "what is", "calculate"];

/// Multi-word phrases, longest first. Must run before OPERATOR_WORDS so
/// "square root of" is not split into "square" and "root".
const OPERATOR_PHRASES: &[(&str, &str)] = &[
    ("raised to the power of", "**"),
    ("to the power of", "**"),
    ("raised to", "**"),
    ("power of", "**"),
    ("multiplied by", "*"),
    ("divided by", "/"),
    ("square root of", "sqrt("),
];

/// "three quarters" before "quarter", "one half" before "half" and "one"
const FRACTIONS: &[(&str, &str)] = &[
    ("three quarters", "0.75"),
    ("one half", "0.5"),
    ("half", "0.5"),
    ("quarter", "0.25"),
];

const OPERATOR_WORDS: &[(&str, &str)] = &[
    ("plus", "+"),
    ("and", "+"),
    ("minus", "-"),
    ("subtract", "-"),
    ("times", "*"),
    ("into", "*"),
    ("over", "/"),
    ("root", "sqrt("),
    ("square", "**2"),
    ("cube", "**3"),
    ("percent", "/100"),
    ("%", "/100"),
    ("equals", "="),
    ("is", "="),
    ("calculate", "="),
    ("decimal", "."),
    ("point", "."),
];

const UNITS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen",
    "seventeen", "eighteen", "nineteen",
];

const TENS: &[(&str, u32)] = &[
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
];

/// "twenty-one", "twenty one", ... "ninety-nine"
fn compound_number_rules() -> Vec<VoiceRule> {
    let mut rules = Vec::with_capacity(TENS.len() * 9 * 2);
    for (tens_word, tens) in TENS {
        for (unit, unit_word) in UNITS.iter().enumerate().skip(1).take(9) {
            let value = (tens + unit as u32).to_string();
            rules.push(VoiceRule::new(format!("{}-{}", tens_word, unit_word), value.clone()));
            rules.push(VoiceRule::new(format!("{} {}", tens_word, unit_word), value));
        }
    }
    rules
}

fn number_word_rules() -> Vec<VoiceRule> {
    let mut rules: Vec<VoiceRule> = UNITS
        .iter()
        .enumerate()
        .map(|(value, word)| VoiceRule::new(*word, value.to_string()))
        .collect();

    rules.extend(TENS.iter().map(|(word, value)| VoiceRule::new(*word, value.to_string())));
    rules.push(VoiceRule::new("hundred", "100"));
    rules.push(VoiceRule::new("thousand", "1000"));
    rules
}

fn pairs(table: &'static [(&'static str, &'static str)]) -> impl Iterator<Item = VoiceRule> {
    table.iter().map(|(pattern, replacement)| VoiceRule::new(*pattern, *replacement))
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct VoiceNormalizer {
    rules: Vec<VoiceRule>,
}

impl VoiceNormalizer {
    /// Build the default English rule set in priority order
    pub fn new() -> Self {
        let mut rules = Vec::new();
        rules.extend(FILLERS.iter().map(|word| VoiceRule::new(*word, "")));
        rules.extend(pairs(OPERATOR_PHRASES));
        rules.extend(compound_number_rules());
        rules.extend(pairs(FRACTIONS));
        rules.extend(pairs(OPERATOR_WORDS));
        rules.extend(number_word_rules());

        VoiceNormalizer { rules }
    }

    /// Create a normalizer from an explicit, already ordered rule list
    pub fn from_rules(rules: Vec<VoiceRule>) -> Self {
        VoiceNormalizer { rules }
    }

    /// Rewrite spoken text. Total: text no rule recognizes passes through,
    /// minus its whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        let mut current = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

        for rule in &self.rules {
            current = rule.apply(&current);
        }

        current.retain(|c| !c.is_whitespace() && c != '=');
        current
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[VoiceRule] {
        &self.rules
    }
}

impl Default for VoiceNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_NORMALIZER: LazyLock<VoiceNormalizer> = LazyLock::new(VoiceNormalizer::new);

/// Normalize transcribed speech with the default rule set
pub fn normalize_voice_text(text: &str) -> String {
    DEFAULT_NORMALIZER.normalize(text)
}

// ============================================================================
// TESTS
// ============================================================================
