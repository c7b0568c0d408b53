//! Name and chat moderation
//!
//! Inputs are normalized before being checked against a denylist:
//! - lowercased, leetspeak folded (`0→o`, `3→e`, `@→a`, ...)
//! - non-alphanumerics stripped
//! - repeated character runs collapsed (`shiiit` → `shit`)
//!
//! A match rejects the write; text is never silently altered.

/// Longest allowed display name, in characters
pub const MAX_NAME_LEN: usize = 18;

/// Default denylist, matched as substrings of the normalized input
const DEFAULT_DENYLIST: &[&str] = &[
    "nigger", "faggot", "tranny", "kike", "retard", "fuck", "shit", "cunt", "bitch", "whore",
    "slut", "nazi",
];

/// Slurs that also start everyday words (`spicy`). Names still match them
/// as substrings; chat only rejects them as whole words.
const DEFAULT_WORD_DENYLIST: &[&str] = &["spic", "chink"];

/// Trim, squash whitespace, strip control characters, cap the length
pub fn sanitize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect()
}

fn fold_leet(c: char) -> char {
    match c {
        '0' => 'o',
        '1' | '!' => 'i',
        '3' => 'e',
        '4' | '@' => 'a',
        '5' | '$' => 's',
        '7' => 't',
        other => other,
    }
}

/// Lowercase, fold leetspeak, drop everything that is not alphanumeric
fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(fold_leet)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Cap every run of one character at `max_run`
fn squeeze(text: &str, max_run: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = None;
    let mut run = 0;
    for c in text.chars() {
        if last == Some(c) {
            run += 1;
        } else {
            last = Some(c);
            run = 1;
        }
        if run <= max_run {
            out.push(c);
        }
    }
    out
}

/// Normalize text for denylist matching
pub fn normalize(text: &str) -> String {
    squeeze(&fold(text), 1)
}

/// Both collapsed forms of an input. Runs capped at two keep entries with
/// a real double letter (`faggot`) from matching words like `Niger`.
fn variants(text: &str) -> [String; 2] {
    let folded = fold(text);
    [squeeze(&folded, 1), squeeze(&folded, 2)]
}

/// Substring denylist checker
#[derive(Debug, Clone)]
pub struct Moderator {
    denylist: Vec<String>,
    /// Whole words in chat, substrings in names
    word_denylist: Vec<String>,
}

impl Default for Moderator {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied())
            .with_words(DEFAULT_WORD_DENYLIST.iter().copied())
    }
}

fn normalize_entries<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|w| squeeze(&fold(w.as_ref()), 2))
        .filter(|w| !w.is_empty())
        .collect()
}

impl Moderator {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denylist: normalize_entries(denylist),
            word_denylist: Vec::new(),
        }
    }

    /// Add entries that chat only rejects as whole words
    pub fn with_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.word_denylist.extend(normalize_entries(words));
        self
    }

    fn contains_banned<'a>(
        &self,
        text: &str,
        mut entries: impl Iterator<Item = &'a String>,
    ) -> bool {
        let forms = variants(text);
        entries.any(|banned| forms.iter().any(|form| form.contains(banned.as_str())))
    }

    fn is_banned_word(&self, word: &str) -> bool {
        let forms = variants(word);
        self.word_denylist.iter().any(|banned| {
            forms.iter().any(|form| {
                form == banned || form.strip_suffix('s') == Some(banned.as_str())
            })
        })
    }

    /// Whole-input check, used for display names
    pub fn is_name_allowed(&self, name: &str) -> bool {
        !self.contains_banned(name, self.denylist.iter().chain(&self.word_denylist))
    }

    /// Word-by-word check, so innocent clues spanning word boundaries pass.
    /// Runs of single letters (`f u c k`) are also checked joined up.
    pub fn is_text_allowed(&self, text: &str) -> bool {
        let words: Vec<&str> = text.split_whitespace().collect();
        let spelled = words
            .split(|w| w.chars().count() != 1)
            .filter(|run| run.len() > 1)
            .map(|run| run.concat());

        !(words.iter().any(|w| self.is_flagged_word(w))
            || spelled.into_iter().any(|w| self.is_flagged_word(&w)))
    }

    fn is_flagged_word(&self, word: &str) -> bool {
        self.contains_banned(word, self.denylist.iter()) || self.is_banned_word(word)
    }
}
