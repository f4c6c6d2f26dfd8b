//! Pseudo-word text generator for synthetic documents.
//!
//! Words are built from weighted syllables so the output looks like prose and compresses like it,
//! without shipping a dictionary.

use rand::Rng;
use rand::seq::SliceRandom;

const ONSETS: &[&str] = &[
    "b", "c", "d", "f", "g", "l", "m", "n", "p", "r", "s", "t", "v", "ch", "tr", "pl", "gr", "st",
];
const VOWELS: &[&str] = &["a", "e", "i", "o", "u", "ou", "ai", "ea", "io"];
const CODAS: &[&str] = &["", "", "", "n", "r", "s", "t", "l", "nd", "st"];

/// One pseudo-word of 1 to 4 syllables.
pub fn random_word<R: Rng + ?Sized>(rng: &mut R) -> String {
    let syllables = rng.gen_range(1..=4);
    let mut word = String::with_capacity(syllables * 4);
    for _ in 0..syllables {
        word.push_str(ONSETS.choose(rng).copied().unwrap_or("t"));
        word.push_str(VOWELS.choose(rng).copied().unwrap_or("a"));
        word.push_str(CODAS.choose(rng).copied().unwrap_or(""));
    }
    word
}

/// Capitalised title of `words` pseudo-words.
pub fn random_title<R: Rng + ?Sized>(rng: &mut R, words: usize) -> String {
    let mut title = (0..words.max(1))
        .map(|_| random_word(rng))
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(first) = title.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    title
}

/// Sentences of pseudo-words until at least `size` bytes are produced.
pub fn random_text<R: Rng + ?Sized>(rng: &mut R, size: usize) -> String {
    let mut text = String::with_capacity(size + 64);
    while text.len() < size {
        let words = rng.gen_range(4..14);
        text.push_str(&random_title(rng, words));
        text.push_str(". ");
    }
    text
}
