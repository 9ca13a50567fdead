//! Кодирование транскрипций в индексы классов.

use std::collections::HashMap;

use asr_core::{AsrError, AsrResult, TranscriptConfig};

/// Символьный алфавит CTC. Индекс 0: blank.
#[derive(Debug, Clone)]
pub struct Alphabet {
    symbols: Vec<char>,
    index: HashMap<char, u32>,
}

impl Alphabet {
    pub fn new(alphabet: &str) -> AsrResult<Self> {
        let symbols: Vec<char> = alphabet.chars().collect();
        if symbols.len() < 2 {
            return Err(AsrError::Config(format!(
                "alphabet {:?} needs a blank and at least one symbol",
                alphabet
            )));
        }

        let mut index = HashMap::with_capacity(symbols.len());
        for (i, &c) in symbols.iter().enumerate() {
            if index.insert(c, i as u32).is_some() {
                return Err(AsrError::Config(format!(
                    "alphabet contains {:?} more than once",
                    c
                )));
            }
        }

        Ok(Self { symbols, index })
    }

    pub fn from_config(config: &TranscriptConfig) -> AsrResult<Self> {
        Self::new(&config.alphabet)
    }

    /// Количество классов, включая blank.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn blank(&self) -> u32 {
        0
    }

    /// Закодировать текст. Регистр приводится к верхнему, символы вне
    /// алфавита и сам символ blank отбрасываются.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        text.chars()
            .flat_map(char::to_uppercase)
            .filter_map(|c| self.index.get(&c).copied())
            .filter(|&id| id != self.blank())
            .collect()
    }

    /// Обратное преобразование (для логов и тестов).
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter_map(|&id| self.symbols.get(id as usize))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asr_core::DEFAULT_ALPHABET;

    #[test]
    fn test_encode_default_alphabet() {
        let alphabet = Alphabet::new(DEFAULT_ALPHABET).unwrap();
        assert_eq!(alphabet.len(), 29);
        assert_eq!(alphabet.encode("AB"), vec![2, 3]);
        assert_eq!(alphabet.encode("it's"), vec![10, 21, 1, 20]);
        assert_eq!(alphabet.encode("a b"), vec![2, 28, 3]);
    }

    #[test]
    fn test_unknown_and_blank_dropped() {
        let alphabet = Alphabet::new(DEFAULT_ALPHABET).unwrap();
        assert_eq!(alphabet.encode("A_1-B!\n"), vec![2, 3]);
        assert!(alphabet.encode("123").is_empty());
    }

    #[test]
    fn test_roundtrip_decode() {
        let alphabet = Alphabet::new(DEFAULT_ALPHABET).unwrap();
        let ids = alphabet.encode("Hello World");
        assert_eq!(alphabet.decode(&ids), "HELLO WORLD");
    }

    #[test]
    fn test_duplicate_symbols_rejected() {
        assert!(Alphabet::new("_AA").is_err());
        assert!(Alphabet::new("_").is_err());
    }
}
