use rust_stemmers::{Algorithm, Stemmer};

/// Tokenizer over a slice of characters. Alphabetic runs are lowercased and
/// stemmed with the English Porter2 algorithm, numeric runs are kept verbatim,
/// and everything else is a separator.
pub struct Lexer<'a> {
    input: &'a [char],
    stemmer: Stemmer,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [char]) -> Self {
        Self {
            input,
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Skips characters that can never start a token.
    fn skip_separators(&mut self) {
        while !self.input.is_empty() && !self.input[0].is_alphanumeric() {
            self.input = &self.input[1..];
        }
    }

    fn chop(&mut self, n: usize) -> &'a [char] {
        let token = &self.input[0..n];
        self.input = &self.input[n..];
        token
    }

    fn chop_while<P>(&mut self, mut predicate: P) -> &'a [char]
    where
        P: FnMut(&char) -> bool,
    {
        let mut n = 0;
        while n < self.input.len() && predicate(&self.input[n]) {
            n += 1;
        }

        self.chop(n)
    }

    fn next_token(&mut self) -> Option<String> {
        self.skip_separators();

        if self.input.is_empty() {
            return None;
        }

        if self.input[0].is_numeric() {
            return Some(self.chop_while(|x| x.is_numeric()).iter().collect());
        }

        let term: String = self
            .chop_while(|x| x.is_alphanumeric())
            .iter()
            .flat_map(|c| c.to_lowercase())
            .collect();
        Some(self.stemmer.stem(&term).to_string())
    }

    /// Collects every token from the remaining input, dropping stop words.
    pub fn get_tokens(&mut self, stop_words: &[String]) -> Vec<String> {
        self.by_ref().filter(|t| !stop_words.contains(t)).collect()
    }
}

impl Iterator for Lexer<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
