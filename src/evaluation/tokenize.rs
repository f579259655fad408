//! sacrebleu 13a 토크나이저
//!
//! source: https://github.com/mjpost/sacrebleu/blob/master/sacrebleu/tokenizers/tokenizer_13a.py

use anyhow::Result;
use regex::Regex;

/// mteval-v13a 방식 토크나이저
#[derive(Debug, Clone)]
pub struct Tokenizer13a {
    rules: Vec<(Regex, &'static str)>,
}

impl Tokenizer13a {
    pub fn new() -> Result<Self> {
        let rules = vec![
            // 구두점/기호 분리
            (Regex::new(r"([\{-~\[-` -&\(-\+:-@/])")?, " ${1} "),
            // 숫자 뒤가 아닌 마침표/쉼표
            (Regex::new(r"([^0-9])([\.,])")?, "${1} ${2} "),
            // 숫자 앞이 아닌 마침표/쉼표
            (Regex::new(r"([\.,])([^0-9])")?, " ${1} ${2}"),
            // 숫자 뒤 대시
            (Regex::new(r"([0-9])(-)")?, "${1} ${2} "),
        ];
        Ok(Self { rules })
    }

    pub fn tokenize(&self, line: &str) -> String {
        let mut line = line
            .replace("<skipped>", "")
            .replace("-\n", "")
            .replace('\n', " ");

        if line.contains('&') {
            line = line
                .replace("&quot;", "\"")
                .replace("&amp;", "&")
                .replace("&lt;", "<")
                .replace("&gt;", ">");
        }

        let mut line = format!(" {} ", line);
        for (pattern, replacement) in &self.rules {
            line = pattern.replace_all(&line, *replacement).into_owned();
        }

        line.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
