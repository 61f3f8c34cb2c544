//! Classification prompt layout and token budgeting.

use tiktoken_rs::CoreBPE;

use crate::error::ResearchError;

pub const DEFAULT_INSTRUCTION: &str =
    "Given a web search query, retrieve relevant passages that answer the query";

const PREFIX: &str = "<|im_start|>system\n\
Judge whether the Document meets the requirements based on the Query and the Instruct provided. \
Note that the answer can only be \"yes\" or \"no\".<|im_end|>\n\
<|im_start|>user\n";

const SUFFIX: &str = "<|im_end|>\n<|im_start|>assistant\n<think>\n\n</think>\n\n";

/// The (instruction, query, document) block the model judges.
pub fn format_pair(instruction: &str, query: &str, document: &str) -> String {
    format!("<Instruct>: {instruction}\n<Query>: {query}\n<Document>: {document}")
}

/// Builds full classification prompts that fit a token budget.
///
/// Holds the loaded BPE, so building one is the expensive part of reranker
/// initialization.
pub struct PromptBuilder {
    bpe: CoreBPE,
    max_length: usize,
    prefix_tokens: usize,
    suffix_tokens: usize,
}

impl PromptBuilder {
    pub fn load(tokenizer: &str, max_length: usize) -> Result<Self, ResearchError> {
        let bpe = match tokenizer {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            other => {
                return Err(ResearchError::Configuration(format!(
                    "Unknown reranker tokenizer: {other}"
                )))
            }
        }
        .map_err(|e| ResearchError::Configuration(format!("Failed to load {tokenizer}: {e}")))?;

        let prefix_tokens = bpe.encode_ordinary(PREFIX).len();
        let suffix_tokens = bpe.encode_ordinary(SUFFIX).len();
        if prefix_tokens + suffix_tokens >= max_length {
            return Err(ResearchError::Configuration(format!(
                "reranker max_length {max_length} leaves no room for the prompt template"
            )));
        }

        Ok(Self {
            bpe,
            max_length,
            prefix_tokens,
            suffix_tokens,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Tokens left for the formatted pair once the template is accounted for.
    pub fn pair_budget(&self) -> usize {
        self.max_length - self.prefix_tokens - self.suffix_tokens
    }

    /// Full prompt for one document. Only the document is cut to fit; the
    /// instruction and query are always kept whole.
    pub fn build(&self, instruction: &str, query: &str, document: &str) -> String {
        let head_tokens = self.count(&format_pair(instruction, query, ""));
        let doc_budget = self.pair_budget().saturating_sub(head_tokens);
        if doc_budget == 0 {
            tracing::warn!(
                head_tokens,
                budget = self.pair_budget(),
                "Instruction and query exceed the reranker budget, document dropped"
            );
        }

        let document = self.truncate(document, doc_budget);
        format!("{PREFIX}{}{SUFFIX}", format_pair(instruction, query, &document))
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let ids = self.bpe.encode_ordinary(text);
        if ids.len() <= max_tokens {
            return text.to_string();
        }

        // A cut can land inside a multi-byte character; back off until the
        // prefix decodes.
        let mut end = max_tokens;
        loop {
            if let Ok(prefix) = self.bpe.decode(ids[..end].to_vec()) {
                return prefix;
            }
            if end == 0 {
                return String::new();
            }
            end -= 1;
        }
    }
}
