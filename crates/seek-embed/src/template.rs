use crate::provider::TextKind;

const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

/// Model-family prompt prefixes for asymmetric retrieval models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// `query: ` / `passage: `
    E5,
    /// Instruction prefix on queries only.
    Bge,
    /// `search_query: ` / `search_document: `
    Nomic,
    Raw,
}

impl PromptTemplate {
    /// Pick the template from a model identifier such as `BAAI/bge-small-en-v1.5`.
    #[must_use]
    pub fn for_model(model_id: &str) -> Self {
        let id = model_id.to_lowercase();
        let name = id.rsplit('/').next().unwrap_or(&id);
        if name.contains("e5-") || name.starts_with("e5") {
            Self::E5
        } else if name.starts_with("bge-") {
            Self::Bge
        } else if name.starts_with("nomic-embed") {
            Self::Nomic
        } else {
            Self::Raw
        }
    }

    #[must_use]
    pub fn apply(self, text: &str, kind: TextKind) -> String {
        let prefix = match (self, kind) {
            (Self::E5, TextKind::Query) => "query: ",
            (Self::E5, TextKind::Document) => "passage: ",
            (Self::Bge, TextKind::Query) => BGE_QUERY_INSTRUCTION,
            (Self::Nomic, TextKind::Query) => "search_query: ",
            (Self::Nomic, TextKind::Document) => "search_document: ",
            (Self::Bge | Self::Raw, _) => "",
        };
        let mut out = String::with_capacity(prefix.len() + text.len());
        out.push_str(prefix);
        out.push_str(text);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_families() {
        assert_eq!(
            PromptTemplate::for_model("intfloat/e5-small-v2"),
            PromptTemplate::E5
        );
        assert_eq!(
            PromptTemplate::for_model("intfloat/multilingual-e5-base"),
            PromptTemplate::E5
        );
        assert_eq!(
            PromptTemplate::for_model("BAAI/bge-small-en-v1.5"),
            PromptTemplate::Bge
        );
        assert_eq!(
            PromptTemplate::for_model("nomic-ai/nomic-embed-text-v1.5"),
            PromptTemplate::Nomic
        );
        assert_eq!(
            PromptTemplate::for_model("sentence-transformers/all-MiniLM-L6-v2"),
            PromptTemplate::Raw
        );
    }

    #[test]
    fn e5_distinguishes_query_and_document() {
        let t = PromptTemplate::E5;
        assert_eq!(t.apply("sum", TextKind::Query), "query: sum");
        assert_eq!(t.apply("sum", TextKind::Document), "passage: sum");
    }

    #[test]
    fn bge_prefixes_queries_only() {
        let t = PromptTemplate::Bge;
        assert!(t.apply("x", TextKind::Query).starts_with("Represent"));
        assert_eq!(t.apply("x", TextKind::Document), "x");
    }

    #[test]
    fn raw_is_identity() {
        assert_eq!(PromptTemplate::Raw.apply("x", TextKind::Query), "x");
    }
}
