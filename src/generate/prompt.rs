use serde::Serialize;
use std::fmt::Write;

use crate::search::RankedResult;

/// Shown to the model instead of an empty context block.
pub const NO_CONTEXT_NOTICE: &str =
    "No relevant reviews were found for this question. Tell the customer that the \
     available reviews do not cover it instead of guessing.";

const PRODUCT_ASSISTANT_TEMPLATE: &str = "\
TASK/GOAL: You are an expert e-commerce product recommendation assistant who helps \
customers choose products based on authentic user reviews and ratings.

PERSONA: A friendly, knowledgeable shopping advisor. Be conversational and honest about \
product strengths and limitations as reported by real users.

AUDIENCE: Shoppers researching a purchase. They value specific details and practical \
recommendations.

TASK:
1. Analyze the provided reviews and metadata (ratings, categories, product names)
2. Identify key themes, strengths and concerns across reviews
3. Give a balanced recommendation based on ratings, use cases, praises and complaints
4. If several products are relevant, compare them briefly
5. Cite actual review content when relevant
6. If reviews are mixed or insufficient, say so

DATA/CONTEXT:
{context}

QUESTION: {question}

INSTRUCTIONS:
- Base your answer ONLY on the provided context
- If the context does not contain relevant information, say so clearly
- Mention product names, ratings and categories when relevant
- Keep the answer to 2-4 paragraphs and end with a clear recommendation

YOUR ANSWER:
";

/// One ordered passage handed to generation.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPassage {
    pub rank: usize,
    pub chunk_id: String,
    pub product_name: String,
    pub product_id: String,
    pub category: String,
    pub rating: f32,
    pub verified_purchase: bool,
    pub text: String,
}

/// Ordered passages plus the question, ready to render.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPayload {
    pub question: String,
    pub passages: Vec<ContextPassage>,
}

impl ContextPayload {
    pub fn from_results(question: &str, results: &[RankedResult]) -> Self {
        let passages = results
            .iter()
            .map(|r| {
                let meta = &r.candidate.metadata;
                ContextPassage {
                    rank: r.rank,
                    chunk_id: r.candidate.chunk_id.clone(),
                    product_name: meta.product_name.clone(),
                    product_id: meta.product_id.clone(),
                    category: meta.category.clone(),
                    rating: meta.rating,
                    verified_purchase: meta.verified_purchase,
                    text: r.candidate.text.clone(),
                }
            })
            .collect();

        Self {
            question: question.trim().to_string(),
            passages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn render_context(&self) -> String {
        if self.passages.is_empty() {
            return NO_CONTEXT_NOTICE.to_string();
        }

        let mut out = String::new();
        for p in &self.passages {
            let name = if p.product_name.is_empty() {
                p.product_id.as_str()
            } else {
                p.product_name.as_str()
            };
            let _ = writeln!(out, "[{}] Product: {}", p.rank, name);
            if !p.category.is_empty() {
                let _ = writeln!(out, "Category: {}", p.category);
            }
            let _ = writeln!(
                out,
                "Rating: {:.1}/5{}",
                p.rating,
                if p.verified_purchase { " (verified purchase)" } else { "" }
            );
            let _ = writeln!(out, "Review: {}", p.text.trim());
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Full prompt for the product assistant.
    pub fn render_prompt(&self) -> String {
        let context = self.render_context();
        fill_template(
            PRODUCT_ASSISTANT_TEMPLATE,
            &[("{context}", &context), ("{question}", &self.question)],
        )
    }
}

/// Substitute placeholders in one left-to-right pass. Inserted values are
/// never scanned again, so review text or a question that happens to
/// contain a placeholder is kept verbatim.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let next = values
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|at| (at, *key, *value)))
            .min_by_key(|(at, _, _)| *at);

        match next {
            Some((at, key, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
