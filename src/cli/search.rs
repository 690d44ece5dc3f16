use anyhow::Result;
use console::{style, Emoji};

use super::build_pipeline;
use crate::config::Config;
use crate::search::MetadataFilter;

static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
static REVIEW: Emoji<'_, '_> = Emoji("📝 ", "");

const PREVIEW_CHARS: usize = 200;

pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub min_rating: Option<f32>,
    pub category: Option<String>,
    pub verified: bool,
    pub json: bool,
}

impl SearchOptions {
    fn filter(&self) -> Option<MetadataFilter> {
        if self.min_rating.is_none() && self.category.is_none() && !self.verified {
            return None;
        }
        Some(MetadataFilter {
            min_rating: self.min_rating,
            category: self.category.clone(),
            product_id: None,
            verified_only: self.verified,
        })
    }
}

pub async fn run_search(config: &Config, query: &str, options: SearchOptions) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let results = pipeline.run(query, options.top_k, options.filter()).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found for: {}", style(query).italic());
        return Ok(());
    }

    println!(
        "\n{}Found {} results for: {}\n",
        SEARCH,
        style(results.len()).cyan(),
        style(query).yellow().bold()
    );

    for result in &results {
        let candidate = &result.candidate;
        let meta = &candidate.metadata;
        let name = if meta.product_name.is_empty() {
            &meta.product_id
        } else {
            &meta.product_name
        };
        println!(
            "{} {}. {} {}",
            REVIEW,
            style(result.rank).dim(),
            style(name).green(),
            style(format!("({:.1}★{})", meta.rating, if meta.verified_purchase { ", verified" } else { "" })).dim()
        );
        println!(
            "   Rerank: {} | Fused: {} (vector {:.3}, lexical {:.3})",
            style(format!("{:.3}", result.rerank_score)).cyan(),
            style(format!("{:.3}", candidate.fused_score)).cyan(),
            candidate.vector_score,
            candidate.lexical_score
        );

        let text = candidate.text.trim().replace('\n', " ");
        let preview = if text.chars().count() > PREVIEW_CHARS {
            format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
        } else {
            text
        };
        println!("   {}", style(preview).dim());
        println!();
    }

    Ok(())
}
