use anyhow::{Context, Result};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use super::build_pipeline;
use crate::config::Config;
use crate::generate::{create_generator, ContextPayload};

static THINKING: Emoji<'_, '_> = Emoji("💭 ", "");

pub async fn run_ask(config: &Config, query: &str, top_k: Option<usize>, dry_run: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;

    // A failed retrieval must not turn into an empty context
    let results = pipeline
        .run(query, top_k, None)
        .await
        .context("retrieval failed; no answer generated")?;
    if results.is_empty() {
        warn!(query, "no relevant reviews found");
    }

    let payload = ContextPayload::from_results(query, &results);
    let prompt = payload.render_prompt();

    if dry_run {
        println!("{}", prompt);
        return Ok(());
    }

    let generator = create_generator(&config.generation)?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("{}Thinking...", THINKING));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let answer = generator.complete(&prompt).await;
    pb.finish_and_clear();
    let answer = answer.context("generation failed")?;

    println!("\n{}\n", answer);
    if !payload.is_empty() {
        println!("{}", style("Sources:").bold());
        for passage in &payload.passages {
            println!(
                "  [{}] {} ({:.1}★)",
                passage.rank,
                style(&passage.product_name).green(),
                passage.rating
            );
        }
    }

    Ok(())
}
