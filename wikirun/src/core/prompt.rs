//! Move prompt rendering.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const MOVE_TEMPLATE: &str = include_str!("prompts/move.md");

static PROMPTS: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("move", MOVE_TEMPLATE)
        .expect("move template should be valid");
    env
});

/// Inputs for a single move prompt.
#[derive(Debug, Clone, Copy)]
pub struct MovePrompt<'a> {
    pub current: &'a str,
    pub target: &'a str,
    /// Links presented to the model, already truncated.
    pub links: &'a [String],
    /// Articles visited so far, including `current`.
    pub path: &'a [&'a str],
}

/// Render the move prompt. Links are numbered from 1.
pub fn build_move_prompt(input: &MovePrompt<'_>) -> Result<String> {
    let template = PROMPTS.get_template("move").context("get move template")?;
    template
        .render(context! {
            current => input.current,
            target => input.target,
            links => input.links,
            path => input.path,
        })
        .context("render move prompt")
}

/// Links shown to the model: the first `max_links` entries, or all of them.
pub fn presented_links(links: &[String], max_links: Option<usize>) -> &[String] {
    match max_links {
        Some(limit) if limit < links.len() => &links[..limit],
        _ => links,
    }
}
