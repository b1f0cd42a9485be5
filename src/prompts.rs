use crate::models::FieldSchema;

pub const SEARCH_TERM: &str = include_str!("../data/prompts/search_term.txt");
pub const GENERATION: &str = include_str!("../data/prompts/generation.txt");
pub const GENERATION_RULES: &str = include_str!("../data/prompts/generation_rules.txt");
pub const GENERATION_TASK: &str = include_str!("../data/prompts/generation_task.txt");
pub const TRAINING_EXAMPLES: &str = include_str!("../data/prompts/training_examples.txt");

/// Replace `{{key}}` placeholders in a template string.
///
/// Substitution runs in `vars` order, so user-supplied values belong last.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

/// Style parameters of the generation flow prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptStyle {
    pub rules: String,
    pub training_examples: Vec<String>,
    pub task: String,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self {
            rules: GENERATION_RULES.trim().to_string(),
            training_examples: TRAINING_EXAMPLES
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            task: GENERATION_TASK.trim().to_string(),
        }
    }
}

pub fn build_search_term_prompt(data: &str) -> String {
    render(SEARCH_TERM, &[("data", data)])
}

pub fn build_generation_prompt(style: &PromptStyle, schema: &FieldSchema, data: &str) -> String {
    let examples = style
        .training_examples
        .iter()
        .map(|example| format!("- {}", example))
        .collect::<Vec<_>>()
        .join("\n");
    let fields = schema
        .fields
        .iter()
        .map(|field| format!("'{}'", field))
        .collect::<Vec<_>>()
        .join(", ");
    let task = render(&style.task, &[("fields", &fields)]);

    render(
        GENERATION,
        &[
            ("rules", &style.rules),
            ("examples", &examples),
            ("task", &task),
            ("data", data),
        ],
    )
}
